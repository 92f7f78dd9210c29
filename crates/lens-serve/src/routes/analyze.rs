use crate::AppState;
use crate::middleware::correlation::CorrelationId;
use crate::routes::error::{ApiError, map_error};
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json, Router};
use lens_core::types::{AnalyzeResponse, JobPayload, TaskId};
use lens_core::validation::{parse_analyze_request, parse_repo_url};
use tracing::{info, warn};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/analyze-pr", post(analyze))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/analyze",
    request_body = lens_core::types::AnalyzeRequest,
    responses(
        (status = 200, body = AnalyzeResponse),
        (status = 400, body = crate::routes::error::ErrorEnvelope),
        (status = 404, body = crate::routes::error::ErrorEnvelope),
        (status = 502, body = crate::routes::error::ErrorEnvelope),
        (status = 503, body = crate::routes::error::ErrorEnvelope)
    )
)]
pub(crate) async fn analyze(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    body: Bytes,
) -> Response {
    match submit(&state, &body).await {
        Ok(task_id) => Json(AnalyzeResponse { task_id }).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}

/// Everything that can be checked up front is checked before a task exists.
async fn submit(state: &AppState, body: &[u8]) -> Result<TaskId, ApiError> {
    let request =
        parse_analyze_request(body).map_err(|fields| ApiError::validation(fields, body))?;
    let repo =
        parse_repo_url(&request.repo_url, &state.repo_host).ok_or(ApiError::InvalidUrl)?;

    let diff = state
        .diffs
        .fetch_diff(&repo, request.pr_number, request.github_token.as_deref())
        .await
        .inspect_err(|err| {
            warn!(owner = %repo.owner, repo = %repo.repo, pr_number = request.pr_number, error = %err, "diff fetch failed");
        })?;

    let pr_number = request.pr_number;
    let task_id = state
        .lifecycle
        .submit(
            state.queue.as_ref(),
            JobPayload {
                repo,
                pr_number,
                diff,
            },
        )
        .await?;
    info!(task_id = %task_id, pr_number, "analysis requested");
    Ok(task_id)
}
