use crate::AppState;
use crate::middleware::correlation::CorrelationId;
use crate::routes::error::{ApiError, map_error};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use lens_core::LensError;
use lens_core::error::TaskError;
use lens_core::types::{ResultsResponse, StatusResponse, TaskId};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status/{task_id}", get(get_status))
        .route("/results/{task_id}", get(get_results))
        .with_state(state)
}

/// An id that could never have been issued names no task.
fn parse_task_id(raw: String) -> Result<TaskId, ApiError> {
    TaskId::new(raw).map_err(|_| ApiError::Core(LensError::Task(TaskError::NotFound)))
}

#[utoipa::path(
    get,
    path = "/status/{task_id}",
    params(("task_id" = String, Path, description = "Task ID")),
    responses(
        (status = 200, body = StatusResponse),
        (status = 404, body = crate::routes::error::ErrorEnvelope)
    )
)]
pub(crate) async fn get_status(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(task_id): Path<String>,
) -> Response {
    match status_of(&state, task_id).await {
        Ok(body) => Json(body).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}

async fn status_of(state: &AppState, raw: String) -> Result<StatusResponse, ApiError> {
    let task_id = parse_task_id(raw)?;
    let status = state.lifecycle.get_status(&task_id).await?;
    Ok(StatusResponse { task_id, status })
}

#[utoipa::path(
    get,
    path = "/results/{task_id}",
    params(("task_id" = String, Path, description = "Task ID")),
    responses(
        (status = 200, body = ResultsResponse),
        (status = 400, body = crate::routes::error::ErrorEnvelope),
        (status = 404, body = crate::routes::error::ErrorEnvelope)
    )
)]
pub(crate) async fn get_results(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(task_id): Path<String>,
) -> Response {
    match results_of(&state, task_id).await {
        Ok(body) => Json(body).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}

async fn results_of(state: &AppState, raw: String) -> Result<ResultsResponse, ApiError> {
    let task_id = parse_task_id(raw)?;
    let outcome = state.lifecycle.get_result(&task_id).await?;
    Ok(ResultsResponse {
        task_id,
        status: outcome.status,
        results: outcome.results,
    })
}
