use utoipa::OpenApi;

use crate::routes::error::{Detail, ErrorEnvelope};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use lens_core::types::{
    AnalysisReport, AnalyzeRequest, AnalyzeResponse, FieldError, FileReport, Issue, IssueKind,
    ResultsResponse, StatusResponse, Summary, TaskId, TaskStatus,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::analyze::analyze,
        crate::routes::tasks::get_status,
        crate::routes::tasks::get_results
    ),
    components(schemas(
        AnalyzeRequest,
        AnalyzeResponse,
        StatusResponse,
        ResultsResponse,
        AnalysisReport,
        FileReport,
        Issue,
        Summary,
        TaskId,
        TaskStatus,
        IssueKind,
        FieldError,
        Detail,
        ErrorEnvelope
    ))
)]
struct ApiDoc;

pub fn generate_spec() -> String {
    ApiDoc::openapi()
        .to_pretty_json()
        .unwrap_or_else(|_| "{}".to_string())
}

pub fn router() -> Router {
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

async fn swagger_ui() -> impl IntoResponse {
    let html = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>PR Lens API Docs</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
  </head>
  <body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script>
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    </script>
  </body>
</html>
"#;
    axum::response::Html(html)
}
