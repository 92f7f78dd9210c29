use crate::github::FetchError;
use axum::Json;
use axum::http::StatusCode;
use lens_core::LensError;
use lens_core::error::{QueueError, StoreError, TaskError};
use lens_core::types::FieldError;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

pub const MSG_INVALID_URL: &str = "Invalid URL";
pub const MSG_RESOURCE_NOT_FOUND: &str = "Resource not found";
pub const MSG_UPSTREAM: &str = "Error while obtaining PR code";
pub const MSG_TASK_NOT_FOUND: &str = "Task not found";
pub const MSG_NOT_READY: &str = "Results not available. Task is not completed.";

#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum Detail {
    Message(String),
    Fields(Vec<FieldError>),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub detail: Detail,
    pub correlation_id: Option<String>,
    /// The rejected request body, echoed on validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub body: Option<Value>,
}

/// Everything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    Validation { fields: Vec<FieldError>, body: Value },
    InvalidUrl,
    Upstream(FetchError),
    Core(LensError),
}

impl ApiError {
    /// Validation failure for `raw`. The body is kept as JSON when it parses
    /// and as text otherwise.
    pub fn validation(fields: Vec<FieldError>, raw: &[u8]) -> Self {
        let body = serde_json::from_slice(raw)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned()));
        ApiError::Validation { fields, body }
    }
}

impl From<LensError> for ApiError {
    fn from(value: LensError) -> Self {
        ApiError::Core(value)
    }
}

impl From<FetchError> for ApiError {
    fn from(value: FetchError) -> Self {
        ApiError::Upstream(value)
    }
}

pub fn map_error(
    err: &ApiError,
    correlation_id: Option<String>,
) -> (StatusCode, Json<ErrorEnvelope>) {
    let body = match err {
        ApiError::Validation { body, .. } => Some(body.clone()),
        _ => None,
    };
    let (status, code, detail) = match err {
        ApiError::Validation { fields, .. } => (
            StatusCode::BAD_REQUEST,
            "invalid_input",
            Detail::Fields(fields.clone()),
        ),
        ApiError::InvalidUrl => (
            StatusCode::BAD_REQUEST,
            "invalid_url",
            Detail::Message(MSG_INVALID_URL.to_string()),
        ),
        ApiError::Upstream(fetch) => map_fetch_error(fetch),
        ApiError::Core(core) => map_core_error(core),
    };

    (
        status,
        Json(ErrorEnvelope {
            code: code.to_string(),
            detail,
            correlation_id,
            body,
        }),
    )
}

fn map_fetch_error(err: &FetchError) -> (StatusCode, &'static str, Detail) {
    match err {
        FetchError::Status { status: 404 } => (
            StatusCode::NOT_FOUND,
            "not_found",
            Detail::Message(MSG_RESOURCE_NOT_FOUND.to_string()),
        ),
        FetchError::Status { status } => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            "upstream_error",
            Detail::Message(MSG_UPSTREAM.to_string()),
        ),
        FetchError::Network { .. } => (
            StatusCode::BAD_GATEWAY,
            "upstream_error",
            Detail::Message(MSG_UPSTREAM.to_string()),
        ),
    }
}

fn map_core_error(err: &LensError) -> (StatusCode, &'static str, Detail) {
    match err {
        LensError::Task(task) => map_task_error(task),
        LensError::Store(store) => map_store_error(store),
        LensError::Queue(queue) => map_queue_error(queue),
        LensError::Analysis(_) | LensError::Internal { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            Detail::Message(err.to_string()),
        ),
    }
}

fn map_task_error(err: &TaskError) -> (StatusCode, &'static str, Detail) {
    match err {
        TaskError::NotFound => (
            StatusCode::NOT_FOUND,
            "not_found",
            Detail::Message(MSG_TASK_NOT_FOUND.to_string()),
        ),
        TaskError::NotReady { .. } => (
            StatusCode::BAD_REQUEST,
            "not_ready",
            Detail::Message(MSG_NOT_READY.to_string()),
        ),
        TaskError::InvalidTransition { .. } => (
            StatusCode::CONFLICT,
            "invalid_state",
            Detail::Message(err.to_string()),
        ),
        TaskError::Corrupt { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            Detail::Message(err.to_string()),
        ),
    }
}

fn map_store_error(err: &StoreError) -> (StatusCode, &'static str, Detail) {
    match err {
        StoreError::Unavailable { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "store_unavailable",
            Detail::Message(err.to_string()),
        ),
        StoreError::Backend { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            Detail::Message(err.to_string()),
        ),
    }
}

fn map_queue_error(err: &QueueError) -> (StatusCode, &'static str, Detail) {
    match err {
        QueueError::Closed | QueueError::Backend { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "queue_unavailable",
            Detail::Message(err.to_string()),
        ),
        QueueError::Encode { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            Detail::Message(err.to_string()),
        ),
    }
}
