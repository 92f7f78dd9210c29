use crate::types::enums::TaskStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task not found")]
    NotFound,
    #[error("task is {status}, results not available")]
    NotReady { status: TaskStatus },
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("corrupt task record: {message}")]
    Corrupt { message: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {message}")]
    Unavailable { message: String },
    #[error("store backend error: {message}")]
    Backend { message: String },
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue closed")]
    Closed,
    #[error("queue backend error: {message}")]
    Backend { message: String },
    #[error("job encoding failed: {message}")]
    Encode { message: String },
}

/// Failures of the analysis step. These never reach an HTTP caller directly;
/// the worker records them as the task's FAILED result.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("generation failed: {message}")]
    Generation { message: String },
    #[error("malformed analysis output: {message}")]
    MalformedOutput { message: String },
    #[error("analysis panicked: {message}")]
    Panicked { message: String },
}

#[derive(Debug, Error)]
pub enum LensError {
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("internal error: {message}")]
    Internal { message: String },
}
