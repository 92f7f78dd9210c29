use crate::error::{LensError, StoreError, TaskError};
use crate::queue::TaskQueue;
use crate::store::{Guarded, KvStore};
use crate::types::{AnalysisReport, JobPayload, TaskId, TaskOutcome, TaskStatus};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns the task state machine:
///
/// ```text
/// PENDING -> IN_PROGRESS -> COMPLETED
///    |            \-------> FAILED
///    \--------------------> FAILED   (enqueue failure)
/// ```
///
/// Every task keeps two keys, `<id>:status` and `<id>:result`. Transitions are
/// guarded writes, so a terminal task is never rewritten, and result and
/// status land together.
#[derive(Clone)]
pub struct TaskLifecycle {
    store: Arc<dyn KvStore>,
}

impl TaskLifecycle {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn create_task(&self) -> Result<TaskId, StoreError> {
        let id = TaskId::generate();
        self.store
            .set_many(&[
                (id.status_key(), TaskStatus::Pending.as_str().to_string()),
                (id.result_key(), String::new()),
            ])
            .await?;
        debug!(task_id = %id, "task created");
        Ok(id)
    }

    /// Creates a task and queues its job. A task whose job could not be queued
    /// is failed on the spot so pollers do not wait on it forever.
    pub async fn submit(
        &self,
        queue: &dyn TaskQueue,
        payload: JobPayload,
    ) -> Result<TaskId, LensError> {
        let id = self.create_task().await?;
        if let Err(err) = queue.enqueue(payload.into_job(id.clone())).await {
            warn!(task_id = %id, error = %err, "enqueue failed");
            self.fail(&id, &err.to_string()).await?;
            return Err(err.into());
        }
        info!(task_id = %id, "task queued");
        Ok(id)
    }

    /// Marks the task as picked up by a worker. Safe to repeat.
    pub async fn begin(&self, id: &TaskId) -> Result<(), LensError> {
        self.transition(
            id,
            &[TaskStatus::Pending, TaskStatus::InProgress],
            TaskStatus::InProgress,
            None,
        )
        .await
    }

    pub async fn complete(&self, id: &TaskId, report: &AnalysisReport) -> Result<(), LensError> {
        let encoded = serde_json::to_string(report).map_err(|err| LensError::Internal {
            message: err.to_string(),
        })?;
        self.transition(
            id,
            &[TaskStatus::InProgress],
            TaskStatus::Completed,
            Some(encoded),
        )
        .await
    }

    pub async fn fail(&self, id: &TaskId, detail: &str) -> Result<(), LensError> {
        self.transition(
            id,
            &[TaskStatus::Pending, TaskStatus::InProgress],
            TaskStatus::Failed,
            Some(detail.to_string()),
        )
        .await
    }

    pub async fn get_status(&self, id: &TaskId) -> Result<TaskStatus, LensError> {
        let Some(raw) = self.store.get(&id.status_key()).await? else {
            return Err(TaskError::NotFound.into());
        };
        Ok(parse_status(&raw)?)
    }

    /// Status and decoded result of a finished task.
    pub async fn get_result(&self, id: &TaskId) -> Result<TaskOutcome, LensError> {
        let mut values = self
            .store
            .get_many(&[id.status_key(), id.result_key()])
            .await?
            .into_iter();
        let (status, result) = match (values.next().flatten(), values.next().flatten()) {
            (None, _) => return Err(TaskError::NotFound.into()),
            (Some(status), result) => (parse_status(&status)?, result),
        };

        let results = match status {
            TaskStatus::Pending | TaskStatus::InProgress => {
                return Err(TaskError::NotReady { status }.into());
            }
            TaskStatus::Completed => {
                let raw = result.ok_or_else(|| TaskError::Corrupt {
                    message: format!("{id} is COMPLETED without a result"),
                })?;
                serde_json::from_str::<Value>(&raw).map_err(|err| TaskError::Corrupt {
                    message: err.to_string(),
                })?
            }
            TaskStatus::Failed => Value::String(result.unwrap_or_default()),
        };
        Ok(TaskOutcome { status, results })
    }

    async fn transition(
        &self,
        id: &TaskId,
        from: &[TaskStatus],
        to: TaskStatus,
        result: Option<String>,
    ) -> Result<(), LensError> {
        let allowed: Vec<&str> = from.iter().map(TaskStatus::as_str).collect();
        let mut entries = Vec::with_capacity(2);
        if let Some(result) = result {
            entries.push((id.result_key(), result));
        }
        entries.push((id.status_key(), to.as_str().to_string()));

        match self
            .store
            .set_many_if(&id.status_key(), &allowed, &entries)
            .await?
        {
            Guarded::Applied => {
                debug!(task_id = %id, status = %to, "task transitioned");
                Ok(())
            }
            Guarded::Missing => Err(TaskError::NotFound.into()),
            Guarded::Rejected { current } => Err(TaskError::InvalidTransition {
                from: parse_status(&current)?,
                to,
            }
            .into()),
        }
    }
}

fn parse_status(raw: &str) -> Result<TaskStatus, TaskError> {
    raw.parse::<TaskStatus>().map_err(|err| TaskError::Corrupt {
        message: err.to_string(),
    })
}
