use chrono::Utc;
use futures::FutureExt;
use lens_core::error::{AnalysisError, TaskError};
use lens_core::types::{AnalysisJob, TaskId};
use lens_core::{Analyzer, LensError, TaskLifecycle};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    /// The task was already finished or no longer exists.
    Skipped,
}

/// Runs one job from `begin` to a terminal state. Analysis errors, panics and
/// failed result writes end in FAILED. An error is returned only when the
/// store refuses the FAILED write too.
#[derive(Clone)]
pub struct Executor {
    lifecycle: TaskLifecycle,
    analyzer: Analyzer,
}

impl Executor {
    pub fn new(lifecycle: TaskLifecycle, analyzer: Analyzer) -> Self {
        Self {
            lifecycle,
            analyzer,
        }
    }

    pub async fn execute(&self, job: AnalysisJob) -> Result<JobOutcome, LensError> {
        let id = &job.task_id;
        match self.lifecycle.begin(id).await {
            Ok(()) => {}
            Err(LensError::Task(TaskError::InvalidTransition { from, .. })) => {
                warn!(task_id = %id, status = %from, "task already finished, skipping redelivery");
                return Ok(JobOutcome::Skipped);
            }
            Err(LensError::Task(TaskError::NotFound)) => {
                warn!(task_id = %id, "task record missing, skipping");
                return Ok(JobOutcome::Skipped);
            }
            Err(err) => {
                warn!(task_id = %id, error = %err, "could not start task");
                self.fail_or_log(id, &err).await;
                return Err(err);
            }
        }

        let queued = Utc::now() - job.enqueued_at;
        info!(
            task_id = %id,
            repo = %format!("{}/{}", job.repo.owner, job.repo.repo),
            pr_number = job.pr_number,
            queued_ms = queued.num_milliseconds(),
            "analysis started"
        );

        let analysis = AssertUnwindSafe(self.analyzer.analyze(&job.diff))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(AnalysisError::Panicked {
                    message: panic_message(panic.as_ref()),
                })
            });

        match analysis {
            Ok(report) => match self.lifecycle.complete(id, &report).await {
                Ok(()) => {
                    info!(task_id = %id, issues = report.summary.total_issues, "analysis completed");
                    Ok(JobOutcome::Completed)
                }
                Err(LensError::Task(TaskError::InvalidTransition { from, .. })) => {
                    warn!(task_id = %id, status = %from, "task finished elsewhere, result dropped");
                    Ok(JobOutcome::Skipped)
                }
                Err(err) => {
                    warn!(task_id = %id, error = %err, "could not record result");
                    if self.fail_or_log(id, &err).await {
                        Ok(JobOutcome::Failed)
                    } else {
                        Err(err)
                    }
                }
            },
            Err(err) => {
                warn!(task_id = %id, error = %err, "analysis failed");
                self.lifecycle.fail(id, &err.to_string()).await?;
                Ok(JobOutcome::Failed)
            }
        }
    }

    /// Fails a job that will never run, e.g. one left in the queue at
    /// shutdown.
    pub async fn abandon(&self, job: &AnalysisJob, reason: &str) -> Result<JobOutcome, LensError> {
        match self.lifecycle.fail(&job.task_id, reason).await {
            Ok(()) => Ok(JobOutcome::Failed),
            Err(LensError::Task(TaskError::InvalidTransition { .. } | TaskError::NotFound)) => {
                Ok(JobOutcome::Skipped)
            }
            Err(err) => Err(err),
        }
    }

    /// Records `cause` as the task's failure. Returns false when that write
    /// fails as well; the task is then left as the store last saw it.
    async fn fail_or_log(&self, id: &TaskId, cause: &LensError) -> bool {
        match self.lifecycle.fail(id, &cause.to_string()).await {
            Ok(()) => true,
            Err(err) => {
                error!(task_id = %id, error = %err, cause = %cause, "could not mark task failed");
                false
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
