use crate::error::QueueError;
use crate::types::AnalysisJob;
use async_trait::async_trait;

/// Producer side of the job queue. `enqueue` hands the job off and returns
/// without waiting for it to run.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, job: AnalysisJob) -> Result<(), QueueError>;
}

/// Consumer side of the job queue.
///
/// `Ok(None)` means nothing is available right now; `Err(QueueError::Closed)`
/// means no job will ever arrive again.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn next_job(&self) -> Result<Option<AnalysisJob>, QueueError>;

    /// Whether a pending `next_job` may be dropped without losing a job.
    /// Sources that remove the job before handing it over (e.g. a pop) must
    /// answer `false`; workers then never abandon a call halfway.
    fn cancel_safe(&self) -> bool {
        false
    }

    /// Stops the source and returns the jobs it still holds in memory. Jobs
    /// kept by an external broker stay there and are not returned.
    async fn drain(&self) -> Result<Vec<AnalysisJob>, QueueError> {
        Ok(Vec::new())
    }
}
