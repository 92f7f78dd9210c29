use crate::executor::{Executor, JobOutcome};
use lens_core::JobSource;
use lens_core::error::QueueError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Handle over a set of worker tasks pulling from one job source.
///
/// Shutdown stops workers from taking new jobs; a job already running is
/// finished first. Jobs still buffered in the source are then failed.
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
    source: Arc<dyn JobSource>,
    executor: Executor,
}

/// Result recorded for jobs that were still queued when the group stopped.
pub const SHUTDOWN_REASON: &str = "worker shut down";

impl WorkerGroup {
    /// Spawns `n` workers. `idle` is how long a worker sleeps when the source
    /// has nothing to hand out or reports an error.
    pub fn spawn(
        n: usize,
        source: Arc<dyn JobSource>,
        executor: Executor,
        idle: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let source = Arc::clone(&source);
            let executor = executor.clone();
            let mut rx = shutdown_rx.clone();

            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, source, executor, idle, &mut rx).await;
            }));
        }
        info!(workers = n, "worker group started");

        Self {
            shutdown_tx,
            joins,
            source,
            executor,
        }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let source = Arc::clone(&self.source);
        let executor = self.executor.clone();
        self.join().await;
        abandon_leftovers(source.as_ref(), &executor).await;
    }

    /// Waits for every worker to stop on its own (the source closed).
    pub async fn join(self) {
        for join in self.joins {
            if let Err(err) = join.await {
                error!(error = %err, "worker task aborted");
            }
        }
    }
}

async fn abandon_leftovers(source: &dyn JobSource, executor: &Executor) {
    let jobs = match source.drain().await {
        Ok(jobs) => jobs,
        Err(err) => {
            warn!(error = %err, "could not drain job source");
            return;
        }
    };
    if jobs.is_empty() {
        return;
    }
    let mut failed = 0usize;
    for job in &jobs {
        match executor.abandon(job, SHUTDOWN_REASON).await {
            Ok(JobOutcome::Failed) => failed += 1,
            Ok(_) => {}
            Err(err) => {
                error!(task_id = %job.task_id, error = %err, "could not fail queued task");
            }
        }
    }
    warn!(queued = jobs.len(), failed, "failed jobs left in queue at shutdown");
}

async fn worker_loop(
    worker_id: usize,
    source: Arc<dyn JobSource>,
    executor: Executor,
    idle: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // A source that is not cancel safe may already have removed the job
        // it is about to return, so its poll always runs to completion.
        let next = if source.cancel_safe() {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                next = source.next_job() => next,
            }
        } else {
            source.next_job().await
        };

        match next {
            Ok(Some(job)) => {
                let task_id = job.task_id.clone();
                match executor.execute(job).await {
                    Ok(outcome) => {
                        debug!(worker_id, task_id = %task_id, ?outcome, "job finished");
                    }
                    Err(err) => {
                        error!(worker_id, task_id = %task_id, error = %err, "job could not be recorded");
                    }
                }
            }
            Ok(None) => idle_wait(idle, shutdown_rx).await,
            Err(QueueError::Closed) => {
                debug!(worker_id, "job source closed");
                break;
            }
            Err(err) => {
                warn!(worker_id, error = %err, "job source error");
                idle_wait(idle, shutdown_rx).await;
            }
        }
    }
    debug!(worker_id, "worker stopped");
}

async fn idle_wait(idle: Duration, shutdown_rx: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(idle) => {}
        _ = shutdown_rx.changed() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::channel;
    use async_trait::async_trait;
    use lens_core::error::AnalysisError;
    use lens_core::memory::MemoryStore;
    use lens_core::types::{AnalysisJob, JobPayload, RepoRef, TaskStatus};
    use lens_core::{Analyzer, Generator, TaskLifecycle, TaskQueue};
    use serde_json::Value;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const REPORT: &str = r#"{"files": [], "summary": {"total_files": 0, "total_issues": 0, "critical_issues": 0}}"#;

    struct Counting(AtomicUsize);

    #[async_trait]
    impl Generator for Counting {
        async fn generate(&self, _prompt: &str) -> Result<String, AnalysisError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(REPORT.to_string())
        }
    }

    struct Slow(Duration);

    #[async_trait]
    impl Generator for Slow {
        async fn generate(&self, _prompt: &str) -> Result<String, AnalysisError> {
            tokio::time::sleep(self.0).await;
            Ok(REPORT.to_string())
        }
    }

    /// Hands out its jobs one at a time, each after a delay, like a blocking
    /// pop that removes the job before returning it.
    struct PoppingSource {
        jobs: Mutex<Vec<AnalysisJob>>,
        delay: Duration,
    }

    #[async_trait]
    impl JobSource for PoppingSource {
        async fn next_job(&self) -> Result<Option<AnalysisJob>, QueueError> {
            let job = self.jobs.lock().unwrap().pop();
            tokio::time::sleep(self.delay).await;
            Ok(job)
        }
    }

    fn payload(pr_number: i64) -> JobPayload {
        JobPayload {
            repo: RepoRef {
                owner: "octo".to_string(),
                repo: "widgets".to_string(),
            },
            pr_number,
            diff: String::new(),
        }
    }

    #[tokio::test]
    async fn workers_drain_queue_then_stop_when_closed() {
        let lifecycle = TaskLifecycle::new(Arc::new(MemoryStore::new()));
        let generator = Arc::new(Counting(AtomicUsize::new(0)));
        let executor = Executor::new(lifecycle.clone(), Analyzer::new(generator.clone()));
        let (queue, source) = channel(16);

        let mut ids = Vec::new();
        for n in 1..=8 {
            ids.push(lifecycle.submit(&queue, payload(n)).await.unwrap());
        }

        let group = WorkerGroup::spawn(3, Arc::new(source), executor, Duration::from_millis(10));
        assert_eq!(group.len(), 3);
        drop(queue);
        group.join().await;

        assert_eq!(generator.0.load(Ordering::SeqCst), 8);
        for id in &ids {
            assert_eq!(
                lifecycle.get_status(id).await.unwrap(),
                TaskStatus::Completed
            );
        }
    }

    #[tokio::test]
    async fn shutdown_stops_idle_workers() {
        let lifecycle = TaskLifecycle::new(Arc::new(MemoryStore::new()));
        let executor = Executor::new(
            lifecycle,
            Analyzer::new(Arc::new(Counting(AtomicUsize::new(0)))),
        );
        let (queue, source) = channel(4);
        let group = WorkerGroup::spawn(2, Arc::new(source), executor, Duration::from_millis(10));

        tokio::time::timeout(Duration::from_secs(5), group.shutdown_and_join())
            .await
            .unwrap();
        drop(queue);
    }

    #[tokio::test]
    async fn shutdown_fails_jobs_still_queued() {
        let lifecycle = TaskLifecycle::new(Arc::new(MemoryStore::new()));
        let executor = Executor::new(
            lifecycle.clone(),
            Analyzer::new(Arc::new(Slow(Duration::from_millis(200)))),
        );
        let (queue, source) = channel(16);
        let mut ids = Vec::new();
        for n in 1..=4 {
            ids.push(lifecycle.submit(&queue, payload(n)).await.unwrap());
        }

        let group = WorkerGroup::spawn(1, Arc::new(source), executor, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        group.shutdown_and_join().await;

        assert_eq!(
            lifecycle.get_status(&ids[0]).await.unwrap(),
            TaskStatus::Completed
        );
        for id in &ids[1..] {
            let outcome = lifecycle.get_result(id).await.unwrap();
            assert_eq!(outcome.status, TaskStatus::Failed);
            assert_eq!(outcome.results, Value::String(SHUTDOWN_REASON.to_string()));
        }
        assert!(matches!(
            queue.enqueue(payload(5).into_job(lifecycle.create_task().await.unwrap())).await,
            Err(QueueError::Closed)
        ));
    }

    #[tokio::test]
    async fn shutdown_waits_for_an_in_flight_pop() {
        let lifecycle = TaskLifecycle::new(Arc::new(MemoryStore::new()));
        let executor = Executor::new(
            lifecycle.clone(),
            Analyzer::new(Arc::new(Counting(AtomicUsize::new(0)))),
        );
        let id = lifecycle.create_task().await.unwrap();
        let source = PoppingSource {
            jobs: Mutex::new(vec![payload(1).into_job(id.clone())]),
            delay: Duration::from_millis(100),
        };

        let group = WorkerGroup::spawn(1, Arc::new(source), executor, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(20)).await;
        group.shutdown_and_join().await;

        assert_eq!(lifecycle.get_status(&id).await.unwrap(), TaskStatus::Completed);
    }
}
