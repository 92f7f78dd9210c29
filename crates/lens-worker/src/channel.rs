use async_trait::async_trait;
use lens_core::error::QueueError;
use lens_core::types::AnalysisJob;
use lens_core::{JobSource, TaskQueue};
use tokio::sync::{Mutex, mpsc};

/// In-process queue: a bounded channel whose receiving end is shared by all
/// workers of one process.
pub fn channel(capacity: usize) -> (ChannelQueue, ChannelSource) {
    let (sender, receiver) = mpsc::channel(capacity);
    (
        ChannelQueue { sender },
        ChannelSource {
            receiver: Mutex::new(receiver),
        },
    )
}

#[derive(Clone)]
pub struct ChannelQueue {
    sender: mpsc::Sender<AnalysisJob>,
}

#[async_trait]
impl TaskQueue for ChannelQueue {
    async fn enqueue(&self, job: AnalysisJob) -> Result<(), QueueError> {
        self.sender.try_send(job).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => QueueError::Backend {
                message: "queue is full".to_string(),
            },
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

pub struct ChannelSource {
    receiver: Mutex<mpsc::Receiver<AnalysisJob>>,
}

#[async_trait]
impl JobSource for ChannelSource {
    async fn next_job(&self) -> Result<Option<AnalysisJob>, QueueError> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await.map(Some).ok_or(QueueError::Closed)
    }

    /// `mpsc::Receiver::recv` loses nothing when dropped before it resolves.
    fn cancel_safe(&self) -> bool {
        true
    }

    async fn drain(&self) -> Result<Vec<AnalysisJob>, QueueError> {
        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut jobs = Vec::new();
        while let Ok(job) = receiver.try_recv() {
            jobs.push(job);
        }
        Ok(jobs)
    }
}
