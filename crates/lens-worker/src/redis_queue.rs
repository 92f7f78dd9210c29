use async_trait::async_trait;
use lens_core::error::QueueError;
use lens_core::types::AnalysisJob;
use lens_core::{JobSource, TaskQueue};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Queue on a Redis list: producers `LPUSH`, workers in any process `RPOP`.
/// A popped job belongs to exactly one worker.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    key: String,
}

fn backend(err: redis::RedisError) -> QueueError {
    QueueError::Backend {
        message: err.to_string(),
    }
}

impl RedisQueue {
    pub fn new(conn: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            conn,
            key: key.into(),
        }
    }

    pub async fn connect(url: &str, key: impl Into<String>) -> Result<Self, QueueError> {
        let client = redis::Client::open(url).map_err(backend)?;
        let conn = ConnectionManager::new(client).await.map_err(backend)?;
        Ok(Self::new(conn, key))
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

pub fn encode_job(job: &AnalysisJob) -> Result<String, QueueError> {
    serde_json::to_string(job).map_err(|err| QueueError::Encode {
        message: err.to_string(),
    })
}

pub fn decode_job(raw: &str) -> Result<AnalysisJob, QueueError> {
    serde_json::from_str(raw).map_err(|err| QueueError::Encode {
        message: err.to_string(),
    })
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn enqueue(&self, job: AnalysisJob) -> Result<(), QueueError> {
        let payload = encode_job(&job)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(&self.key, payload).await.map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl JobSource for RedisQueue {
    async fn next_job(&self) -> Result<Option<AnalysisJob>, QueueError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.rpop(&self.key, None).await.map_err(backend)?;
        raw.as_deref().map(decode_job).transpose()
    }
}
