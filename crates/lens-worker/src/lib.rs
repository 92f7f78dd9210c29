pub mod channel;
pub mod executor;
pub mod ollama;
pub mod pool;
pub mod redis_queue;

pub use channel::{ChannelQueue, ChannelSource, channel};
pub use executor::{Executor, JobOutcome};
pub use ollama::OllamaGenerator;
pub use pool::WorkerGroup;
pub use redis_queue::RedisQueue;
