pub mod redis_store;
pub mod schema;
pub mod sqlite_store;
pub mod util;

pub use redis_store::RedisStore;
pub use sqlite_store::SqliteStore;
