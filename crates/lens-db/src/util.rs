use chrono::{DateTime, Utc};
use lens_core::error::StoreError;

pub fn to_rfc3339(value: &DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub fn sqlite_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref code, _)
            if matches!(
                code.code,
                rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            StoreError::Unavailable {
                message: err.to_string(),
            }
        }
        other => StoreError::Backend {
            message: other.to_string(),
        },
    }
}

pub fn redis_error(err: redis::RedisError) -> StoreError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_timeout() {
        StoreError::Unavailable {
            message: err.to_string(),
        }
    } else {
        StoreError::Backend {
            message: err.to_string(),
        }
    }
}
