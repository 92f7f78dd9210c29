use crate::schema;
use crate::util::{sqlite_error, to_rfc3339};
use async_trait::async_trait;
use lens_core::error::StoreError;
use lens_core::store::{Entry, Guarded, KvStore};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::sync::{Arc, Mutex};
use tracing::debug;

const UPSERT: &str = "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3) \
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";
const SELECT: &str = "SELECT value FROM kv WHERE key = ?1";

/// SQLite-backed store. One connection is shared behind a mutex and all work
/// runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = schema::open_and_migrate(path).map_err(sqlite_error)?;
        debug!(path, "sqlite store opened");
        Ok(Self::new(conn))
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|err| StoreError::Backend {
                message: err.to_string(),
            })?;
            f(&mut guard).map_err(sqlite_error)
        })
        .await
        .map_err(|err| StoreError::Backend {
            message: err.to_string(),
        })?
    }
}

fn write_entries(conn: &Connection, entries: &[Entry]) -> rusqlite::Result<()> {
    let now = to_rfc3339(&chrono::Utc::now());
    let mut stmt = conn.prepare_cached(UPSERT)?;
    for (key, value) in entries {
        stmt.execute((key, value, &now))?;
    }
    Ok(())
}

fn read_value(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.prepare_cached(SELECT)?
        .query_row([key], |row| row.get(0))
        .optional()
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| read_value(conn, &key)).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let keys = keys.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let values = keys
                .iter()
                .map(|key| read_value(&tx, key))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            tx.commit()?;
            Ok(values)
        })
        .await
    }

    async fn set_many(&self, entries: &[Entry]) -> Result<(), StoreError> {
        let entries = entries.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            write_entries(&tx, &entries)?;
            tx.commit()
        })
        .await
    }

    async fn set_many_if(
        &self,
        guard_key: &str,
        allowed: &[&str],
        entries: &[Entry],
    ) -> Result<Guarded, StoreError> {
        let guard_key = guard_key.to_string();
        let allowed: Vec<String> = allowed.iter().map(|value| value.to_string()).collect();
        let entries = entries.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let outcome = match read_value(&tx, &guard_key)? {
                None => Guarded::Missing,
                Some(current) if !allowed.contains(&current) => Guarded::Rejected { current },
                Some(_) => {
                    write_entries(&tx, &entries)?;
                    Guarded::Applied
                }
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, value: &str) -> Entry {
        (key.to_string(), value.to_string())
    }

    fn store() -> SqliteStore {
        SqliteStore::new(schema::with_test_db().unwrap())
    }

    #[tokio::test]
    async fn set_and_get() {
        let store = store();
        assert_eq!(store.get("missing").await.unwrap(), None);

        store
            .set_many(&[entry("a", "1"), entry("b", "")])
            .await
            .unwrap();
        store.set_many(&[entry("a", "2")]).await.unwrap();
        let values = store
            .get_many(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(
            values,
            vec![Some("2".to_string()), Some(String::new()), None]
        );
    }

    #[tokio::test]
    async fn guarded_write() {
        let store = store();
        assert_eq!(
            store
                .set_many_if("s", &["PENDING"], &[entry("s", "IN_PROGRESS")])
                .await
                .unwrap(),
            Guarded::Missing
        );

        store.set_many(&[entry("s", "PENDING")]).await.unwrap();
        assert_eq!(
            store
                .set_many_if(
                    "s",
                    &["PENDING", "IN_PROGRESS"],
                    &[entry("r", "{}"), entry("s", "COMPLETED")]
                )
                .await
                .unwrap(),
            Guarded::Applied
        );
        assert_eq!(
            store
                .set_many_if("s", &["IN_PROGRESS"], &[entry("r", "late")])
                .await
                .unwrap(),
            Guarded::Rejected {
                current: "COMPLETED".to_string()
            }
        );
        assert_eq!(store.get("r").await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        let path = path.to_str().unwrap();

        let store = SqliteStore::open(path).unwrap();
        store.set_many(&[entry("k", "v")]).await.unwrap();
        drop(store);

        let store = SqliteStore::open(path).unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_interfere() {
        let store = store();
        let mut handles = Vec::new();
        for n in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set_many(&[entry(&format!("k{n}"), &n.to_string())])
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        for n in 0..16 {
            assert_eq!(
                store.get(&format!("k{n}")).await.unwrap(),
                Some(n.to_string())
            );
        }
    }
}
