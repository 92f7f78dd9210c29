//! In-memory store for tests and single-process experiments.

use crate::error::StoreError;
use crate::store::{Entry, Guarded, KvStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops a key, standing in for external expiry.
    pub fn evict(&self, key: &str) {
        if let Ok(mut state) = self.state.write() {
            state.remove(key);
        }
    }
}

fn poisoned(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend {
        message: err.to_string(),
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.get(key).cloned())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(keys.iter().map(|key| state.get(key).cloned()).collect())
    }

    async fn set_many(&self, entries: &[Entry]) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        for (key, value) in entries {
            state.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn set_many_if(
        &self,
        guard_key: &str,
        allowed: &[&str],
        entries: &[Entry],
    ) -> Result<Guarded, StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        let Some(current) = state.get(guard_key) else {
            return Ok(Guarded::Missing);
        };
        if !allowed.contains(&current.as_str()) {
            return Ok(Guarded::Rejected {
                current: current.clone(),
            });
        }
        for (key, value) in entries {
            state.insert(key.clone(), value.clone());
        }
        Ok(Guarded::Applied)
    }
}
