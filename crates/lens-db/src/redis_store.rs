use crate::util::redis_error;
use async_trait::async_trait;
use lens_core::error::StoreError;
use lens_core::store::{Entry, Guarded, KvStore};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::debug;

// KEYS[1] guard key, KEYS[2..] keys to write.
// ARGV[1] number of allowed guard values, then the allowed values, then one
// value per written key.
const GUARDED_SET: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then
  return {2, ''}
end
local allowed = tonumber(ARGV[1])
for i = 2, allowed + 1 do
  if ARGV[i] == current then
    for j = 2, #KEYS do
      redis.call('SET', KEYS[j], ARGV[allowed + j])
    end
    return {0, current}
  end
end
return {1, current}
";

/// KEYS and ARGV for one `GUARDED_SET` call.
#[derive(Debug, PartialEq, Eq)]
struct GuardedArgs<'a> {
    keys: Vec<&'a str>,
    args: Vec<String>,
}

fn guarded_args<'a>(
    guard_key: &'a str,
    allowed: &[&str],
    entries: &'a [Entry],
) -> GuardedArgs<'a> {
    let mut keys = Vec::with_capacity(entries.len() + 1);
    keys.push(guard_key);
    keys.extend(entries.iter().map(|(key, _)| key.as_str()));

    let mut args = Vec::with_capacity(allowed.len() + entries.len() + 1);
    args.push(allowed.len().to_string());
    args.extend(allowed.iter().map(|value| (*value).to_string()));
    args.extend(entries.iter().map(|(_, value)| value.clone()));
    GuardedArgs { keys, args }
}

/// Redis-backed store. `ConnectionManager` reconnects on its own and is cheap
/// to clone, so every call works on its own handle.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    guarded_set: Script,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            guarded_set: Script::new(GUARDED_SET),
        }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(redis_error)?;
        let conn = ConnectionManager::new(client).await.map_err(redis_error)?;
        debug!("redis store connected");
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(redis_error)?;
        Ok(value)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = conn.mget(keys).await.map_err(redis_error)?;
        Ok(values)
    }

    async fn set_many(&self, entries: &[Entry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.set(key, value).ignore();
        }
        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await.map_err(redis_error)?;
        Ok(())
    }

    async fn set_many_if(
        &self,
        guard_key: &str,
        allowed: &[&str],
        entries: &[Entry],
    ) -> Result<Guarded, StoreError> {
        let GuardedArgs { keys, args } = guarded_args(guard_key, allowed, entries);
        let mut invocation = self.guarded_set.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }

        let mut conn = self.conn.clone();
        let (code, current): (i64, String) = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;
        match code {
            0 => Ok(Guarded::Applied),
            1 => Ok(Guarded::Rejected { current }),
            2 => Ok(Guarded::Missing),
            other => Err(StoreError::Backend {
                message: format!("unexpected guarded write reply: {other}"),
            }),
        }
    }
}
