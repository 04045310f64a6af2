//! Ephemeral key-value store.
//!
//! Redis is the single source of truth for one-time codes, the refresh-token
//! blacklist, interview sessions, conversation history and rate-limit
//! counters. Every entry is TTL-bound; expiry silently destroys state.
//!
//! Tests run against an in-process backend with the same TTL, counter and
//! compare-and-swap semantics.

use axum::extract::FromRef;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::AppState;
use crate::error::{Result, ServerError};

/// Counter increment with expiry set on first hit, in one round-trip.
const INCR_WINDOW_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('EXPIRE', KEYS[1], tonumber(ARGV[1]))
end
return count
"#;

/// Optimistic compare-and-swap on a JSON blob carrying a `version` field.
/// Returns 1 on store, 0 on version conflict, -1 when the entry vanished.
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
  local ok, decoded = pcall(cjson.decode, current)
  if not ok or tonumber(decoded.version or 0) ~= tonumber(ARGV[1]) then
    return 0
  end
elseif tonumber(ARGV[1]) ~= 0 then
  return -1
end
redis.call('SET', KEYS[1], ARGV[2], 'EX', tonumber(ARGV[3]))
return 1
"#;

/// Outcome of a compare-and-swap write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Stored,
    Conflict,
    Missing,
}

#[cfg(test)]
mod memory {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::time::{Duration, Instant};

    #[derive(Clone)]
    pub(super) struct Entry {
        pub value: String,
        pub expires_at: Instant,
    }

    #[derive(Clone, Default)]
    pub(super) struct Store(Arc<Mutex<HashMap<String, Entry>>>);

    impl Store {
        fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
            self.0.lock().expect("cache store poisoned")
        }

        pub fn get(&self, key: &str) -> Option<String> {
            let mut map = self.lock();
            match map.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    Some(entry.value.clone())
                }
                Some(_) => {
                    map.remove(key);
                    None
                }
                None => None,
            }
        }

        pub fn set(&self, key: &str, value: &str, ttl: u64) {
            self.lock().insert(
                key.to_owned(),
                Entry {
                    value: value.to_owned(),
                    expires_at: Instant::now() + Duration::from_secs(ttl),
                },
            );
        }

        pub fn set_if_absent(&self, key: &str, value: &str, ttl: u64) -> bool {
            if self.get(key).is_some() {
                return false;
            }
            self.set(key, value, ttl);
            true
        }

        pub fn delete(&self, key: &str) {
            self.lock().remove(key);
        }

        pub fn incr(&self, key: &str, ttl: u64) -> i64 {
            match self.get(key) {
                Some(raw) => {
                    let count = raw.parse::<i64>().unwrap_or(0) + 1;
                    // Keep the original expiry, like INCR does.
                    if let Some(entry) = self.lock().get_mut(key) {
                        entry.value = count.to_string();
                    }
                    count
                }
                None => {
                    self.set(key, "1", ttl);
                    1
                }
            }
        }
    }
}

#[derive(Clone)]
enum Backend {
    Redis(ConnectionManager),
    #[cfg(test)]
    Memory(memory::Store),
}

/// Shared cache handle.
#[derive(Clone)]
pub struct Cache {
    backend: Backend,
}

impl Cache {
    /// Init cache connection.
    pub async fn new(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        tracing::info!(%url, "redis connected");

        Ok(Self {
            backend: Backend::Redis(conn),
        })
    }

    /// In-process backend with the same semantics, for tests.
    #[cfg(test)]
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(memory::Store::default()),
        }
    }

    /// Get a raw string entry.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(conn.get(key).await?)
            }
            #[cfg(test)]
            Backend::Memory(store) => Ok(store.get(key)),
        }
    }

    /// Store a raw string entry with a TTL in seconds.
    pub async fn set(&self, key: &str, value: &str, ttl: u64) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                conn.set_ex::<_, _, ()>(key, value, ttl).await?;
                Ok(())
            }
            #[cfg(test)]
            Backend::Memory(store) => {
                store.set(key, value, ttl);
                Ok(())
            }
        }
    }

    /// Store an entry only when the key is vacant (`SET NX EX`), in one
    /// atomic operation. Returns whether the entry was stored.
    pub async fn set_if_absent(&self, key: &str, value: &str, ttl: u64) -> Result<bool> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let reply: Option<String> = redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl)
                    .query_async(&mut conn)
                    .await?;
                Ok(reply.is_some())
            }
            #[cfg(test)]
            Backend::Memory(store) => Ok(store.set_if_absent(key, value, ttl)),
        }
    }

    /// Get and deserialize a JSON entry.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw).map_err(ServerError::internal)?,
            )),
            None => Ok(None),
        }
    }

    /// Serialize and store a JSON entry with a TTL in seconds.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: u64) -> Result<()> {
        let raw = serde_json::to_string(value).map_err(ServerError::internal)?;
        self.set(key, &raw, ttl).await
    }

    /// Delete an entry.
    pub async fn delete(&self, key: &str) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                conn.del::<_, ()>(key).await?;
                Ok(())
            }
            #[cfg(test)]
            Backend::Memory(store) => {
                store.delete(key);
                Ok(())
            }
        }
    }

    /// Atomically increment a windowed counter, setting its expiry on first
    /// hit. Returns the counter value after increment.
    pub async fn incr_window(&self, key: &str, ttl: u64) -> Result<i64> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let count: i64 = Script::new(INCR_WINDOW_SCRIPT)
                    .key(key)
                    .arg(ttl)
                    .invoke_async(&mut conn)
                    .await?;
                Ok(count)
            }
            #[cfg(test)]
            Backend::Memory(store) => Ok(store.incr(key, ttl)),
        }
    }

    /// Store a JSON entry only if its cached `version` still equals
    /// `expected_version`. New entries must pass `expected_version = 0`.
    pub async fn cas_json<T: Serialize>(
        &self,
        key: &str,
        expected_version: u64,
        value: &T,
        ttl: u64,
    ) -> Result<CasOutcome> {
        let raw = serde_json::to_string(value).map_err(ServerError::internal)?;

        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let stored: i64 = Script::new(CAS_SCRIPT)
                    .key(key)
                    .arg(expected_version)
                    .arg(raw)
                    .arg(ttl)
                    .invoke_async(&mut conn)
                    .await?;

                Ok(match stored {
                    1 => CasOutcome::Stored,
                    0 => CasOutcome::Conflict,
                    _ => CasOutcome::Missing,
                })
            }
            #[cfg(test)]
            Backend::Memory(store) => Ok(match store.get(key) {
                Some(current) => {
                    let version = serde_json::from_str::<serde_json::Value>(&current)
                        .ok()
                        .and_then(|decoded| decoded.get("version").and_then(|v| v.as_u64()))
                        .unwrap_or(0);
                    if version != expected_version {
                        CasOutcome::Conflict
                    } else {
                        store.set(key, &raw, ttl);
                        CasOutcome::Stored
                    }
                }
                None if expected_version != 0 => CasOutcome::Missing,
                None => {
                    store.set(key, &raw, ttl);
                    CasOutcome::Stored
                }
            }),
        }
    }

    /// Liveness probe for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                redis::cmd("PING").query_async::<()>(&mut conn).await?;
                Ok(())
            }
            #[cfg(test)]
            Backend::Memory(_) => Ok(()),
        }
    }
}

impl FromRef<AppState> for Cache {
    fn from_ref(app_state: &AppState) -> Cache {
        app_state.cache.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_is_single_shot() {
        let cache = Cache::memory();
        assert!(cache.set_if_absent("k", "1", 60).await.unwrap());
        assert!(!cache.set_if_absent("k", "1", 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_cas_version_semantics() {
        let cache = Cache::memory();
        let v1 = serde_json::json!({"version": 1, "data": "a"});
        let v2 = serde_json::json!({"version": 2, "data": "b"});

        // Creation requires expected version 0.
        assert_eq!(
            cache.cas_json("doc", 1, &v1, 60).await.unwrap(),
            CasOutcome::Missing
        );
        assert_eq!(
            cache.cas_json("doc", 0, &v1, 60).await.unwrap(),
            CasOutcome::Stored
        );

        // Stale writers lose.
        assert_eq!(
            cache.cas_json("doc", 0, &v2, 60).await.unwrap(),
            CasOutcome::Conflict
        );
        assert_eq!(
            cache.cas_json("doc", 1, &v2, 60).await.unwrap(),
            CasOutcome::Stored
        );
    }

    #[tokio::test]
    async fn test_incr_window_counts_up() {
        let cache = Cache::memory();
        assert_eq!(cache.incr_window("w", 60).await.unwrap(), 1);
        assert_eq!(cache.incr_window("w", 60).await.unwrap(), 2);
        assert_eq!(cache.incr_window("other", 60).await.unwrap(), 1);
    }
}
