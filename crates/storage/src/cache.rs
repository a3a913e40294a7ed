#![forbid(unsafe_code)]

use crate::{KvStore, StoreError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tq_core::fingerprint::fingerprint;
use tq_core::ids::WorkspaceId;
use tq_core::keys;
use tq_core::kind::QueryKind;

/// Tracks which result keys belong to a workspace so invalidation touches only those keys.
#[derive(Clone)]
pub struct CacheIndex {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl CacheIndex {
    /// `ttl` must be at least the result TTL so the index outlives every entry it lists.
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub(crate) fn register(&self, id: &WorkspaceId, key: &str) -> Result<(), StoreError> {
        self.kv
            .set_add(&keys::index_key(id), key, Some(self.ttl))?;
        Ok(())
    }

    /// Drops every result entry, the schema entry and the index itself. Returns how many keys
    /// were removed.
    pub fn invalidate(&self, id: &WorkspaceId) -> Result<usize, StoreError> {
        let index_key = keys::index_key(id);
        let mut doomed = self.kv.set_members(&index_key)?;
        doomed.push(keys::schema_key(id));
        doomed.push(index_key);
        let removed = self.kv.del(&doomed)?;
        tracing::debug!(workspace = %id, removed, "workspace cache invalidated");
        Ok(removed)
    }
}

/// Outcome of [`ResultCache::run_cached`]. On a hit `runtime_ms` is the runtime recorded when the
/// entry was computed.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedRun<T> {
    pub value: T,
    pub cached: bool,
    pub runtime_ms: u64,
}

#[derive(Serialize)]
struct StoredRunRef<'a, T> {
    runtime_ms: u64,
    value: &'a T,
}

#[derive(Deserialize)]
struct StoredRun<T> {
    runtime_ms: u64,
    value: T,
}

/// Memoizes query and translation results per workspace under a fixed TTL.
#[derive(Clone)]
pub struct ResultCache {
    kv: Arc<dyn KvStore>,
    index: CacheIndex,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(kv: Arc<dyn KvStore>, index: CacheIndex, ttl: Duration) -> Self {
        Self { kv, index, ttl }
    }

    pub fn key_for(id: &WorkspaceId, input: &str, kind: QueryKind) -> String {
        keys::result_key(kind, id, &fingerprint(input))
    }

    /// Check, then compute and store. Not transactional: concurrent misses on the same key both
    /// run `executor` and the last write wins.
    pub fn run_cached<T, F>(
        &self,
        id: &WorkspaceId,
        input: &str,
        kind: QueryKind,
        executor: F,
    ) -> Result<CachedRun<T>, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, StoreError>,
    {
        let key = Self::key_for(id, input, kind);

        if let Some(raw) = self.kv.get(&key)? {
            match serde_json::from_str::<StoredRun<T>>(&raw) {
                Ok(stored) => {
                    tracing::debug!(workspace = %id, kind = kind.as_str(), "result cache hit");
                    return Ok(CachedRun {
                        value: stored.value,
                        cached: true,
                        runtime_ms: stored.runtime_ms,
                    });
                }
                Err(err) => {
                    tracing::warn!(workspace = %id, key = %key, error = %err, "undecodable cache entry; recomputing");
                }
            }
        }

        let started = Instant::now();
        let value = executor()?;
        let runtime_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if let Err(err) = self.store(id, &key, &value, runtime_ms) {
            tracing::warn!(workspace = %id, key = %key, error = %err, "result cache write failed");
        }

        Ok(CachedRun {
            value,
            cached: false,
            runtime_ms,
        })
    }

    fn store<T: Serialize>(
        &self,
        id: &WorkspaceId,
        key: &str,
        value: &T,
        runtime_ms: u64,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&StoredRunRef { runtime_ms, value })?;
        // Registered on both sides of the write: an invalidation between the two calls drops the
        // index, and the entry must be listed again once it exists.
        self.index.register(id, key)?;
        self.kv.set(key, &payload, Some(self.ttl))?;
        self.index.register(id, key)?;
        Ok(())
    }
}
