#![forbid(unsafe_code)]

mod memory;
mod redis;

pub use memory::MemoryKv;
pub use redis::{RedisKv, RedisKvConfig};

use crate::KvError;
use std::time::Duration;

/// Small-blob key-value store with optional per-key TTL. Values are UTF-8 text (JSON in practice).
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Overwrites any existing value; `None` keeps the key until deleted.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError>;

    /// Returns `false` when the key does not exist.
    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError>;

    /// Batched delete; returns how many keys existed.
    fn del(&self, keys: &[String]) -> Result<usize, KvError>;

    /// Glob-style enumeration (`*`, `?`). Cost is proportional to the whole keyspace.
    fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError>;

    /// Adds `member` to the set at `key` and (re)arms the set's TTL.
    fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<(), KvError>;

    fn set_members(&self, key: &str) -> Result<Vec<String>, KvError>;

    fn ping(&self) -> Result<(), KvError>;
}

pub(crate) fn ttl_ms(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}
