#![forbid(unsafe_code)]

//! Session-scoped workspaces over a shared SQLite engine and a key-value cache.

mod cache;
mod config;
mod error;
mod kv;
mod schema;
mod session;
mod sql;
mod sweeper;
mod tables;
mod workspaces;

pub use cache::{CacheIndex, CachedRun, ResultCache};
pub use config::*;
pub use error::{ErrorKind, KvError, StoreError};
pub use kv::{KvStore, MemoryKv, RedisKv, RedisKvConfig};
pub use schema::{NO_TABLE_MESSAGE, SchemaCache, SchemaText};
pub use session::{SessionRegistry, Workspace};
pub use sql::{ColumnInfo, QueryRows, SqlEngine};
pub use sweeper::{SweepReport, Sweeper, SweeperHandle};
pub use tables::{TableManager, UploadSummary, normalize_header};
pub use workspaces::{Health, NaturalOutcome, QueryOutcome, Workspaces};
