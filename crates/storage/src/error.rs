#![forbid(unsafe_code)]

use tq_core::ids::IdGenerationError;
use tq_translate::TranslateError;

/// Failure classes the inbound boundary distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Store,
    Upstream,
    Execution,
}

#[derive(Debug)]
pub enum KvError {
    Redis(redis::RedisError),
    WrongType { key: String },
    LockPoisoned,
}

impl std::fmt::Display for KvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Redis(err) => write!(f, "redis: {err}"),
            Self::WrongType { key } => write!(f, "wrong value type at key {key}"),
            Self::LockPoisoned => write!(f, "key-value store lock poisoned"),
        }
    }
}

impl std::error::Error for KvError {}

impl From<redis::RedisError> for KvError {
    fn from(value: redis::RedisError) -> Self {
        Self::Redis(value)
    }
}

#[derive(Debug)]
pub enum StoreError {
    NotFound,
    InvalidInput(&'static str),
    IdGeneration(IdGenerationError),
    Kv(KvError),
    Sql(rusqlite::Error),
    Ddl {
        statement: String,
        source: rusqlite::Error,
    },
    Codec(serde_json::Error),
    Upstream(TranslateError),
    Execution {
        query: String,
        generated: bool,
        source: rusqlite::Error,
    },
    LockPoisoned,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::Validation,
            Self::IdGeneration(_)
            | Self::Kv(_)
            | Self::Sql(_)
            | Self::Ddl { .. }
            | Self::Codec(_)
            | Self::LockPoisoned => ErrorKind::Store,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Execution { .. } => ErrorKind::Execution,
        }
    }

    /// The statement that failed, for DDL and execution failures.
    pub fn statement(&self) -> Option<&str> {
        match self {
            Self::Ddl { statement, .. } => Some(statement),
            Self::Execution { query, .. } => Some(query),
            _ => None,
        }
    }

    /// Query text produced by the translation service, when that is what failed.
    pub fn generated_query(&self) -> Option<&str> {
        match self {
            Self::Execution {
                query,
                generated: true,
                ..
            } => Some(query),
            _ => None,
        }
    }

    pub(crate) fn into_generated(self) -> Self {
        match self {
            Self::Execution { query, source, .. } => Self::Execution {
                query,
                generated: true,
                source,
            },
            other => other,
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "workspace not found"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::IdGeneration(err) => write!(f, "workspace id generation failed: {err}"),
            Self::Kv(err) => write!(f, "cache store: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::Ddl { statement, source } => {
                write!(f, "failed to create table: {source} (statement: {statement})")
            }
            Self::Codec(err) => write!(f, "codec: {err}"),
            Self::Upstream(err) => write!(f, "translation: {err}"),
            Self::Execution {
                query,
                generated: true,
                source,
            } => write!(f, "failed to execute generated SQL: {source} (sql: {query})"),
            Self::Execution { source, .. } => write!(f, "failed to execute query: {source}"),
            Self::LockPoisoned => write!(f, "engine lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<KvError> for StoreError {
    fn from(value: KvError) -> Self {
        Self::Kv(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Codec(value)
    }
}

impl From<TranslateError> for StoreError {
    fn from(value: TranslateError) -> Self {
        Self::Upstream(value)
    }
}

impl From<IdGenerationError> for StoreError {
    fn from(value: IdGenerationError) -> Self {
        Self::IdGeneration(value)
    }
}
