#![forbid(unsafe_code)]

use crate::{KvStore, SqlEngine, StoreError, Workspace};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tq_core::keys;

pub const NO_TABLE_MESSAGE: &str = "No table found. Please upload a CSV file first.";

/// Readable description of a workspace table, or the marker that nothing has been uploaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaText {
    Table(String),
    Missing,
}

impl SchemaText {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Table(text) => text,
            Self::Missing => NO_TABLE_MESSAGE,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

/// Memoizes schema descriptions under `schema:{id}` with the session TTL.
#[derive(Clone)]
pub struct SchemaCache {
    kv: Arc<dyn KvStore>,
    sql: SqlEngine,
    ttl: Duration,
}

impl SchemaCache {
    pub fn new(kv: Arc<dyn KvStore>, sql: SqlEngine, ttl: Duration) -> Self {
        Self { kv, sql, ttl }
    }

    pub fn describe(&self, workspace: &Workspace) -> Result<SchemaText, StoreError> {
        let key = keys::schema_key(&workspace.id);
        if let Some(text) = self.kv.get(&key)? {
            return Ok(SchemaText::Table(text));
        }

        if !self.sql.table_exists(&workspace.table_name)? {
            return Ok(SchemaText::Missing);
        }

        let columns = self.sql.table_columns(&workspace.table_name)?;
        let mut text = String::new();
        let _ = writeln!(text, "Table: {}", workspace.table_name);
        text.push_str("Columns:\n");
        for column in &columns {
            let _ = writeln!(text, "  - {} ({})", column.name, column.decl_type);
        }

        self.kv.set(&key, &text, Some(self.ttl))?;
        Ok(SchemaText::Table(text))
    }
}
