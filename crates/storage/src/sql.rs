#![forbid(unsafe_code)]

use crate::StoreError;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Rows per insert transaction. The engine lock is released between chunks so uploads to
/// different workspaces interleave.
const INSERT_CHUNK_ROWS: usize = 256;

/// Rows produced by a read query, column order preserved.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl QueryRows {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: String,
}

/// Handle to the single relational engine shared by every workspace. Clones share the same
/// connection; each workspace only ever touches its own table.
#[derive(Clone, Debug)]
pub struct SqlEngine {
    conn: Arc<Mutex<Connection>>,
}

impl SqlEngine {
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))?;
        Ok(())
    }

    /// Creates `table` with every column typed `TEXT`. A rejected statement is returned verbatim
    /// inside the error.
    pub fn create_text_table(&self, table: &str, columns: &[String]) -> Result<(), StoreError> {
        let statement = create_table_sql(table, columns);
        let conn = self.lock()?;
        conn.execute_batch(&statement)
            .map_err(|source| StoreError::Ddl { statement, source })
    }

    /// Inserts rows that are exactly `width` wide. Individual insert failures are logged and
    /// skipped; returns how many rows landed.
    pub fn insert_rows(
        &self,
        table: &str,
        width: usize,
        rows: &[&[String]],
    ) -> Result<usize, StoreError> {
        if width == 0 || rows.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; width].join(", ");
        let statement = format!("INSERT INTO {} VALUES ({placeholders})", quote_ident(table));

        let mut written = 0usize;
        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(&statement)?;
                for row in chunk {
                    if row.len() != width {
                        continue;
                    }
                    match stmt.execute(params_from_iter(row.iter().map(|v| v.trim()))) {
                        Ok(_) => written += 1,
                        Err(err) => tracing::warn!(table, error = %err, "row insert failed; skipped"),
                    }
                }
            }
            tx.commit()?;
        }
        Ok(written)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
                params![table],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
        let mut rows = stmt.query(params![table])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(ColumnInfo {
                name: row.get::<_, String>(0)?,
                decl_type: row.get::<_, String>(1)?,
            });
        }
        Ok(out)
    }

    /// Names of user tables starting with `prefix`.
    pub fn tables_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type='table' AND substr(name, 1, length(?1)) = ?1 ORDER BY name",
        )?;
        let mut rows = stmt.query(params![prefix])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row.get::<_, String>(0)?);
        }
        Ok(out)
    }

    pub fn row_count(&self, table: &str) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count)
    }

    /// Runs caller-supplied SQL. The engine is the only validator; any failure is reported as an
    /// execution failure carrying the query text.
    pub fn query(&self, sql: &str) -> Result<QueryRows, StoreError> {
        let conn = self.lock()?;
        run_query(&conn, sql).map_err(|source| StoreError::Execution {
            query: sql.to_string(),
            generated: false,
            source,
        })
    }
}

fn run_query(conn: &Connection, sql: &str) -> Result<QueryRows, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    let columns = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Map::new();
        for (idx, name) in columns.iter().enumerate() {
            record.insert(name.clone(), json_value(row.get_ref(idx)?));
        }
        out.push(record);
    }
    Ok(QueryRows { columns, rows: out })
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::from(v),
        ValueRef::Real(v) => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn create_table_sql(table: &str, columns: &[String]) -> String {
    let defs = columns
        .iter()
        .map(|col| format!("{} TEXT", quote_ident(col)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({defs})", quote_ident(table))
}
