#![forbid(unsafe_code)]

use crate::{CacheIndex, SqlEngine, StoreError, Workspace};
use std::collections::HashSet;
use tq_core::ids::WorkspaceId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSummary {
    pub table: String,
    pub columns: Vec<String>,
    pub rows_written: usize,
    /// Rows with the wrong field count plus rows the engine refused.
    pub rows_skipped: usize,
}

/// Owns the workspace -> table mapping and the only structural change: replacing the table.
#[derive(Clone)]
pub struct TableManager {
    sql: SqlEngine,
    index: CacheIndex,
}

impl TableManager {
    pub fn new(sql: SqlEngine, index: CacheIndex) -> Self {
        Self { sql, index }
    }

    /// Drop, recreate from `header`, and load `rows`. Every cache entry of the workspace is gone
    /// before this returns.
    pub fn replace(
        &self,
        workspace: &Workspace,
        header: &[String],
        rows: &[Vec<String>],
    ) -> Result<UploadSummary, StoreError> {
        let columns = normalize_header(header)?;
        let table = workspace.table_name.as_str();

        self.sql.drop_table(table)?;
        self.index.invalidate(&workspace.id)?;
        self.sql.create_text_table(table, &columns)?;

        let width = columns.len();
        let matching = rows
            .iter()
            .filter(|row| row.len() == width)
            .map(Vec::as_slice)
            .collect::<Vec<_>>();
        let mismatched = rows.len() - matching.len();
        if mismatched > 0 {
            tracing::debug!(workspace = %workspace.id, mismatched, width, "rows with wrong field count skipped");
        }

        let rows_written = self.sql.insert_rows(table, width, &matching)?;

        // Anything cached while the table was being filled described a partial table.
        self.index.invalidate(&workspace.id)?;

        tracing::info!(
            workspace = %workspace.id,
            table,
            rows_written,
            rows_skipped = rows.len() - rows_written,
            "table replaced"
        );
        Ok(UploadSummary {
            table: table.to_string(),
            columns,
            rows_written,
            rows_skipped: rows.len() - rows_written,
        })
    }

    /// Missing tables are fine.
    pub fn drop(&self, id: &WorkspaceId) -> Result<(), StoreError> {
        self.sql.drop_table(&id.table_name())
    }
}

/// Trims header cells and rejects empty or duplicate names. Duplicates compare ASCII
/// case-insensitively because that is how the engine resolves identifiers.
pub fn normalize_header(header: &[String]) -> Result<Vec<String>, StoreError> {
    if header.is_empty() {
        return Err(StoreError::InvalidInput("upload has no header row"));
    }
    let mut seen = HashSet::with_capacity(header.len());
    let mut out = Vec::with_capacity(header.len());
    for cell in header {
        let name = cell.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidInput("header contains an empty column name"));
        }
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(StoreError::InvalidInput("header contains a duplicate column name"));
        }
        out.push(name.to_string());
    }
    Ok(out)
}
