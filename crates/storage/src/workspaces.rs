#![forbid(unsafe_code)]

use crate::cache::{CacheIndex, ResultCache};
use crate::schema::{SchemaCache, SchemaText};
use crate::session::{SessionRegistry, Workspace, parse_id};
use crate::sql::{QueryRows, SqlEngine};
use crate::tables::{TableManager, UploadSummary};
use crate::{KvStore, StoreError, WorkspaceConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tq_core::Clock;
use tq_core::ids::WorkspaceId;
use tq_core::kind::QueryKind;
use tq_translate::{TranslateError, Translator};

#[derive(Clone, Debug, PartialEq)]
pub struct QueryOutcome {
    pub workspace_id: WorkspaceId,
    pub query: String,
    pub columns: Vec<String>,
    pub data: Vec<Map<String, Value>>,
    pub row_count: usize,
    pub runtime_ms: u64,
    pub cached: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NaturalOutcome {
    pub workspace_id: WorkspaceId,
    pub natural_query: String,
    pub generated_query: String,
    pub explanation: String,
    pub columns: Vec<String>,
    pub data: Vec<Map<String, Value>>,
    pub row_count: usize,
    pub runtime_ms: u64,
    pub cached: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Health {
    pub kv_connected: bool,
}

/// Memoized payload of a natural-language request.
#[derive(Serialize, Deserialize)]
struct NaturalRun {
    generated_query: String,
    rows: QueryRows,
}

/// Entry point for every caller-facing operation. Each one resolves (and touches) the session
/// first, except `status` and `delete`.
pub struct Workspaces {
    kv: Arc<dyn KvStore>,
    sql: SqlEngine,
    sessions: SessionRegistry,
    index: CacheIndex,
    tables: TableManager,
    schemas: SchemaCache,
    results: ResultCache,
    translator: Option<Translator>,
}

impl Workspaces {
    pub fn new(
        kv: Arc<dyn KvStore>,
        sql: SqlEngine,
        clock: Arc<dyn Clock>,
        config: WorkspaceConfig,
    ) -> Self {
        // The index is re-armed on every registration and must outlive the entries it lists.
        let index = CacheIndex::new(kv.clone(), config.session_ttl.max(config.result_ttl));
        Self {
            sessions: SessionRegistry::new(kv.clone(), clock, config.session_ttl),
            tables: TableManager::new(sql.clone(), index.clone()),
            schemas: SchemaCache::new(kv.clone(), sql.clone(), config.session_ttl),
            results: ResultCache::new(kv.clone(), index.clone(), config.result_ttl),
            index,
            kv,
            sql,
            translator: None,
        }
    }

    pub fn with_translator(mut self, translator: Translator) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn engine(&self) -> &SqlEngine {
        &self.sql
    }

    pub fn create(&self) -> Result<Workspace, StoreError> {
        self.sessions.create()
    }

    pub fn status(&self, raw_id: &str) -> Result<Workspace, StoreError> {
        self.sessions.peek(raw_id)
    }

    pub fn upload(
        &self,
        raw_id: &str,
        header: &[String],
        rows: &[Vec<String>],
    ) -> Result<UploadSummary, StoreError> {
        let workspace = self.sessions.resolve(raw_id)?;
        self.tables.replace(&workspace, header, rows)
    }

    pub fn query(&self, raw_id: &str, sql: &str) -> Result<QueryOutcome, StoreError> {
        let workspace = self.sessions.resolve(raw_id)?;
        if sql.trim().is_empty() {
            return Err(StoreError::InvalidInput("query text is empty"));
        }
        let run = self
            .results
            .run_cached(&workspace.id, sql, QueryKind::Query, || self.sql.query(sql))?;
        Ok(QueryOutcome {
            workspace_id: workspace.id,
            query: sql.to_string(),
            row_count: run.value.row_count(),
            columns: run.value.columns,
            data: run.value.rows,
            runtime_ms: run.runtime_ms,
            cached: run.cached,
        })
    }

    /// Schema -> translation -> execution on a miss. Failed executions are not memoized and report
    /// the generated query.
    pub fn natural(&self, raw_id: &str, question: &str) -> Result<NaturalOutcome, StoreError> {
        let workspace = self.sessions.resolve(raw_id)?;
        if question.trim().is_empty() {
            return Err(StoreError::InvalidInput("question text is empty"));
        }
        let run = self
            .results
            .run_cached(&workspace.id, question, QueryKind::Natural, || {
                self.translate_and_execute(&workspace, question)
            })?;
        Ok(NaturalOutcome {
            workspace_id: workspace.id,
            natural_query: question.to_string(),
            explanation: format!("Generated SQL query from natural language: '{question}'"),
            generated_query: run.value.generated_query,
            row_count: run.value.rows.row_count(),
            columns: run.value.rows.columns,
            data: run.value.rows.rows,
            runtime_ms: run.runtime_ms,
            cached: run.cached,
        })
    }

    fn translate_and_execute(
        &self,
        workspace: &Workspace,
        question: &str,
    ) -> Result<NaturalRun, StoreError> {
        let translator = self
            .translator
            .as_ref()
            .ok_or(StoreError::Upstream(TranslateError::NotConfigured))?;
        let SchemaText::Table(schema) = self.schemas.describe(workspace)? else {
            return Err(StoreError::InvalidInput("no data uploaded for this workspace"));
        };
        let generated_query = translator.translate(question, &schema)?;
        let rows = self
            .sql
            .query(&generated_query)
            .map_err(StoreError::into_generated)?;
        Ok(NaturalRun {
            generated_query,
            rows,
        })
    }

    pub fn schema(&self, raw_id: &str) -> Result<SchemaText, StoreError> {
        let workspace = self.sessions.resolve(raw_id)?;
        self.schemas.describe(&workspace)
    }

    /// NotFound when no session record exists; the cleanup still runs so leftovers of a
    /// half-destroyed workspace are reclaimed.
    pub fn delete(&self, raw_id: &str) -> Result<(), StoreError> {
        let id = parse_id(raw_id)?;
        if self.destroy(&id)? {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    /// Removes the session record, every cache entry in the workspace namespace and the table.
    /// Idempotent; returns whether a session record was present.
    pub fn destroy(&self, id: &WorkspaceId) -> Result<bool, StoreError> {
        let existed = self.sessions.remove(id)?;
        self.index.invalidate(id)?;
        self.tables.drop(id)?;
        if existed {
            tracing::info!(workspace = %id, "workspace destroyed");
        }
        Ok(existed)
    }

    pub fn health(&self) -> Health {
        Health {
            kv_connected: self.kv.ping().is_ok(),
        }
    }
}
