#![forbid(unsafe_code)]

use crate::{KvStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tq_core::ids::WorkspaceId;
use tq_core::{Clock, keys};

/// A caller's isolated context. The table may not exist yet (pre-upload).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub table_name: String,
    pub created_at_ms: i64,
    pub last_used_at_ms: i64,
}

#[derive(Serialize, Deserialize)]
struct SessionRecord {
    id: String,
    table_name: String,
    created_at_ms: i64,
    last_used_at_ms: i64,
}

impl Workspace {
    fn to_record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id.as_str().to_string(),
            table_name: self.table_name.clone(),
            created_at_ms: self.created_at_ms,
            last_used_at_ms: self.last_used_at_ms,
        }
    }

    fn from_record(record: SessionRecord) -> Result<Self, StoreError> {
        let id = WorkspaceId::try_new(record.id)
            .map_err(|_| StoreError::InvalidInput("session record holds an invalid id"))?;
        // The table name is always re-derived; a stored value that disagrees is not trusted.
        if record.table_name != id.table_name() {
            return Err(StoreError::InvalidInput("session record table name mismatch"));
        }
        Ok(Self {
            table_name: record.table_name,
            id,
            created_at_ms: record.created_at_ms,
            last_used_at_ms: record.last_used_at_ms,
        })
    }

    pub fn idle_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.last_used_at_ms)
    }
}

pub(crate) fn parse_id(raw: &str) -> Result<WorkspaceId, StoreError> {
    WorkspaceId::try_new(raw.trim()).map_err(|_| StoreError::NotFound)
}

/// Session records under `session:{id}` with a sliding TTL.
pub struct SessionRegistry {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { kv, clock, ttl }
    }

    pub fn create(&self) -> Result<Workspace, StoreError> {
        let id = WorkspaceId::generate()?;
        let now = self.clock.now_ms();
        let workspace = Workspace {
            table_name: id.table_name(),
            id,
            created_at_ms: now,
            last_used_at_ms: now,
        };
        self.write(&workspace)?;
        tracing::info!(workspace = %workspace.id, "workspace created");
        Ok(workspace)
    }

    /// Looks up and touches: `last_used_at_ms` moves forward and both the session and schema
    /// entries get a fresh TTL.
    pub fn resolve(&self, raw_id: &str) -> Result<Workspace, StoreError> {
        let id = parse_id(raw_id)?;
        let mut workspace = self.load(&id)?.ok_or(StoreError::NotFound)?;
        workspace.last_used_at_ms = workspace.last_used_at_ms.max(self.clock.now_ms());
        self.write(&workspace)?;
        self.kv.expire(&keys::schema_key(&id), self.ttl)?;
        Ok(workspace)
    }

    /// Read without touching.
    pub fn peek(&self, raw_id: &str) -> Result<Workspace, StoreError> {
        let id = parse_id(raw_id)?;
        self.load(&id)?.ok_or(StoreError::NotFound)
    }

    pub(crate) fn load(&self, id: &WorkspaceId) -> Result<Option<Workspace>, StoreError> {
        let Some(raw) = self.kv.get(&keys::session_key(id))? else {
            return Ok(None);
        };
        let record: SessionRecord = serde_json::from_str(&raw)?;
        Workspace::from_record(record).map(Some)
    }

    /// Returns whether a record existed.
    pub(crate) fn remove(&self, id: &WorkspaceId) -> Result<bool, StoreError> {
        Ok(self.kv.del(&[keys::session_key(id)])? > 0)
    }

    pub(crate) fn session_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.kv.keys(keys::SESSION_PATTERN)?)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn write(&self, workspace: &Workspace) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&workspace.to_record())?;
        self.kv
            .set(&keys::session_key(&workspace.id), &payload, Some(self.ttl))?;
        Ok(())
    }
}
