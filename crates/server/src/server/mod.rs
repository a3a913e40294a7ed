#![forbid(unsafe_code)]

use crate::rpc::{JsonRpcRequest, METHOD_NOT_FOUND, RpcError, json_rpc_response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tq_core::clock::ts_ms_to_rfc3339;
use tq_storage::{Workspace, Workspaces};

#[cfg(test)]
mod tests;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkspaceParams {
    workspace_id: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UploadParams {
    workspace_id: String,
    #[serde(default)]
    filename: Option<String>,
    header: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryParams {
    workspace_id: String,
    sql: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NaturalParams {
    workspace_id: String,
    query: String,
}

/// Maps JSON-RPC methods onto the workspace facade.
pub(crate) struct Server {
    workspaces: Arc<Workspaces>,
}

impl Server {
    pub(crate) fn new(workspaces: Arc<Workspaces>) -> Self {
        Self { workspaces }
    }

    /// Notifications (no `id`) are executed but get no response.
    pub(crate) fn handle(&self, request: JsonRpcRequest) -> Option<Value> {
        let JsonRpcRequest {
            method, id, params, ..
        } = request;
        let outcome = self.dispatch(&method, params);
        if let Err(err) = &outcome {
            tracing::debug!(method = %method, code = err.code, error = %err.message, "request failed");
        }
        let id = id?;
        Some(match outcome {
            Ok(result) => json_rpc_response(Some(id), result),
            Err(err) => err.into_response(Some(id)),
        })
    }

    fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match method {
            "health" => Ok(self.health()),
            "workspace.create" => {
                let workspace = self.workspaces.create()?;
                Ok(workspace_json(&workspace))
            }
            "workspace.status" => {
                let p: WorkspaceParams = parse_params(params)?;
                let workspace = self.workspaces.status(&p.workspace_id)?;
                Ok(workspace_json(&workspace))
            }
            "workspace.delete" => {
                let p: WorkspaceParams = parse_params(params)?;
                self.workspaces.delete(&p.workspace_id)?;
                Ok(json!({
                    "workspace_id": p.workspace_id,
                    "message": "Workspace deleted successfully",
                }))
            }
            "upload" => self.upload(parse_params(params)?),
            "query" => self.query(parse_params(params)?),
            "natural" => self.natural(parse_params(params)?),
            "schema" => {
                let p: WorkspaceParams = parse_params(params)?;
                let schema = self.workspaces.schema(&p.workspace_id)?;
                Ok(json!({
                    "workspace_id": p.workspace_id,
                    "schema": schema.as_str(),
                    "has_table": !schema.is_missing(),
                }))
            }
            other => Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        }
    }

    fn health(&self) -> Value {
        let health = self.workspaces.health();
        let status = if health.kv_connected {
            "healthy"
        } else {
            "degraded"
        };
        json!({ "status": status, "kv_connected": health.kv_connected })
    }

    fn upload(&self, p: UploadParams) -> Result<Value, RpcError> {
        let summary = self.workspaces.upload(&p.workspace_id, &p.header, &p.rows)?;
        Ok(json!({
            "message": "File uploaded successfully",
            "workspace_id": p.workspace_id,
            "filename": p.filename,
            "table": summary.table,
            "columns": summary.columns,
            "rows": summary.rows_written,
            "rows_skipped": summary.rows_skipped,
        }))
    }

    fn query(&self, p: QueryParams) -> Result<Value, RpcError> {
        let outcome = self.workspaces.query(&p.workspace_id, &p.sql)?;
        Ok(json!({
            "workspace_id": outcome.workspace_id.as_str(),
            "query": outcome.query,
            "columns": outcome.columns,
            "data": outcome.data,
            "row_count": outcome.row_count,
            "runtime_ms": outcome.runtime_ms,
            "cached": outcome.cached,
        }))
    }

    fn natural(&self, p: NaturalParams) -> Result<Value, RpcError> {
        let outcome = self.workspaces.natural(&p.workspace_id, &p.query)?;
        Ok(json!({
            "workspace_id": outcome.workspace_id.as_str(),
            "natural_query": outcome.natural_query,
            "generated_sql": outcome.generated_query,
            "explanation": outcome.explanation,
            "columns": outcome.columns,
            "data": outcome.data,
            "row_count": outcome.row_count,
            "runtime_ms": outcome.runtime_ms,
            "cached": outcome.cached,
        }))
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let params = params.unwrap_or_else(|| json!({}));
    serde_json::from_value(params)
        .map_err(|err| RpcError::invalid_params(format!("Invalid params: {err}")))
}

fn workspace_json(workspace: &Workspace) -> Value {
    json!({
        "workspace_id": workspace.id.as_str(),
        "table_name": workspace.table_name,
        "created_at": ts_ms_to_rfc3339(workspace.created_at_ms),
        "last_used_at": ts_ms_to_rfc3339(workspace.last_used_at_ms),
    })
}
