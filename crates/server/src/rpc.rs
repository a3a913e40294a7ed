#![forbid(unsafe_code)]

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tq_storage::{ErrorKind, StoreError};

pub(crate) const PARSE_ERROR: i64 = -32700;
pub(crate) const INVALID_REQUEST: i64 = -32600;
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;
pub(crate) const INVALID_PARAMS: i64 = -32602;
pub(crate) const NOT_FOUND: i64 = -32004;
pub(crate) const STORE_FAILURE: i64 = -32010;
pub(crate) const UPSTREAM_FAILURE: i64 = -32011;
pub(crate) const EXECUTION_FAILURE: i64 = -32012;

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcRequest {
    #[serde(default)]
    #[serde(rename = "jsonrpc")]
    pub(crate) _jsonrpc: Option<String>,
    pub(crate) method: String,
    #[serde(default)]
    pub(crate) id: Option<Value>,
    #[serde(default)]
    pub(crate) params: Option<Value>,
}

pub(crate) fn json_rpc_response(id: Option<Value>, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

pub(crate) fn json_rpc_error(id: Option<Value>, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

/// Error object of a failed call; `data` holds diagnostics such as the offending statement.
#[derive(Debug, PartialEq)]
pub(crate) struct RpcError {
    pub(crate) code: i64,
    pub(crate) message: String,
    pub(crate) data: Option<Map<String, Value>>,
}

impl RpcError {
    pub(crate) fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub(crate) fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub(crate) fn into_response(self, id: Option<Value>) -> Value {
        let mut error = json!({ "code": self.code, "message": self.message });
        if let Some(data) = self.data
            && let Some(obj) = error.as_object_mut()
        {
            obj.insert("data".to_string(), Value::Object(data));
        }
        json!({ "jsonrpc": "2.0", "id": id, "error": error })
    }
}

impl From<StoreError> for RpcError {
    fn from(err: StoreError) -> Self {
        let code = match err.kind() {
            ErrorKind::NotFound => NOT_FOUND,
            ErrorKind::Validation => INVALID_PARAMS,
            ErrorKind::Store => STORE_FAILURE,
            ErrorKind::Upstream => UPSTREAM_FAILURE,
            ErrorKind::Execution => EXECUTION_FAILURE,
        };

        let mut data = Map::new();
        if let Some(statement) = err.statement() {
            data.insert("statement".to_string(), Value::String(statement.to_string()));
        }
        if let Some(generated) = err.generated_query() {
            data.insert("generated_sql".to_string(), Value::String(generated.to_string()));
        }
        if let StoreError::Upstream(upstream) = &err {
            if let Some(status) = upstream.status() {
                data.insert("status".to_string(), Value::from(status));
            }
            if let Some(body) = upstream.body() {
                data.insert("body".to_string(), Value::String(body.to_string()));
            }
        }

        Self {
            code,
            message: err.to_string(),
            data: (!data.is_empty()).then_some(data),
        }
    }
}
