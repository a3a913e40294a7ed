#![forbid(unsafe_code)]

use super::*;
use crate::rpc::{
    EXECUTION_FAILURE, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, NOT_FOUND, PARSE_ERROR,
    UPSTREAM_FAILURE,
};
use std::io::Cursor;
use tq_core::ManualClock;
use tq_storage::{MemoryKv, SqlEngine, WorkspaceConfig};
use tq_translate::{
    CompletionClient, CompletionRequest, CompletionResponse, ContentBlock, TranslateError,
    Translator,
};

struct FixedReply(String);

impl CompletionClient for FixedReply {
    fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, TranslateError> {
        Ok(CompletionResponse {
            content: vec![ContentBlock {
                kind: Some("text".to_string()),
                text: Some(self.0.clone()),
            }],
        })
    }
}

fn server_with(reply: Option<&str>) -> Server {
    let clock = ManualClock::new(1_700_000_000_000);
    let kv = Arc::new(MemoryKv::new(Arc::new(clock.clone())));
    let sql = SqlEngine::open_in_memory().expect("open engine");
    let mut workspaces = Workspaces::new(kv, sql, Arc::new(clock), WorkspaceConfig::default());
    if let Some(reply) = reply {
        let client = Arc::new(FixedReply(reply.to_string()));
        workspaces = workspaces.with_translator(Translator::new(client, "test-model", 1000));
    }
    Server::new(Arc::new(workspaces))
}

fn call(server: &Server, method: &str, params: Value) -> Value {
    let request = JsonRpcRequest {
        _jsonrpc: Some("2.0".to_string()),
        method: method.to_string(),
        id: Some(json!(1)),
        params: Some(params),
    };
    server.handle(request).expect("response for request with id")
}

fn result(resp: &Value) -> &Value {
    assert!(resp.get("error").is_none(), "unexpected error: {resp}");
    &resp["result"]
}

fn error_code(resp: &Value) -> i64 {
    resp["error"]["code"].as_i64().expect("error code")
}

fn create_with_table(server: &Server) -> (String, String) {
    let created = call(server, "workspace.create", json!({}));
    let id = result(&created)["workspace_id"].as_str().unwrap().to_string();
    let table = result(&created)["table_name"].as_str().unwrap().to_string();
    let uploaded = call(
        server,
        "upload",
        json!({
            "workspace_id": id,
            "filename": "people.csv",
            "header": ["name", "age"],
            "rows": [["ada", "36"], ["bob"], ["cy", "41"]],
        }),
    );
    let summary = result(&uploaded);
    assert_eq!(summary["filename"], json!("people.csv"));
    assert_eq!(summary["rows"], json!(2));
    assert_eq!(summary["rows_skipped"], json!(1));
    assert_eq!(summary["columns"], json!(["name", "age"]));
    (id, table)
}

#[test]
fn create_then_status_reports_table_and_timestamps() {
    let server = server_with(None);
    let created = call(&server, "workspace.create", json!({}));
    let id = result(&created)["workspace_id"].as_str().unwrap().to_string();
    assert_eq!(result(&created)["table_name"], json!(format!("data_{id}")));

    let status = call(&server, "workspace.status", json!({ "workspace_id": id }));
    assert_eq!(result(&status)["created_at"], result(&created)["created_at"]);
    assert!(
        result(&status)["last_used_at"]
            .as_str()
            .unwrap()
            .starts_with("2023-11-14T")
    );
}

#[test]
fn query_is_cached_on_repeat() {
    let server = server_with(None);
    let (id, table) = create_with_table(&server);
    let sql = format!("SELECT name FROM {table} ORDER BY name");
    let params = json!({ "workspace_id": id, "sql": sql });

    let first = call(&server, "query", params.clone());
    assert_eq!(result(&first)["cached"], json!(false));
    assert_eq!(result(&first)["row_count"], json!(2));
    assert_eq!(result(&first)["data"][0]["name"], json!("ada"));

    let second = call(&server, "query", params);
    assert_eq!(result(&second)["cached"], json!(true));
    assert_eq!(result(&second)["data"], result(&first)["data"]);
}

#[test]
fn failures_map_to_error_codes_with_data() {
    let server = server_with(None);
    let (id, _) = create_with_table(&server);

    let resp = call(&server, "query", json!({ "workspace_id": "missing", "sql": "SELECT 1" }));
    assert_eq!(error_code(&resp), NOT_FOUND);

    let resp = call(&server, "query", json!({ "workspace_id": id, "sql": "SELEC nope" }));
    assert_eq!(error_code(&resp), EXECUTION_FAILURE);
    assert_eq!(resp["error"]["data"]["statement"], json!("SELEC nope"));

    let resp = call(&server, "natural", json!({ "workspace_id": id, "query": "how many?" }));
    assert_eq!(error_code(&resp), UPSTREAM_FAILURE);

    let resp = call(&server, "upload", json!({ "workspace_id": id, "header": ["a", "A"] }));
    assert_eq!(error_code(&resp), INVALID_PARAMS);

    let resp = call(&server, "query", json!({ "workspace_id": id }));
    assert_eq!(error_code(&resp), INVALID_PARAMS);

    let resp = call(&server, "nope", json!({}));
    assert_eq!(error_code(&resp), METHOD_NOT_FOUND);
}

#[test]
fn natural_failure_carries_generated_sql() {
    let server = server_with(Some(r#"{"sql": "SELECT COUNT(*) AS n FROM people"}"#));
    let (id, _) = create_with_table(&server);
    let resp = call(&server, "natural", json!({ "workspace_id": id, "query": "how many?" }));
    assert_eq!(error_code(&resp), EXECUTION_FAILURE);
    assert_eq!(
        resp["error"]["data"]["generated_sql"],
        json!("SELECT COUNT(*) AS n FROM people")
    );
}

#[test]
fn natural_success_returns_rows_and_explanation() {
    let server = server_with(Some(r#"{"sql": "SELECT 2 AS n"}"#));
    let (id, _) = create_with_table(&server);
    let params = json!({ "workspace_id": id, "query": "how many?" });

    let resp = call(&server, "natural", params.clone());
    let out = result(&resp);
    assert_eq!(out["natural_query"], json!("how many?"));
    assert_eq!(out["generated_sql"], json!("SELECT 2 AS n"));
    assert_eq!(
        out["explanation"],
        json!("Generated SQL query from natural language: 'how many?'")
    );
    assert_eq!(out["data"][0]["n"], json!(2));
    assert_eq!(out["cached"], json!(false));

    let resp = call(&server, "natural", params);
    assert_eq!(result(&resp)["cached"], json!(true));
}

#[test]
fn schema_then_delete_then_not_found() {
    let server = server_with(None);
    let (id, table) = create_with_table(&server);
    let resp = call(&server, "schema", json!({ "workspace_id": id }));
    assert_eq!(
        result(&resp)["schema"],
        json!(format!("Table: {table}\nColumns:\n  - name (TEXT)\n  - age (TEXT)\n"))
    );
    assert_eq!(result(&resp)["has_table"], json!(true));

    let resp = call(&server, "workspace.delete", json!({ "workspace_id": id }));
    assert_eq!(result(&resp)["workspace_id"], json!(id));
    let resp = call(&server, "workspace.delete", json!({ "workspace_id": id }));
    assert_eq!(error_code(&resp), NOT_FOUND);
    let resp = call(&server, "schema", json!({ "workspace_id": id }));
    assert_eq!(error_code(&resp), NOT_FOUND);
}

#[test]
fn health_reports_kv() {
    let server = server_with(None);
    let resp = call(&server, "health", json!({}));
    assert_eq!(result(&resp)["status"], json!("healthy"));
    assert_eq!(result(&resp)["kv_connected"], json!(true));
}

#[test]
fn line_loop_answers_requests_and_skips_notifications() {
    let server = server_with(None);
    let input = concat!(
        "{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"health\"}\n",
        "\n",
        "{\"jsonrpc\":\"2.0\",\"method\":\"workspace.create\"}\n",
        "not json\n",
        "[1,2]\n",
        "{\"jsonrpc\":\"2.0\",\"id\":8}\n",
    );
    let mut out = Vec::new();
    crate::stdio::serve_lines(&server, Cursor::new(input), &mut out).expect("serve");

    let lines = String::from_utf8(out).unwrap();
    let responses = lines
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0]["id"], json!(7));
    assert_eq!(responses[0]["result"]["status"], json!("healthy"));
    assert_eq!(error_code(&responses[1]), PARSE_ERROR);
    assert_eq!(error_code(&responses[2]), INVALID_REQUEST);
    assert_eq!(responses[3]["id"], json!(8));
    assert_eq!(error_code(&responses[3]), INVALID_REQUEST);
}
