#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};
use tq_translate::{
    CompletionClient, CompletionRequest, CompletionResponse, ContentBlock, TranslateError,
    Translator,
};

/// Replays canned outcomes and records what it was asked.
struct ScriptedClient {
    replies: Mutex<Vec<Result<CompletionResponse, TranslateError>>>,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<CompletionResponse, TranslateError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl CompletionClient for ScriptedClient {
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, TranslateError> {
        self.seen.lock().unwrap().push(request.clone());
        self.replies.lock().unwrap().remove(0)
    }
}

fn text_reply(text: &str) -> Result<CompletionResponse, TranslateError> {
    Ok(CompletionResponse {
        content: vec![ContentBlock {
            kind: Some("text".to_string()),
            text: Some(text.to_string()),
        }],
    })
}

#[test]
fn translate_sends_one_user_message_and_returns_sql() {
    let client = ScriptedClient::new(vec![text_reply(r#"{"sql": "SELECT COUNT(*) FROM data_w"}"#)]);
    let translator = Translator::new(client.clone(), "model-x", 1000);

    let sql = translator
        .translate("how many rows?", "Table: data_w\nColumns:\n  - a (TEXT)\n")
        .expect("translate");
    assert_eq!(sql, "SELECT COUNT(*) FROM data_w");

    let seen = client.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].model, "model-x");
    assert_eq!(seen[0].max_tokens, 1000);
    assert_eq!(seen[0].messages.len(), 1);
    assert_eq!(seen[0].messages[0].role, "user");
    assert!(seen[0].messages[0].content.contains("how many rows?"));
    assert!(seen[0].messages[0].content.contains("Table: data_w"));
}

#[test]
fn upstream_status_is_propagated_with_body() {
    let client = ScriptedClient::new(vec![Err(TranslateError::Status {
        status: 529,
        body: "overloaded".to_string(),
    })]);
    let translator = Translator::new(client, "m", 10);
    let err = translator.translate("q", "schema").unwrap_err();
    assert_eq!(err.status(), Some(529));
    assert_eq!(err.body(), Some("overloaded"));
}

#[test]
fn prose_reply_is_malformed() {
    let client = ScriptedClient::new(vec![text_reply("Here you go: SELECT 1")]);
    let translator = Translator::new(client, "m", 10);
    assert!(matches!(
        translator.translate("q", "schema"),
        Err(TranslateError::Malformed(_))
    ));
}
