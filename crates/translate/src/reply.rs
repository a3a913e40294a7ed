#![forbid(unsafe_code)]

use crate::{CompletionResponse, TranslateError};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SqlReply {
    sql: String,
}

/// Reads the first content block as exactly `{"sql": "..."}`. Prose, fences, extra keys or an
/// empty query are all rejected; nothing is salvaged.
pub fn parse_reply(response: &CompletionResponse) -> Result<String, TranslateError> {
    let Some(first) = response.content.first() else {
        return Err(TranslateError::Malformed("empty response from AI".to_string()));
    };
    let Some(text) = first.text.as_deref() else {
        return Err(TranslateError::Malformed(
            "first content block has no text".to_string(),
        ));
    };
    let reply: SqlReply = serde_json::from_str(text.trim())
        .map_err(|err| TranslateError::Malformed(err.to_string()))?;
    let sql = reply.sql.trim();
    if sql.is_empty() {
        return Err(TranslateError::Malformed("reply holds an empty query".to_string()));
    }
    Ok(sql.to_string())
}
