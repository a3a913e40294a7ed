#![forbid(unsafe_code)]

//! Natural-language to SQL translation. The model call is behind [`CompletionClient`]; this crate
//! owns the prompt and the strict reading of the reply.

mod client;
mod error;
mod prompt;
mod reply;

pub use client::{
    AnthropicClient, ClientConfig, CompletionClient, CompletionRequest, CompletionResponse,
    ContentBlock, Message,
};
pub use error::TranslateError;
pub use prompt::render_prompt;
pub use reply::parse_reply;

use std::sync::Arc;

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Prompt -> completion -> parsed SQL. Never executes anything.
#[derive(Clone)]
pub struct Translator {
    client: Arc<dyn CompletionClient>,
    model: String,
    max_tokens: u32,
}

impl Translator {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn request_for(&self, question: &str, schema: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![Message::user(render_prompt(schema, question))],
        }
    }

    pub fn translate(&self, question: &str, schema: &str) -> Result<String, TranslateError> {
        let request = self.request_for(question, schema);
        let response = self.client.complete(&request)?;
        let sql = parse_reply(&response)?;
        tracing::debug!(model = %self.model, sql_len = sql.len(), "translation received");
        Ok(sql)
    }
}
