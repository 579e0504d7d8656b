//! Anthropic messages API adapter for the `LlmClient` port.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{self, BoxError};
use crate::ports::llm::{CompletionFuture, CompletionRequest, CompletionResponse, LlmClient};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Calls the Anthropic messages API with `ANTHROPIC_API_KEY`.
pub struct AnthropicLlmClient {
    client: Client,
    api_key: Option<String>,
}

impl AnthropicLlmClient {
    /// Reads the key from the environment. Every request is bounded by `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { client: http::client(timeout), api_key: http::api_key("ANTHROPIC_API_KEY") }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

/// Only `text` blocks carry output; other block types deserialize empty.
#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl From<MessagesResponse> for CompletionResponse {
    fn from(response: MessagesResponse) -> Self {
        Self {
            text: response.content.into_iter().map(|b| b.text).collect(),
            prompt_tokens: response.usage.input_tokens,
            completion_tokens: response.usage.output_tokens,
        }
    }
}

impl LlmClient for AnthropicLlmClient {
    fn complete(&self, request: &CompletionRequest) -> CompletionFuture<'_> {
        let request = request.clone();
        Box::pin(async move {
            let api_key = self
                .api_key
                .as_deref()
                .ok_or_else(|| BoxError::from("ANTHROPIC_API_KEY is not set"))?;
            let body = MessagesRequest {
                model: &request.model,
                max_tokens: request.max_tokens,
                system: (!request.system.is_empty()).then_some(request.system.as_str()),
                messages: [Message { role: "user", content: &request.prompt }],
            };
            let builder = self
                .client
                .post(MESSAGES_URL)
                .header("x-api-key", api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body);
            let response: MessagesResponse = http::send_json("anthropic", builder).await?;
            Ok(response.into())
        })
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
