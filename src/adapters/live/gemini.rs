//! Live adapter for the `LlmClient` port using Google's Gemini
//! `generateContent` endpoint.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{self, BoxError};
use crate::ports::llm::{CompletionFuture, CompletionRequest, CompletionResponse, LlmClient};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Live LLM client that calls the Gemini API.
pub struct GeminiLlmClient {
    client: Client,
    api_key: Option<String>,
}

impl GeminiLlmClient {
    /// Creates a client reading `GEMINI_API_KEY` from the environment.
    /// Every HTTP request is bounded by `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { client: http::client(timeout), api_key: http::api_key("GEMINI_API_KEY") }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl TryFrom<GenerateResponse> for CompletionResponse {
    type Error = BoxError;

    fn try_from(response: GenerateResponse) -> Result<Self, BoxError> {
        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err("gemini returned no candidate text".into());
        }
        let usage = response.usage_metadata.unwrap_or_default();
        Ok(Self {
            text,
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
        })
    }
}

impl LlmClient for GeminiLlmClient {
    fn complete(&self, request: &CompletionRequest) -> CompletionFuture<'_> {
        let url = format!("{GEMINI_API_BASE}/{}:generateContent", request.model);
        let request = request.clone();

        Box::pin(async move {
            let api_key =
                self.api_key.as_deref().ok_or_else(|| BoxError::from("GEMINI_API_KEY is not set"))?;
            let body = GenerateRequest {
                system_instruction: (!request.system.is_empty())
                    .then(|| Content { parts: vec![Part { text: &request.system }] }),
                contents: vec![Content { parts: vec![Part { text: &request.prompt }] }],
                generation_config: GenerationConfig { max_output_tokens: request.max_tokens },
            };
            let builder = self.client.post(&url).header("x-goog-api-key", api_key).json(&body);
            let response: GenerateResponse = http::send_json("gemini", builder).await?;
            response.try_into()
        })
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
