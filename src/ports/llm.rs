//! Generation-service port. The insight stage is the only caller.

use std::error::Error;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Boxed future returned by [`LlmClient::complete`].
pub type CompletionFuture<'a> = Pin<
    Box<dyn Future<Output = Result<CompletionResponse, Box<dyn Error + Send + Sync>>> + Send + 'a>,
>;

/// One single-turn generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Provider model identifier.
    pub model: String,
    /// Standing instructions, sent as the provider's system prompt.
    pub system: String,
    /// The user turn: the facts to narrate.
    pub prompt: String,
    /// Cap on generated tokens.
    pub max_tokens: u32,
}

/// Generated text plus the usage the provider reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Concatenated text output.
    pub text: String,
    /// Input tokens billed.
    pub prompt_tokens: u32,
    /// Output tokens billed.
    pub completion_tokens: u32,
}

/// A generation provider.
///
/// Providers are interchangeable behind this trait; which one is live is a
/// configuration choice.
pub trait LlmClient: Send + Sync {
    /// Runs one generation request.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures, non-success responses and
    /// bodies that cannot be decoded.
    fn complete(&self, request: &CompletionRequest) -> CompletionFuture<'_>;

    /// Whether credentials are present. Never performs I/O.
    fn is_configured(&self) -> bool;
}
