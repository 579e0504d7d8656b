//! JSON-over-HTTPS plumbing shared by the generation-service adapters.

use std::error::Error;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub(super) type BoxError = Box<dyn Error + Send + Sync>;

/// Error envelope used by both providers: `{"error": {"message": ...}}`.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// A client whose requests are all bounded by `timeout`.
pub(super) fn client(timeout: Duration) -> Client {
    Client::builder().timeout(timeout).build().unwrap_or_default()
}

/// Reads `var` from the environment, treating an empty value as unset.
pub(super) fn api_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|k| !k.trim().is_empty())
}

/// Sends `request` and decodes a successful body as `T`.
///
/// Non-2xx responses become errors carrying the provider's message when
/// the body has one, or the raw body otherwise.
pub(super) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> Result<T, BoxError> {
    let response =
        request.send().await.map_err(|e| format!("{provider} request failed: {e}"))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("failed to read {provider} response: {e}"))?;

    if !status.is_success() {
        return Err(error_message(provider, status.as_u16(), body).into());
    }
    serde_json::from_str(&body)
        .map_err(|e| format!("failed to parse {provider} response: {e}").into())
}

fn error_message(provider: &str, status: u16, body: String) -> String {
    let message =
        serde_json::from_str::<ErrorEnvelope>(&body).map_or(body, |e| e.error.message);
    format!("{provider} error ({status}): {message}")
}
