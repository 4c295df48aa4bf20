//! The provider capability set and the HTTP plumbing shared by every
//! concrete provider.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::error::ProviderError;
use crate::llm::types::{ChatChunk, ChatRequest, ChatResponse};

/// Default HTTP timeout for provider requests, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// A lazy, finite stream of response fragments.
///
/// Not restartable: calling [`Provider::stream_chat`] again issues a new
/// network request.
pub type ChatStream = BoxStream<'static, Result<ChatChunk, ProviderError>>;

/// Translates the common chat model to and from one LLM vendor's API.
///
/// Implementations map every vendor failure onto [`ProviderError`] before it
/// leaves the provider.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider name used in logs and error annotations.
    fn name(&self) -> &str;

    /// The model used when a request leaves `model` empty.
    fn default_model(&self) -> &str;

    /// Send a request and wait for the complete response.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Send a request and return the response as it streams in.
    ///
    /// The final item of a successful stream is a terminal chunk carrying the
    /// reassembled tool calls (possibly none).
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChatStream, ProviderError>;
}

/// Pick the request's model, falling back to the provider default.
pub(crate) fn resolve_model<'a>(request: &'a ChatRequest, default_model: &'a str) -> &'a str {
    if request.model.is_empty() {
        default_model
    } else {
        &request.model
    }
}

/// Build the `reqwest` client every provider uses.
pub(crate) fn build_http_client(
    provider: &str,
    timeout_secs: u64,
) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::request(provider, format!("failed to build HTTP client: {e}")))
}

/// POST a JSON body and return the response if its status is a success.
///
/// Non-success statuses are read and mapped through
/// [`ProviderError::from_status`].
pub(crate) async fn post_json(
    http: &reqwest::Client,
    provider: &str,
    model: &str,
    url: &str,
    headers: HeaderMap,
    body: &Value,
) -> Result<reqwest::Response, ProviderError> {
    tracing::debug!(url = %url, model = %model, provider = provider, "sending LLM request");

    let resp = http
        .post(url)
        .headers(headers)
        .json(body)
        .send()
        .await
        .map_err(|e| ProviderError::from_transport(provider, &e))?;

    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let headers = resp.headers().clone();
    let text = resp.text().await.unwrap_or_default();
    tracing::warn!(provider = provider, status = %status, "LLM request rejected");
    Err(ProviderError::from_status(
        provider, model, status, &headers, &text,
    ))
}

/// Read a successful response body as JSON.
pub(crate) async fn read_json(
    provider: &str,
    resp: reqwest::Response,
) -> Result<Value, ProviderError> {
    let text = resp
        .text()
        .await
        .map_err(|e| ProviderError::request(provider, format!("failed to read response body: {e}")))?;

    serde_json::from_str(&text)
        .map_err(|e| ProviderError::request(provider, format!("invalid JSON response: {e}")))
}
