//! Agent error types.
//!
//! Provider failures surface through [`ProviderError`], whose variants form
//! the only vocabulary vendor-specific failures are allowed to cross the
//! provider boundary in.  Everything else the agent can fail on is an
//! [`AgentError`].

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};

// ---------------------------------------------------------------------------
// Provider errors
// ---------------------------------------------------------------------------

/// Failure reported by an LLM provider, annotated with the provider name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Generic provider failure: network errors, 5xx responses, malformed
    /// payloads, or a stream that broke off mid-way.
    #[error("{provider} request failed: {message}")]
    Request {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// The credentials were rejected.
    #[error("{provider} authentication failed: {message}")]
    Authentication { provider: String, message: String },

    /// The provider is throttling requests.
    #[error("{provider} rate limit exceeded: {message}")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
        message: String,
    },

    /// The requested model does not exist on this provider.
    #[error("{provider} has no model named `{model}`")]
    ModelNotFound { provider: String, model: String },
}

impl ProviderError {
    /// Build a generic request failure.
    pub fn request(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            provider: provider.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Map an unsuccessful HTTP response onto the taxonomy.
    ///
    /// `model` is the model id that was requested, used to key
    /// [`ProviderError::ModelNotFound`].  `body` is the raw response body.
    pub fn from_status(
        provider: &str,
        model: &str,
        status: StatusCode,
        headers: &HeaderMap,
        body: &str,
    ) -> Self {
        let message = extract_error_message(body);
        match status.as_u16() {
            401 | 403 => Self::Authentication {
                provider: provider.to_owned(),
                message,
            },
            // 529 is Anthropic's "overloaded" signal.
            429 | 529 => Self::RateLimited {
                provider: provider.to_owned(),
                retry_after_secs: parse_retry_after(headers),
                message,
            },
            404 => Self::ModelNotFound {
                provider: provider.to_owned(),
                model: model.to_owned(),
            },
            400 if mentions_unknown_model(&message, model) => Self::ModelNotFound {
                provider: provider.to_owned(),
                model: model.to_owned(),
            },
            code => Self::Request {
                provider: provider.to_owned(),
                status: Some(code),
                message,
            },
        }
    }

    /// Map a transport-level `reqwest` failure.
    pub fn from_transport(provider: &str, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        Self::Request {
            provider: provider.to_owned(),
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }

    /// The provider this error originated from.
    pub fn provider(&self) -> &str {
        match self {
            Self::Request { provider, .. }
            | Self::Authentication { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::ModelNotFound { provider, .. } => provider,
        }
    }

    /// How long the provider asked us to wait, if it said.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// Whether repeating the same request later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Request { status, .. } => status.is_none_or(|s| s >= 500),
            Self::Authentication { .. } | Self::ModelNotFound { .. } => false,
        }
    }
}

/// Pull a human-readable message out of a vendor error body.
///
/// Understands `{"error": {"message": ..}}` (OpenAI, Anthropic),
/// `{"error": ".."}` (Ollama) and falls back to the raw body.
fn extract_error_message(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = v["error"]["message"].as_str() {
            return msg.to_owned();
        }
        if let Some(msg) = v["error"].as_str() {
            return msg.to_owned();
        }
        if let Some(msg) = v["message"].as_str() {
            return msg.to_owned();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty error body".to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn mentions_unknown_model(message: &str, model: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("model")
        && (lower.contains("not found") || lower.contains("does not exist"))
        && (model.is_empty() || message.contains(model))
}

/// `Retry-After` in delta-seconds form.  HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| *secs >= 0.0)
        .map(|secs| secs.ceil() as u64)
}

// ---------------------------------------------------------------------------
// Agent errors
// ---------------------------------------------------------------------------

/// Unified error type for the agent runtime.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A provider call failed.  The transcript is left as it was.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Configuration validation or loading failed.
    #[error("config error: {reason}")]
    Config { reason: String },

    /// The API key is missing for a provider that requires one.
    #[error("missing api key for provider `{provider}` (set `api_key` or `api_key_env`)")]
    MissingApiKey { provider: String },

    /// A provider name or kind that is not configured.
    #[error("unknown provider `{name}` (valid: {valid})")]
    UnknownProvider { name: String, valid: String },

    /// I/O failure, e.g. while reading a config file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn status(code: u16) -> StatusCode {
        StatusCode::from_u16(code).unwrap()
    }

    #[test]
    fn unauthorized_maps_to_authentication() {
        let err = ProviderError::from_status(
            "openai",
            "gpt-4o",
            status(401),
            &HeaderMap::new(),
            r#"{"error":{"message":"Incorrect API key provided"}}"#,
        );
        assert_eq!(
            err,
            ProviderError::Authentication {
                provider: "openai".into(),
                message: "Incorrect API key provided".into(),
            }
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn too_many_requests_reads_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("17"));
        let err = ProviderError::from_status("anthropic", "m", status(429), &headers, "slow down");
        match &err {
            ProviderError::RateLimited {
                retry_after_secs, ..
            } => assert_eq!(*retry_after_secs, Some(17)),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(err.retry_after(), Some(Duration::from_secs(17)));
        assert!(err.is_retryable());
    }

    #[test]
    fn http_date_retry_after_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        let err = ProviderError::from_status("openai", "m", status(429), &headers, "");
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn not_found_is_keyed_by_model() {
        let err = ProviderError::from_status(
            "ollama",
            "llama9",
            status(404),
            &HeaderMap::new(),
            r#"{"error":"model 'llama9' not found"}"#,
        );
        assert_eq!(
            err,
            ProviderError::ModelNotFound {
                provider: "ollama".into(),
                model: "llama9".into(),
            }
        );
    }

    #[test]
    fn bad_request_naming_the_model_is_model_not_found() {
        let err = ProviderError::from_status(
            "openai",
            "gpt-9",
            status(400),
            &HeaderMap::new(),
            r#"{"error":{"message":"The model `gpt-9` does not exist"}}"#,
        );
        assert!(matches!(err, ProviderError::ModelNotFound { .. }));
    }

    #[test]
    fn server_errors_are_generic_and_retryable() {
        let err = ProviderError::from_status("openai", "m", status(503), &HeaderMap::new(), "");
        match &err {
            ProviderError::Request {
                status, message, ..
            } => {
                assert_eq!(*status, Some(503));
                assert_eq!(message, "empty error body");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(err.is_retryable());
        assert_eq!(err.provider(), "openai");
    }

    #[test]
    fn provider_error_display_names_the_provider() {
        let err: AgentError = ProviderError::request("anthropic", "boom").into();
        assert_eq!(err.to_string(), "anthropic request failed: boom");
    }
}
