//! Maps configuration records to concrete providers.
//!
//! This is the only place that names the concrete provider types; the rest
//! of the crate works with `Arc<dyn Provider>`.

use std::sync::Arc;

use crate::config::{AppConfig, ProviderConfig};
use crate::error::Result;
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::ollama::OllamaProvider;
use crate::llm::openai::OpenAiProvider;
use crate::llm::provider::Provider;

/// Every accepted value of a provider record's `type` field.
pub const PROVIDER_KINDS: &[&str] = &["ollama", "anthropic", "openai"];

/// Build the provider described by `config`.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match config {
        ProviderConfig::Ollama(c) => Arc::new(OllamaProvider::new(c)?),
        ProviderConfig::Anthropic(c) => Arc::new(AnthropicProvider::new(c)?),
        ProviderConfig::OpenAi(c) => Arc::new(OpenAiProvider::new(c)?),
    };
    tracing::info!(kind = config.kind(), model = config.model(), "provider created");
    Ok(provider)
}

/// Build the provider registered under `name` in `config`.
///
/// Fails with [`AgentError::UnknownProvider`](crate::error::AgentError::UnknownProvider)
/// listing the configured names when `name` is not one of them.
pub fn create_named_provider(config: &AppConfig, name: &str) -> Result<Arc<dyn Provider>> {
    create_provider(config.provider(name)?)
}
