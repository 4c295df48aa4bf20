//! Application configuration.
//!
//! Configuration is a TOML document with a table of named provider records.
//! Each record is tagged by `type`, so a record deserializes straight into
//! the precisely-typed configuration of one provider kind:
//!
//! ```toml
//! default_provider = "local"
//!
//! [providers.local]
//! type = "ollama"
//! model = "qwen2.5-coder:7b"
//!
//! [providers.cloud]
//! type = "anthropic"
//! api_key_env = "ANTHROPIC_API_KEY"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AgentError, Result};
use crate::llm::provider::DEFAULT_TIMEOUT_SECS;

/// Default ceiling on model calls per turn.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Environment variable naming the provider entry to use.
pub const PROVIDER_ENV: &str = "CODELOOP_PROVIDER";

/// Environment variable overriding the selected provider's model.
pub const MODEL_ENV: &str = "CODELOOP_MODEL";

const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5:latest";
const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Provider records
// ---------------------------------------------------------------------------

/// Configuration for one named provider, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// A locally hosted model served by Ollama.
    Ollama(OllamaConfig),
    /// Anthropic's hosted Messages API.
    Anthropic(AnthropicConfig),
    /// Any endpoint speaking the OpenAI Chat Completions protocol.
    #[serde(rename = "openai")]
    OpenAi(OpenAiConfig),
}

impl ProviderConfig {
    /// The discriminator value of this record.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ollama(_) => "ollama",
            Self::Anthropic(_) => "anthropic",
            Self::OpenAi(_) => "openai",
        }
    }

    /// The configured model id.
    pub fn model(&self) -> &str {
        match self {
            Self::Ollama(c) => &c.model,
            Self::Anthropic(c) => &c.model,
            Self::OpenAi(c) => &c.model,
        }
    }

    /// Replace the configured model id.
    pub fn set_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        match self {
            Self::Ollama(c) => c.model = model,
            Self::Anthropic(c) => c.model = model,
            Self::OpenAi(c) => c.model = model,
        }
    }
}

/// Ollama (`type = "ollama"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Server root, e.g. `http://localhost:11434`.
    pub host: String,
    pub model: String,
    /// Maps to Ollama's `num_predict` option.
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.to_owned(),
            model: DEFAULT_OLLAMA_MODEL.to_owned(),
            max_tokens: None,
            temperature: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Anthropic Messages API (`type = "anthropic"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    pub base_url: String,
    /// Literal key.  Takes precedence over `api_key_env`.
    pub api_key: Option<String>,
    /// Name of the environment variable holding the key.
    pub api_key_env: Option<String>,
    pub model: String,
    /// Required by the API on every request.
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ANTHROPIC_BASE_URL.to_owned(),
            api_key: None,
            api_key_env: Some("ANTHROPIC_API_KEY".to_owned()),
            model: DEFAULT_ANTHROPIC_MODEL.to_owned(),
            max_tokens: 4096,
            temperature: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// OpenAI-compatible gateway (`type = "openai"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API root including the version segment, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_owned(),
            api_key: None,
            api_key_env: Some("OPENAI_API_KEY".to_owned()),
            model: DEFAULT_OPENAI_MODEL.to_owned(),
            max_tokens: None,
            temperature: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Resolve an API key from a literal value or a named environment variable.
///
/// Empty values count as unset.
pub fn resolve_api_key(api_key: Option<&str>, api_key_env: Option<&str>) -> Option<String> {
    if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
        return Some(key.to_owned());
    }
    let var = api_key_env?;
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Settings for the built-in tool set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Directory tool paths resolve against.  Relative to the process
    /// working directory.
    pub root_dir: PathBuf,
    /// Tools registered in the disabled state.
    pub disabled: Vec<String>,
    /// Default timeout for `execute_command`.
    pub shell_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            disabled: vec!["remove".to_owned()],
            shell_timeout_secs: DEFAULT_SHELL_TIMEOUT_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// Application config
// ---------------------------------------------------------------------------

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Key into `providers` used when none is selected explicitly.
    /// Empty in a parsed document that does not name one.
    #[serde(default)]
    pub default_provider: String,
    /// Ceiling on model calls per turn.
    pub max_iterations: usize,
    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
    pub providers: BTreeMap<String, ProviderConfig>,
    pub tools: ToolsConfig,
}

impl Default for AppConfig {
    /// A single local Ollama provider named `local`.
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(
            "local".to_owned(),
            ProviderConfig::Ollama(OllamaConfig::default()),
        );
        Self {
            default_provider: "local".to_owned(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: None,
            providers,
            tools: ToolsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| AgentError::Config {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), providers = config.providers.len(), "configuration loaded");
        Ok(config)
    }

    /// Parse and validate a TOML document.
    ///
    /// A document with no `[providers]` table gets the default local
    /// provider.  When `default_provider` is omitted, a document with a
    /// single provider record selects that record.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(|e| AgentError::Config {
            reason: format!("failed to parse TOML config: {e}"),
        })?;
        if config.providers.is_empty() {
            let defaults = Self::default();
            config.providers = defaults.providers;
            if config.default_provider.is_empty() {
                config.default_provider = defaults.default_provider;
            }
        }
        if config.default_provider.is_empty() {
            let mut names = config.providers.keys();
            match (names.next(), names.next()) {
                (Some(only), None) => config.default_provider = only.clone(),
                _ => {
                    return Err(AgentError::Config {
                        reason: format!(
                            "default_provider is missing (configured: {})",
                            config.provider_names().join(", ")
                        ),
                    });
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(AgentError::Config {
                reason: "max_iterations must be at least 1".into(),
            });
        }
        if !self.providers.contains_key(&self.default_provider) {
            return Err(AgentError::UnknownProvider {
                name: self.default_provider.clone(),
                valid: self.provider_names().join(", "),
            });
        }
        Ok(())
    }

    /// Configured provider names, sorted.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// The record named `name`.
    pub fn provider(&self, name: &str) -> Result<&ProviderConfig> {
        self.providers
            .get(name)
            .ok_or_else(|| AgentError::UnknownProvider {
                name: name.to_owned(),
                valid: self.provider_names().join(", "),
            })
    }

    /// The record named by `default_provider`.
    pub fn default_provider_config(&self) -> Result<&ProviderConfig> {
        self.provider(&self.default_provider)
    }

    /// Select a provider entry and/or override the selected entry's model.
    pub fn apply_overrides(&mut self, provider: Option<&str>, model: Option<&str>) -> Result<()> {
        if let Some(name) = provider {
            self.provider(name)?;
            self.default_provider = name.to_owned();
        }
        if let Some(model) = model {
            let name = self.default_provider.clone();
            let valid = self.provider_names().join(", ");
            let record =
                self.providers
                    .get_mut(&name)
                    .ok_or_else(|| AgentError::UnknownProvider {
                        name: name.clone(),
                        valid,
                    })?;
            record.set_model(model);
        }
        debug!(provider = %self.default_provider, "configuration overrides applied");
        Ok(())
    }

    /// Apply [`PROVIDER_ENV`] and [`MODEL_ENV`] when set.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        let provider = env_non_empty(PROVIDER_ENV);
        let model = env_non_empty(MODEL_ENV);
        self.apply_overrides(provider.as_deref(), model.as_deref())
    }
}

/// Read a non-empty environment variable, returning `None` if unset or empty.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
