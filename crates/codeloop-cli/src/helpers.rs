//! Shared helper functions for the CLI.
//!
//! Includes tracing initialization, configuration resolution and system
//! prompt construction.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use codeloop_agent::AppConfig;

/// Config file picked up from the working directory when `--config` is not
/// given.
pub const DEFAULT_CONFIG_FILE: &str = "codeloop.toml";

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// Logs go to stderr so they never interleave with streamed answers on
/// stdout.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Resolve the configuration.
///
/// Resolution order:
///
/// 1. The file given with `--config` (must exist).
/// 2. `codeloop.toml` in `cwd`, when present.
/// 3. The built-in default: a local Ollama provider.
///
/// `CODELOOP_PROVIDER` / `CODELOOP_MODEL` are then applied, and finally the
/// `--provider` / `--model` flags.
pub fn load_config(
    explicit: Option<&Path>,
    cwd: &Path,
    provider: Option<&str>,
    model: Option<&str>,
) -> Result<AppConfig> {
    let mut config = match explicit {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let candidate = cwd.join(DEFAULT_CONFIG_FILE);
            if candidate.is_file() {
                AppConfig::load(&candidate)
                    .with_context(|| format!("failed to load config {}", candidate.display()))?
            } else {
                info!("no config file found, using the built-in local provider");
                AppConfig::default()
            }
        }
    };

    config
        .apply_env_overrides()
        .context("invalid CODELOOP_PROVIDER / CODELOOP_MODEL override")?;
    config
        .apply_overrides(provider, model)
        .context("invalid --provider / --model override")?;
    Ok(config)
}

/// The directory tools operate in: `root_dir` from the config, relative
/// paths taken from `cwd`.
pub fn tool_root(cwd: &Path, root_dir: &Path) -> PathBuf {
    if root_dir.is_absolute() {
        root_dir.to_path_buf()
    } else {
        cwd.join(root_dir)
    }
}

// ---------------------------------------------------------------------------
// System prompt
// ---------------------------------------------------------------------------

/// The configured system prompt, or the built-in one describing the
/// working directory and today's date.
pub fn system_prompt(config: &AppConfig, cwd: &Path) -> String {
    if let Some(prompt) = config.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        return prompt.to_owned();
    }

    let today = chrono::Local::now().format("%Y-%m-%d (%A)");
    format!(
        "You are codeloop, a coding assistant working in a software project.\n\
         Use the available tools to inspect and change files and to run commands \
         instead of guessing. Read a file before editing it. Keep answers short and \
         concrete.\n\n\
         Working directory: {}\n\
         Current date: {today}\n",
        cwd.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_local_provider() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(None, dir.path(), None, Some("llama3.2")).unwrap();
        assert_eq!(config.default_provider, "local");
        assert_eq!(config.default_provider_config().unwrap().model(), "llama3.2");
    }

    #[test]
    fn config_file_in_cwd_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            r#"
default_provider = "gateway"

[providers.gateway]
type = "openai"
base_url = "http://localhost:8000/v1"
model = "local-model"
"#,
        )
        .unwrap();

        let config = load_config(None, dir.path(), None, None).unwrap();
        assert_eq!(config.default_provider, "gateway");
        assert_eq!(config.default_provider_config().unwrap().kind(), "openai");
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_config(Some(&missing), dir.path(), None, None).unwrap_err();
        assert!(err.to_string().contains("failed to load config"));
    }

    #[test]
    fn unknown_provider_flag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(None, dir.path(), Some("cloud"), None).unwrap_err();
        assert!(format!("{err:#}").contains("unknown provider `cloud`"));
    }

    #[test]
    fn tool_root_is_relative_to_cwd() {
        let cwd = Path::new("/work/project");
        assert_eq!(tool_root(cwd, Path::new(".")), PathBuf::from("/work/project/."));
        assert_eq!(tool_root(cwd, Path::new("/srv")), PathBuf::from("/srv"));
    }

    #[test]
    fn system_prompt_mentions_cwd_and_date() {
        let prompt = system_prompt(&AppConfig::default(), Path::new("/work/project"));
        assert!(prompt.contains("Working directory: /work/project"));
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        assert!(prompt.contains(&today));
    }

    #[test]
    fn configured_system_prompt_wins() {
        let config = AppConfig {
            system_prompt: Some("Answer in haiku.".into()),
            ..AppConfig::default()
        };
        assert_eq!(system_prompt(&config, Path::new("/")), "Answer in haiku.");
    }
}
