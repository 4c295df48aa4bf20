//! CLI argument definitions for codeloop.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! wiring the agent together.

use std::path::PathBuf;

use clap::Parser;

/// codeloop -- a conversational coding agent for your terminal.
#[derive(Debug, Parser)]
#[command(
    name = "codeloop",
    version,
    about = "codeloop -- a conversational coding agent",
    long_about = "Chat with an LLM that can read, write and search files and run shell \
                  commands in the current directory. Pass a prompt for a single turn, or \
                  run without one for an interactive session."
)]
pub struct Cli {
    /// Path to a TOML config file (default: ./codeloop.toml when present).
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Provider entry to use, overriding `default_provider`.
    #[arg(long, short)]
    pub provider: Option<String>,

    /// Model id, overriding the provider's configured model.
    #[arg(long, short)]
    pub model: Option<String>,

    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(long, short)]
    pub verbose: bool,

    /// Print each answer when complete instead of streaming tokens.
    #[arg(long)]
    pub no_stream: bool,

    /// Run a single turn with this prompt and exit.
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,
}

impl Cli {
    /// The one-shot prompt, if any words were given.
    pub fn prompt_text(&self) -> Option<String> {
        let text = self.prompt.join(" ");
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_owned())
    }
}
