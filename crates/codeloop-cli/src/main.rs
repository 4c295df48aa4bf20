//! CLI entry point for codeloop.
//!
//! Loads configuration, builds the tool registry and the agent, then runs
//! either a single turn or the interactive session.

mod cli;
mod helpers;
mod repl;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use codeloop_adapters::default_registry;
use codeloop_agent::Agent;

use crate::cli::Cli;
use crate::helpers::{init_tracing, load_config, system_prompt, tool_root};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env file is fine.
    dotenvy::dotenv().ok();
    init_tracing(if cli.verbose { "debug" } else { "warn" });

    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let config = load_config(
        cli.config.as_deref(),
        &cwd,
        cli.provider.as_deref(),
        cli.model.as_deref(),
    )?;

    let root = tool_root(&cwd, &config.tools.root_dir);
    let registry = default_registry(&root, &config.tools);
    let agent = Agent::from_config(&config, registry)
        .with_context(|| format!("failed to create provider `{}`", config.default_provider))?
        .with_system_prompt(system_prompt(&config, &cwd));
    info!(
        provider = %config.default_provider,
        model = %agent.model(),
        root = %root.display(),
        "agent ready"
    );

    let stream = !cli.no_stream;
    match cli.prompt_text() {
        Some(prompt) => repl::run_once(agent, config, &prompt, stream).await,
        None => repl::run(agent, config, stream).await,
    }
}
