//! Conversational coding-agent runtime.
//!
//! This crate drives a multi-turn exchange with a pluggable LLM backend and
//! lets the model invoke a bounded set of tools, feeding their output back
//! until the model produces a final answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │    Agent    │────>│ ToolRegistry │────>│  dyn Tool    │
//! │ (tool loop) │     │ (enable/exec)│     │ (adapters)   │
//! └──────┬──────┘     └──────────────┘     └──────────────┘
//!        │
//!  ┌─────┴──────┐     ┌──────────────────────────────────┐
//!  │dyn Provider│<────│ factory: ollama|anthropic|openai │
//!  └────────────┘     └──────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`llm`] -- Chat model, providers, streaming and the provider factory.
//! - [`tools`] -- The [`Tool`] contract and [`ToolRegistry`].
//! - [`runtime`] -- The [`Agent`] and its bounded tool-calling loop.
//! - [`config`] -- TOML configuration.
//! - [`error`] -- Agent and provider error types.

pub mod config;
pub mod error;
pub mod llm;
pub mod runtime;
pub mod tools;

// Re-export the most commonly used types at the crate root.
pub use config::{AppConfig, ProviderConfig, ToolsConfig};
pub use error::{AgentError, ProviderError, Result};
pub use llm::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, ChatStream, ChatTool, ChatToolCall,
    ImageData, Provider, Role, StopReason, ToolArguments, create_named_provider, create_provider,
};
pub use runtime::{Agent, AgentState, ToolHooks};
pub use tools::{Tool, ToolError, ToolRegistry};
