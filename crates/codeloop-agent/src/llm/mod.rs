//! LLM integration layer.
//!
//! This module provides the interface between the agent runtime and large
//! language model providers.  It is organized into:
//!
//! - [`types`] -- The vendor-neutral chat model.
//! - [`provider`] -- The [`Provider`] trait and shared HTTP plumbing.
//! - [`ollama`], [`anthropic`], [`openai`] -- Concrete providers.
//! - [`factory`] -- Configuration record to provider resolution.
//! - [`streaming`] -- Line framing, tool-call reassembly and stream collection.
//! - `streaming_*` -- Per-vendor stream decoders.

pub mod anthropic;
pub mod factory;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod streaming;
pub mod streaming_anthropic;
mod streaming_ollama;
mod streaming_openai;
pub mod types;

// Re-export the most commonly used types for convenience.
pub use anthropic::AnthropicProvider;
pub use factory::{PROVIDER_KINDS, create_named_provider, create_provider};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use provider::{ChatStream, Provider};
pub use streaming::collect_stream;
pub use types::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, ChatTool, ChatToolCall, ImageData, Role,
    StopReason, ToolArguments,
};
