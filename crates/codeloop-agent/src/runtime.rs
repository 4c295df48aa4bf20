//! The agent core: session transcript plus the bounded tool-calling loop.
//!
//! A turn appends the user's message, then alternates between asking the
//! model for a response and executing the tools it requests, until the model
//! answers without tool calls or the iteration ceiling is reached:
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            v                              │
//! Idle ──> AwaitingModel ──(tool calls)──> ExecutingTools
//!            │
//!            └──(text only / ceiling)──> Idle
//! ```

use std::sync::Arc;

use crate::config::{AppConfig, DEFAULT_MAX_ITERATIONS};
use crate::error::Result;
use crate::llm::factory::create_provider;
use crate::llm::provider::Provider;
use crate::llm::streaming::collect_stream;
use crate::llm::types::{ChatMessage, ChatRequest, ChatToolCall};
use crate::tools::ToolRegistry;

// ---------------------------------------------------------------------------
// State and callbacks
// ---------------------------------------------------------------------------

/// Where the agent is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentState {
    /// No turn in progress.
    #[default]
    Idle,
    /// Waiting for the model's response.
    AwaitingModel,
    /// Running the tools the model asked for.
    ExecutingTools,
}

/// Called before a tool runs.
pub type ToolStartHook<'a> = Box<dyn FnMut(&ChatToolCall) + Send + 'a>;

/// Called after a tool ran, with its output text.
pub type ToolEndHook<'a> = Box<dyn FnMut(&ChatToolCall, &str) + Send + 'a>;

/// Tool lifecycle callbacks for streaming turns.
///
/// A missing hook falls back to bracketed status text on the token
/// callback: `"\n[tool: NAME]\n"` before and `"[tool NAME finished]\n"`
/// after.
#[derive(Default)]
pub struct ToolHooks<'a> {
    pub on_start: Option<ToolStartHook<'a>>,
    pub on_end: Option<ToolEndHook<'a>>,
}

impl<'a> ToolHooks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start(mut self, hook: impl FnMut(&ChatToolCall) + Send + 'a) -> Self {
        self.on_start = Some(Box::new(hook));
        self
    }

    pub fn with_end(mut self, hook: impl FnMut(&ChatToolCall, &str) + Send + 'a) -> Self {
        self.on_end = Some(Box::new(hook));
        self
    }
}

/// Output side of a streaming turn.
struct StreamSink<'t, 'h> {
    on_token: &'t mut (dyn FnMut(&str) + Send),
    hooks: ToolHooks<'h>,
}

impl StreamSink<'_, '_> {
    fn tool_started(&mut self, call: &ChatToolCall) {
        match self.hooks.on_start.as_mut() {
            Some(hook) => hook(call),
            None => (self.on_token)(&format!("\n[tool: {}]\n", call.name)),
        }
    }

    fn tool_finished(&mut self, call: &ChatToolCall, output: &str) {
        match self.hooks.on_end.as_mut() {
            Some(hook) => hook(call, output),
            None => (self.on_token)(&format!("[tool {} finished]\n", call.name)),
        }
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// A conversational session bound to one provider and one tool registry.
///
/// Every operation that touches the session takes `&mut self`, so turns are
/// serialized and the provider cannot be swapped while a turn is running.
pub struct Agent {
    provider: Arc<dyn Provider>,
    registry: ToolRegistry,
    transcript: Vec<ChatMessage>,
    system_prompt: Option<String>,
    /// Empty means the provider's default model.
    model: String,
    max_iterations: usize,
    state: AgentState,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("provider", &self.provider.name())
            .field("model", &self.model())
            .field("messages", &self.transcript.len())
            .field("tools", &self.registry)
            .field("state", &self.state)
            .finish()
    }
}

impl Agent {
    pub fn new(provider: Arc<dyn Provider>, registry: ToolRegistry) -> Self {
        Self {
            provider,
            registry,
            transcript: Vec::new(),
            system_prompt: None,
            model: String::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            state: AgentState::Idle,
        }
    }

    /// Build an agent for the config's default provider.
    pub fn from_config(config: &AppConfig, registry: ToolRegistry) -> Result<Self> {
        let provider = create_provider(config.default_provider_config()?)?;
        let mut agent = Self::new(provider, registry).with_max_iterations(config.max_iterations);
        agent.system_prompt = config.system_prompt.clone();
        Ok(agent)
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Ceiling on model calls per turn.  Values below 1 are raised to 1.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    // -- Turns ---------------------------------------------------------------

    /// Run one turn and return the final assistant text.
    pub async fn turn(&mut self, input: &str) -> Result<String> {
        let result = self.drive(input, None).await;
        self.state = AgentState::Idle;
        result
    }

    /// Run one turn, forwarding every text fragment to `on_token` as it
    /// arrives.  Tool activity is reported as bracketed status text.
    pub async fn stream_turn(
        &mut self,
        input: &str,
        mut on_token: impl FnMut(&str) + Send,
    ) -> Result<String> {
        self.stream_turn_with_hooks(input, &mut on_token, ToolHooks::default())
            .await
    }

    /// Like [`stream_turn`](Self::stream_turn), reporting tool activity
    /// through `hooks`.
    pub async fn stream_turn_with_hooks(
        &mut self,
        input: &str,
        mut on_token: impl FnMut(&str) + Send,
        hooks: ToolHooks<'_>,
    ) -> Result<String> {
        let sink = StreamSink {
            on_token: &mut on_token,
            hooks,
        };
        let result = self.drive(input, Some(sink)).await;
        self.state = AgentState::Idle;
        result
    }

    async fn drive(&mut self, input: &str, mut sink: Option<StreamSink<'_, '_>>) -> Result<String> {
        self.transcript.push(ChatMessage::user(input));
        tracing::info!(
            provider = self.provider.name(),
            model = %self.model(),
            streaming = sink.is_some(),
            "turn started"
        );

        let mut last_text = String::new();
        for round in 0..self.max_iterations {
            self.state = AgentState::AwaitingModel;
            let request = self.build_request();
            tracing::debug!(round, messages = request.messages.len(), tools = request.tools.len(), "calling model");

            let response = match sink.as_mut() {
                None => self.provider.chat(&request).await?,
                Some(sink) => {
                    let stream = self.provider.stream_chat(&request).await?;
                    collect_stream(stream, &mut *sink.on_token).await?
                }
            };

            let message = response.message;
            last_text.clone_from(&message.content);
            if !message.has_tool_calls() {
                self.transcript.push(message);
                tracing::info!(rounds = round + 1, "turn finished");
                return Ok(last_text);
            }

            let calls = message.tool_calls.clone();
            self.transcript.push(message);
            self.state = AgentState::ExecutingTools;
            tracing::info!(
                round,
                tools = ?calls.iter().map(|c| &c.name).collect::<Vec<_>>(),
                "model requested tool calls"
            );

            for call in &calls {
                if let Some(sink) = sink.as_mut() {
                    sink.tool_started(call);
                }
                let output = self.registry.execute(&call.name, &call.arguments).await;
                if let Some(sink) = sink.as_mut() {
                    sink.tool_finished(call, &output);
                }
                self.transcript
                    .push(ChatMessage::tool_result(call.id.clone(), output));
            }
        }

        tracing::warn!(
            max_iterations = self.max_iterations,
            "iteration ceiling reached, returning last assistant text"
        );
        Ok(last_text)
    }

    fn build_request(&self) -> ChatRequest {
        let mut messages = Vec::with_capacity(self.transcript.len() + 1);
        if let Some(prompt) = self.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            messages.push(ChatMessage::system(prompt));
        }
        messages.extend(self.transcript.iter().cloned());
        ChatRequest::new(self.model.clone(), messages).with_tools(self.registry.enabled_schemas())
    }

    // -- Session -------------------------------------------------------------

    /// Forget the conversation.  Configuration and tools are kept.
    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Switch providers.  The transcript is kept; the model reverts to the
    /// new provider's default.
    pub fn set_provider(&mut self, provider: Arc<dyn Provider>) {
        tracing::info!(from = self.provider.name(), to = provider.name(), "switching provider");
        self.provider = provider;
        self.model.clear();
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// The model requests go to.
    pub fn model(&self) -> &str {
        if self.model.is_empty() {
            self.provider.default_model()
        } else {
            &self.model
        }
    }

    // -- Tools ---------------------------------------------------------------

    /// Returns whether the tool's state changed.
    pub fn enable_tool(&mut self, name: &str) -> bool {
        self.registry.enable(name)
    }

    /// Returns whether the tool's state changed.
    pub fn disable_tool(&mut self, name: &str) -> bool {
        self.registry.disable(name)
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.registry.tool_names()
    }

    pub fn is_tool_enabled(&self, name: &str) -> bool {
        self.registry.is_tool_enabled(name)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}
