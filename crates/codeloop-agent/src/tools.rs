//! Tool contract and the registry the agent dispatches tool calls through.
//!
//! A [`Tool`] is one named, side-effecting capability the model may invoke.
//! The [`ToolRegistry`] keeps every registered tool together with its
//! advertised schema and an enabled flag, and turns every outcome of an
//! invocation (success, failure, unknown name, disabled tool, panic) into a
//! plain string the model can read.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

use crate::llm::types::{ChatTool, ToolArguments};

// ---------------------------------------------------------------------------
// Tool contract
// ---------------------------------------------------------------------------

/// Failure reported by a tool.  The message is shown to the model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ToolError {
    message: String,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An executable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model calls the tool by.
    fn name(&self) -> &str;

    /// The schema advertised to the model.
    fn schema(&self) -> ChatTool;

    /// Run the tool.  Arguments are exactly what the model produced and have
    /// not been validated against the schema.
    async fn execute(&self, arguments: &ToolArguments) -> Result<String, ToolError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct ToolEntry {
    tool: Arc<dyn Tool>,
    schema: ChatTool,
    enabled: bool,
}

/// Tools keyed by name, in registration order, each with an enabled flag.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<ToolEntry>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|e| (&e.schema.name, e.enabled)))
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an enabled tool.
    ///
    /// Registering a name that already exists replaces the entry in place,
    /// keeping its position.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.insert(tool, true);
    }

    /// Register a tool in the disabled state.
    pub fn register_disabled(&mut self, tool: Arc<dyn Tool>) {
        self.insert(tool, false);
    }

    fn insert(&mut self, tool: Arc<dyn Tool>, enabled: bool) {
        let name = tool.name().to_owned();
        let mut schema = tool.schema();
        if schema.name != name {
            tracing::warn!(tool = %name, schema_name = %schema.name, "schema name differs from tool name, using tool name");
            schema.name = name.clone();
        }

        let entry = ToolEntry {
            tool,
            schema,
            enabled,
        };
        match self.index.get(&name) {
            Some(&i) => {
                tracing::debug!(tool = %name, "replacing registered tool");
                self.entries[i] = entry;
            }
            None => {
                self.index.insert(name, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    fn entry(&self, name: &str) -> Option<&ToolEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let Some(&i) = self.index.get(name) else {
            tracing::debug!(tool = name, "toggle ignored for unregistered tool");
            return false;
        };
        let entry = &mut self.entries[i];
        let changed = entry.enabled != enabled;
        entry.enabled = enabled;
        changed
    }

    /// Enable a tool.  Returns whether its state changed.
    pub fn enable(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    /// Disable a tool.  Returns whether its state changed.
    pub fn disable(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    /// Schemas of the enabled tools, in registration order.
    pub fn enabled_schemas(&self) -> Vec<ChatTool> {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.schema.clone())
            .collect()
    }

    /// Names of all registered tools, in registration order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.schema.name.as_str()).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Whether `name` is registered and enabled.
    pub fn is_tool_enabled(&self, name: &str) -> bool {
        self.entry(name).is_some_and(|e| e.enabled)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke a tool and render the outcome as text.
    ///
    /// Never fails: unknown and disabled tools, tool errors and panics all
    /// come back as an `Error...` string.
    pub async fn execute(&self, name: &str, arguments: &ToolArguments) -> String {
        let Some(entry) = self.entry(name) else {
            tracing::warn!(tool = name, "model called an unregistered tool");
            return format!("Error: tool '{name}' not found");
        };
        if !entry.enabled {
            tracing::warn!(tool = name, "model called a disabled tool");
            return format!("Error: tool '{name}' is disabled");
        }

        tracing::debug!(tool = name, "executing tool");
        let outcome = AssertUnwindSafe(entry.tool.execute(arguments))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!(tool = name, error = %e, "tool failed");
                format!("Error executing {name}: {e}")
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(tool = name, panic = %message, "tool panicked");
                format!("Error executing {name}: {message}")
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("tool panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("tool panicked: {s}")
    } else {
        "tool panicked".to_owned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
