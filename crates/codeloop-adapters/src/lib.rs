//! Tool implementations for codeloop -- filesystem, search and shell.
//!
//! Each tool implements [`codeloop_agent::Tool`] and operates inside a
//! [`Workspace`] root.  [`default_registry`] wires the full set into a
//! [`ToolRegistry`].

pub mod error;
pub mod filesystem;
pub mod search;
pub mod shell;
pub mod workspace;

use std::path::PathBuf;
use std::sync::Arc;

use codeloop_agent::{Tool, ToolRegistry, ToolsConfig};

pub use error::{AdapterError, Result};
pub use filesystem::{ListFilesTool, ReadFileTool, RemoveTool, WriteFileTool};
pub use search::SearchFilesTool;
pub use shell::ExecuteCommandTool;
pub use workspace::Workspace;

/// Every built-in tool, rooted at `root`.
pub fn builtin_tools(root: impl Into<PathBuf>, config: &ToolsConfig) -> Vec<Arc<dyn Tool>> {
    let ws = Workspace::new(root);
    vec![
        Arc::new(ReadFileTool::new(ws.clone())) as Arc<dyn Tool>,
        Arc::new(WriteFileTool::new(ws.clone())),
        Arc::new(ListFilesTool::new(ws.clone())),
        Arc::new(SearchFilesTool::new(ws.clone())),
        Arc::new(RemoveTool::new(ws.clone())),
        Arc::new(ExecuteCommandTool::new(ws).with_timeout(config.shell_timeout_secs)),
    ]
}

/// A registry holding every built-in tool, with the names listed in
/// `config.disabled` registered disabled.
pub fn default_registry(root: impl Into<PathBuf>, config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in builtin_tools(root, config) {
        if config.disabled.iter().any(|name| name == tool.name()) {
            registry.register_disabled(tool);
        } else {
            registry.register(tool);
        }
    }
    for name in &config.disabled {
        if !registry.has_tool(name) {
            tracing::warn!(tool = %name, "disabled tool is not a built-in, ignoring");
        }
    }
    tracing::debug!(tools = ?registry, "tool registry ready");
    registry
}
