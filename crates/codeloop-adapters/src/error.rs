//! Adapter error types.
//!
//! Tool implementations surface failures through [`AdapterError`].  The
//! registry only sees the rendered message, via the conversion into
//! [`ToolError`].

use codeloop_agent::ToolError;

/// Unified error type for the tool adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// An I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The arguments supplied to a tool are missing or malformed.
    #[error("invalid arguments for `{tool_name}`: {reason}")]
    InvalidParams { tool_name: String, reason: String },

    /// A path resolved outside the tool root.
    #[error("path `{path}` is outside the root directory `{root}`")]
    OutsideRoot { path: String, root: String },

    /// A tool ran but could not complete.
    #[error("{tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// An operation exceeded its time limit.
    #[error("timeout after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },
}

impl AdapterError {
    pub(crate) fn invalid(tool_name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            tool_name: tool_name.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn failed(tool_name: &str, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.to_owned(),
            reason: reason.into(),
        }
    }
}

impl From<AdapterError> for ToolError {
    fn from(err: AdapterError) -> Self {
        ToolError::new(err.to_string())
    }
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;
