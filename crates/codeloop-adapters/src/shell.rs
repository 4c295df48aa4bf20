//! Shell tool -- run a command through `sh -c` in the tool root.
//!
//! Output is truncated to [`MAX_OUTPUT_BYTES`] (100 KB) per stream to prevent
//! memory exhaustion from runaway commands.  A non-zero exit status is not a
//! tool failure; the model sees the code and both streams.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use codeloop_agent::{ChatTool, Tool, ToolArguments, ToolError};

use crate::error::{AdapterError, Result};
use crate::workspace::{Workspace, require_str};

/// Default command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum output size in bytes (100 KB).  Stdout and stderr are each
/// independently truncated to this limit.
pub const MAX_OUTPUT_BYTES: usize = 100 * 1024;

/// Runs shell commands with a timeout.
pub struct ExecuteCommandTool {
    workspace: Workspace,
    default_timeout_secs: u64,
}

impl ExecuteCommandTool {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the timeout used when the call does not give one.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.default_timeout_secs = timeout_secs.max(1);
        self
    }

    async fn run(&self, arguments: &ToolArguments) -> Result<String> {
        let command = require_str(arguments, "command", "execute_command")?;
        let timeout_secs = arguments
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .filter(|secs| *secs > 0)
            .unwrap_or(self.default_timeout_secs);
        let working_dir = self.workspace.root();

        debug!(
            command,
            working_dir = %working_dir.display(),
            timeout_secs,
            "executing shell command"
        );

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AdapterError::failed("execute_command", format!("failed to spawn process: {e}"))
            })?;

        // On timeout the child is dropped and killed via `kill_on_drop(true)`.
        let output = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AdapterError::failed(
                    "execute_command",
                    format!("process error: {e}"),
                ));
            }
            Err(_) => {
                warn!(command, timeout_secs, "command timed out");
                return Err(AdapterError::Timeout {
                    seconds: timeout_secs,
                    reason: format!("shell command `{command}` exceeded time limit"),
                });
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let (stdout, stdout_truncated) = truncate_output(&output.stdout);
        let (stderr, stderr_truncated) = truncate_output(&output.stderr);
        debug!(exit_code, stdout_truncated, stderr_truncated, "command completed");

        let mut out = format!("exit code: {exit_code}");
        if !stdout.is_empty() {
            out.push_str("\n--- stdout ---\n");
            out.push_str(&stdout);
        }
        if !stderr.is_empty() {
            out.push_str("\n--- stderr ---\n");
            out.push_str(&stderr);
        }
        Ok(out)
    }
}

/// Truncate raw command output to [`MAX_OUTPUT_BYTES`], converting to a
/// lossy UTF-8 string.  Returns `(output_string, was_truncated)`.
fn truncate_output(raw: &[u8]) -> (String, bool) {
    if raw.len() <= MAX_OUTPUT_BYTES {
        (String::from_utf8_lossy(raw).into_owned(), false)
    } else {
        let mut s = String::from_utf8_lossy(&raw[..MAX_OUTPUT_BYTES]).into_owned();
        s.push_str("\n... [output truncated at 100 KB]");
        (s, true)
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn schema(&self) -> ChatTool {
        ChatTool {
            name: "execute_command".into(),
            description: "Execute a shell command in the project root and return its exit code, stdout and stderr".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute"
                    },
                    "timeout_secs": {
                        "type": "integer",
                        "description": format!("Timeout in seconds (default: {})", self.default_timeout_secs)
                    }
                },
                "required": ["command"]
            }),
        }
    }

    async fn execute(&self, arguments: &ToolArguments) -> std::result::Result<String, ToolError> {
        Ok(self.run(arguments).await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: serde_json::Value) -> ToolArguments {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("unexpected: {other:?}"),
        }
    }

    fn tool() -> (tempfile::TempDir, ExecuteCommandTool) {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecuteCommandTool::new(Workspace::new(dir.path()));
        (dir, tool)
    }

    #[tokio::test]
    async fn reports_exit_code_and_streams() {
        let (_dir, tool) = tool();
        let out = tool
            .execute(&args(json!({"command": "echo hello; echo oops >&2; exit 3"})))
            .await
            .unwrap();
        assert_eq!(out, "exit code: 3\n--- stdout ---\nhello\n\n--- stderr ---\noops\n");
    }

    #[tokio::test]
    async fn runs_in_the_root_directory() {
        let (dir, tool) = tool();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let out = tool.execute(&args(json!({"command": "ls"}))).await.unwrap();
        assert!(out.contains("marker.txt"), "{out}");
    }

    #[tokio::test]
    async fn times_out() {
        let (_dir, tool) = tool();
        let err = tool
            .execute(&args(json!({"command": "sleep 5", "timeout_secs": 1})))
            .await
            .unwrap_err();
        assert!(err.message().starts_with("timeout after 1s"), "{}", err.message());
    }

    #[tokio::test]
    async fn missing_command_is_rejected() {
        let (_dir, tool) = tool();
        let err = tool.execute(&ToolArguments::new()).await.unwrap_err();
        assert!(err.message().contains("missing required string field `command`"));
    }

    #[test]
    fn truncate_output_short_input_not_truncated() {
        let (s, truncated) = truncate_output(b"hello world");
        assert_eq!(s, "hello world");
        assert!(!truncated);
    }

    #[test]
    fn truncate_output_large_input_is_truncated() {
        let data = vec![b'x'; MAX_OUTPUT_BYTES + 1000];
        let (s, truncated) = truncate_output(&data);
        assert!(truncated);
        assert!(s.ends_with("[output truncated at 100 KB]"));
        assert!(s.len() <= MAX_OUTPUT_BYTES + 50);
    }
}
