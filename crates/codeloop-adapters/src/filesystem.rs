//! Filesystem tools -- read, write, list and remove files under the tool
//! root.
//!
//! Every path goes through [`Workspace::resolve`], so tools cannot reach
//! outside the root directory (e.g. `../../etc/passwd`).

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use codeloop_agent::{ChatTool, Tool, ToolArguments, ToolError};

use crate::error::{AdapterError, Result};
use crate::workspace::{Workspace, optional_str, require_str};

/// Maximum characters returned per file read to limit token usage.
/// Approximately 4 000 tokens at typical tokenization rates.
pub const MAX_FILE_READ_CHARS: usize = 16_000;

// ---------------------------------------------------------------------------
// read_file
// ---------------------------------------------------------------------------

/// Returns a file's contents.
pub struct ReadFileTool {
    workspace: Workspace,
}

impl ReadFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    async fn run(&self, arguments: &ToolArguments) -> Result<String> {
        let raw_path = require_str(arguments, "file_path", "read_file")?;
        let full_path = self.workspace.resolve(raw_path)?;
        debug!(path = %full_path.display(), "reading file");

        let raw = tokio::fs::read_to_string(&full_path).await?;
        Ok(truncate_chars(raw, MAX_FILE_READ_CHARS))
    }
}

/// Cut `text` after `limit` characters and append a truncation notice.
fn truncate_chars(text: String, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        None => text,
        Some((end, _)) => {
            let total = text.chars().count();
            format!(
                "{}\n\n[... file truncated at {limit} chars ({total} total)]",
                &text[..end]
            )
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn schema(&self) -> ChatTool {
        ChatTool {
            name: "read_file".into(),
            description: "Read the contents of a file".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "Path to the file to read" }
                },
                "required": ["file_path"]
            }),
        }
    }

    async fn execute(&self, arguments: &ToolArguments) -> std::result::Result<String, ToolError> {
        Ok(self.run(arguments).await?)
    }
}

// ---------------------------------------------------------------------------
// write_file
// ---------------------------------------------------------------------------

/// Writes a file, creating parent directories as needed.
pub struct WriteFileTool {
    workspace: Workspace,
}

impl WriteFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    async fn run(&self, arguments: &ToolArguments) -> Result<String> {
        let raw_path = require_str(arguments, "file_path", "write_file")?;
        let content = require_str(arguments, "content", "write_file")?;
        let full_path = self.workspace.resolve(raw_path)?;
        debug!(path = %full_path.display(), bytes = content.len(), "writing file");

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, content).await?;

        Ok(format!(
            "Wrote {} bytes to {}",
            content.len(),
            self.workspace.display(&full_path)
        ))
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn schema(&self) -> ChatTool {
        ChatTool {
            name: "write_file".into(),
            description: "Write content to a file, creating it and its parent directories if necessary".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "Path to the file to write" },
                    "content": { "type": "string", "description": "Full content to write" }
                },
                "required": ["file_path", "content"]
            }),
        }
    }

    async fn execute(&self, arguments: &ToolArguments) -> std::result::Result<String, ToolError> {
        Ok(self.run(arguments).await?)
    }
}

// ---------------------------------------------------------------------------
// list_files
// ---------------------------------------------------------------------------

/// Lists a directory, one sorted entry per line.
pub struct ListFilesTool {
    workspace: Workspace,
}

impl ListFilesTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    async fn run(&self, arguments: &ToolArguments) -> Result<String> {
        let raw_path = optional_str(arguments, "path").unwrap_or(".");
        let full_path = self.workspace.resolve(raw_path)?;
        debug!(path = %full_path.display(), "listing directory");

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&full_path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                name.push('/');
            }
            entries.push(name);
        }

        if entries.is_empty() {
            return Ok(format!(
                "{} is empty",
                self.workspace.display(&full_path)
            ));
        }
        entries.sort();
        Ok(entries.join("\n"))
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn schema(&self) -> ChatTool {
        ChatTool {
            name: "list_files".into(),
            description: "List the entries of a directory. Directories end with `/`".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Directory path (default: the root directory)" }
                }
            }),
        }
    }

    async fn execute(&self, arguments: &ToolArguments) -> std::result::Result<String, ToolError> {
        Ok(self.run(arguments).await?)
    }
}

// ---------------------------------------------------------------------------
// remove
// ---------------------------------------------------------------------------

/// Deletes a file or a whole directory tree.
pub struct RemoveTool {
    workspace: Workspace,
}

impl RemoveTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    async fn run(&self, arguments: &ToolArguments) -> Result<String> {
        let raw_path = require_str(arguments, "file_path", "remove")?;
        let full_path = self.workspace.resolve(raw_path)?;
        if full_path == self.workspace.root() {
            return Err(AdapterError::invalid("remove", "refusing to remove the root directory"));
        }
        debug!(path = %full_path.display(), "removing");

        let meta = tokio::fs::symlink_metadata(&full_path).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(&full_path).await?;
        } else {
            tokio::fs::remove_file(&full_path).await?;
        }
        Ok(format!("Removed {}", self.workspace.display(&full_path)))
    }
}

#[async_trait]
impl Tool for RemoveTool {
    fn name(&self) -> &str {
        "remove"
    }

    fn schema(&self) -> ChatTool {
        ChatTool {
            name: "remove".into(),
            description: "Delete a file or a directory and everything in it".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "Path to delete" }
                },
                "required": ["file_path"]
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

    fn setup() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        (dir, ws)
    }

    #[tokio::test]
    async fn read_file_returns_contents() {
        let (dir, ws) = setup();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();

        let out = ReadFileTool::new(ws)
            .execute(&args(json!({"file_path": "a.txt"})))
            .await
            .unwrap();
        assert_eq!(out, "alpha");
    }

    #[tokio::test]
    async fn read_file_truncates_long_files() {
        let (dir, ws) = setup();
        std::fs::write(dir.path().join("big.txt"), "é".repeat(MAX_FILE_READ_CHARS + 10)).unwrap();

        let out = ReadFileTool::new(ws)
            .execute(&args(json!({"file_path": "big.txt"})))
            .await
            .unwrap();
        assert!(out.starts_with(&"é".repeat(MAX_FILE_READ_CHARS)));
        assert!(out.ends_with("[... file truncated at 16000 chars (16010 total)]"));
    }

    #[tokio::test]
    async fn read_file_reports_missing_argument_and_file() {
        let (_dir, ws) = setup();
        let tool = ReadFileTool::new(ws);

        let err = tool.execute(&ToolArguments::new()).await.unwrap_err();
        assert!(err.message().contains("missing required string field `file_path`"));

        let err = tool
            .execute(&args(json!({"file_path": "nope.txt"})))
            .await
            .unwrap_err();
        assert!(err.message().starts_with("io error:"));
    }

    #[tokio::test]
    async fn read_file_blocks_traversal() {
        let (_dir, ws) = setup();
        let err = ReadFileTool::new(ws)
            .execute(&args(json!({"file_path": "../../etc/passwd"})))
            .await
            .unwrap_err();
        assert!(err.message().contains("outside the root directory"));
    }

    #[tokio::test]
    async fn write_file_creates_parents() {
        let (dir, ws) = setup();
        let out = WriteFileTool::new(ws)
            .execute(&args(json!({"file_path": "src/new/mod.rs", "content": "fn main() {}"})))
            .await
            .unwrap();
        assert_eq!(out, "Wrote 12 bytes to src/new/mod.rs");
        let written = std::fs::read_to_string(dir.path().join("src/new/mod.rs")).unwrap();
        assert_eq!(written, "fn main() {}");
    }

    #[tokio::test]
    async fn list_files_sorts_and_marks_directories() {
        let (dir, ws) = setup();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let tool = ListFilesTool::new(ws);
        let out = tool.execute(&ToolArguments::new()).await.unwrap();
        assert_eq!(out, "a.txt\nb.txt\nsrc/");

        let out = tool.execute(&args(json!({"path": "src"}))).await.unwrap();
        assert_eq!(out, "src is empty");
    }

    #[tokio::test]
    async fn remove_deletes_files_and_trees() {
        let (dir, ws) = setup();
        std::fs::write(dir.path().join("gone.txt"), "x").unwrap();
        std::fs::create_dir_all(dir.path().join("tree/inner")).unwrap();
        std::fs::write(dir.path().join("tree/inner/f.txt"), "x").unwrap();

        let tool = RemoveTool::new(ws);
        let out = tool
            .execute(&args(json!({"file_path": "gone.txt"})))
            .await
            .unwrap();
        assert_eq!(out, "Removed gone.txt");
        assert!(!dir.path().join("gone.txt").exists());

        tool.execute(&args(json!({"file_path": "tree"})))
            .await
            .unwrap();
        assert!(!dir.path().join("tree").exists());
    }

    #[tokio::test]
    async fn remove_refuses_the_root() {
        let (dir, ws) = setup();
        let err = RemoveTool::new(ws)
            .execute(&args(json!({"file_path": "."})))
            .await
            .unwrap_err();
        assert!(err.message().contains("refusing to remove the root directory"));
        assert!(dir.path().exists());
    }
}
