//! Recursive regex search over the files under the tool root.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::{debug, trace};

use codeloop_agent::{ChatTool, Tool, ToolArguments, ToolError};

use crate::error::{AdapterError, Result};
use crate::workspace::{Workspace, optional_str, require_str};

/// Maximum number of matching lines reported per search.
pub const MAX_SEARCH_MATCHES: usize = 200;

/// Directory names never descended into.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules"];

/// Longest matched line echoed back, in characters.
const MAX_LINE_CHARS: usize = 300;

/// Reports matching lines as `path:line: text`.
pub struct SearchFilesTool {
    workspace: Workspace,
}

impl SearchFilesTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    async fn run(&self, arguments: &ToolArguments) -> Result<String> {
        let pattern = require_str(arguments, "pattern", "search_files")?;
        let regex = Regex::new(pattern)
            .map_err(|e| AdapterError::invalid("search_files", format!("invalid regex: {e}")))?;
        let start = self
            .workspace
            .resolve(optional_str(arguments, "path").unwrap_or("."))?;
        debug!(pattern, path = %start.display(), "searching files");

        let files = collect_files(&start).await?;
        let mut matches = Vec::new();
        let mut capped = false;
        'files: for file in &files {
            let Ok(content) = tokio::fs::read_to_string(file).await else {
                trace!(path = %file.display(), "skipping unreadable or non-UTF-8 file");
                continue;
            };
            for (lineno, line) in content.lines().enumerate() {
                if !regex.is_match(line) {
                    continue;
                }
                if matches.len() == MAX_SEARCH_MATCHES {
                    capped = true;
                    break 'files;
                }
                matches.push(format!(
                    "{}:{}: {}",
                    self.workspace.display(file),
                    lineno + 1,
                    clip_line(line.trim_end())
                ));
            }
        }

        if matches.is_empty() {
            return Ok(format!("No matches for `{pattern}`"));
        }
        let mut out = matches.join("\n");
        if capped {
            out.push_str(&format!(
                "\n[... results capped at {MAX_SEARCH_MATCHES} matches]"
            ));
        }
        Ok(out)
    }
}

fn clip_line(line: &str) -> String {
    match line.char_indices().nth(MAX_LINE_CHARS) {
        Some((end, _)) => format!("{}...", &line[..end]),
        None => line.to_owned(),
    }
}

fn is_skipped(name: &str) -> bool {
    name.starts_with('.') || SKIPPED_DIRS.contains(&name)
}

/// Every regular file at or below `start`, in sorted order.
async fn collect_files(start: &Path) -> Result<Vec<PathBuf>> {
    if tokio::fs::metadata(start).await?.is_file() {
        return Ok(vec![start.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut pending = vec![start.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) => {
                trace!(path = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };
        let mut children = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name();
            if is_skipped(&name.to_string_lossy()) {
                continue;
            }
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                children.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
        // Reverse so the stack pops subdirectories in name order.
        children.sort();
        pending.extend(children.into_iter().rev());
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn schema(&self) -> ChatTool {
        ChatTool {
            name: "search_files".into(),
            description: format!(
                "Search file contents with a regular expression. Returns `path:line: text` for each match, at most {MAX_SEARCH_MATCHES}. Hidden files, `target` and `node_modules` are skipped"
            ),
            parameters: json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Regular expression to search for" },
                    "path": { "type": "string", "description": "File or directory to search (default: the root directory)" }
                },
                "required": ["pattern"]
            }),
        }
    }

    async fn execute(&self, arguments: &ToolArguments) -> std::result::Result<String, ToolError> {
        Ok(self.run(arguments).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: serde_json::Value) -> ToolArguments {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("unexpected: {other:?}"),
        }
    }

    fn tree() -> (tempfile::TempDir, SearchFilesTool) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/nested")).unwrap();
        std::fs::create_dir_all(root.join("target/debug")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("src/main.rs"), "fn main() {\n    run();\n}\n").unwrap();
        std::fs::write(root.join("src/nested/lib.rs"), "pub fn run() {}\n").unwrap();
        std::fs::write(root.join("target/debug/out.rs"), "fn run() {}\n").unwrap();
        std::fs::write(root.join(".git/config"), "run = true\n").unwrap();
        let tool = SearchFilesTool::new(Workspace::new(root));
        (dir, tool)
    }

    #[tokio::test]
    async fn finds_matches_with_line_numbers() {
        let (_dir, tool) = tree();
        let out = tool.execute(&args(json!({"pattern": r"run\("}))).await.unwrap();
        assert_eq!(out, "src/main.rs:2:     run();\nsrc/nested/lib.rs:1: pub fn run() {}");
    }

    #[tokio::test]
    async fn narrows_to_a_path() {
        let (_dir, tool) = tree();
        let out = tool
            .execute(&args(json!({"pattern": "fn", "path": "src/nested"})))
            .await
            .unwrap();
        assert_eq!(out, "src/nested/lib.rs:1: pub fn run() {}");

        let out = tool
            .execute(&args(json!({"pattern": "fn", "path": "src/main.rs"})))
            .await
            .unwrap();
        assert_eq!(out, "src/main.rs:1: fn main() {");
    }

    #[tokio::test]
    async fn reports_no_matches() {
        let (_dir, tool) = tree();
        let out = tool.execute(&args(json!({"pattern": "zzz"}))).await.unwrap();
        assert_eq!(out, "No matches for `zzz`");
    }

    #[tokio::test]
    async fn rejects_invalid_regex() {
        let (_dir, tool) = tree();
        let err = tool.execute(&args(json!({"pattern": "("}))).await.unwrap_err();
        assert!(err.message().contains("invalid regex"));
    }

    #[tokio::test]
    async fn caps_results() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("many.txt"), "hit\n".repeat(MAX_SEARCH_MATCHES + 50)).unwrap();
        let tool = SearchFilesTool::new(Workspace::new(dir.path()));

        let out = tool.execute(&args(json!({"pattern": "hit"}))).await.unwrap();
        assert_eq!(out.lines().filter(|l| l.starts_with("many.txt:")).count(), MAX_SEARCH_MATCHES);
        assert!(out.ends_with("[... results capped at 200 matches]"));
    }
}
