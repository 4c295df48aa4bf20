//! The root directory every tool operates under.
//!
//! Tool paths are resolved relative to the root and normalized lexically
//! (the target may not exist yet), then rejected if they leave it.

use std::path::{Component, Path, PathBuf};

use codeloop_agent::ToolArguments;

use crate::error::{AdapterError, Result};

/// A canonical tool root.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Anchor tools at `root`.  The root is canonicalized when it exists and
    /// made absolute otherwise.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root
            .canonicalize()
            .or_else(|_| std::path::absolute(&root))
            .unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tool-supplied path against the root.
    pub fn resolve(&self, raw_path: &str) -> Result<PathBuf> {
        let candidate = if Path::new(raw_path).is_absolute() {
            PathBuf::from(raw_path)
        } else {
            self.root.join(raw_path)
        };
        let normalized = normalize_path(&candidate);

        if !normalized.starts_with(&self.root) {
            return Err(AdapterError::OutsideRoot {
                path: raw_path.to_owned(),
                root: self.root.display().to_string(),
            });
        }
        Ok(normalized)
    }

    /// `path` relative to the root, for display.  Falls back to the full path.
    pub fn display(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_owned(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                } else if !matches!(components.last(), Some(Component::RootDir)) {
                    components.push(component);
                }
            }
            Component::CurDir => {}
            _ => components.push(component),
        }
    }
    components.iter().collect()
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

/// A required string argument.
pub(crate) fn require_str<'a>(
    arguments: &'a ToolArguments,
    field: &str,
    tool_name: &str,
) -> Result<&'a str> {
    arguments
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            AdapterError::invalid(tool_name, format!("missing required string field `{field}`"))
        })
}

/// An optional string argument.  Empty strings count as absent.
pub(crate) fn optional_str<'a>(arguments: &'a ToolArguments, field: &str) -> Option<&'a str> {
    arguments
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}
