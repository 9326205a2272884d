// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::require_str;
use crate::tool::{Tool, ToolCall, ToolOutput};

fn default_memory_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tern/memory.md")
}

fn resolve_path(override_path: &Option<String>) -> PathBuf {
    override_path
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(default_memory_path)
}

/// Read the persistent memory file.
pub struct ListMemoryTool {
    /// Path override (falls back to ~/.config/tern/memory.md).
    pub memory_file: Option<String>,
}

#[async_trait]
impl Tool for ListMemoryTool {
    fn name(&self) -> &str {
        "list_memory"
    }

    fn description(&self) -> &str {
        "Return the complete content of the persistent memory file. The \
         memory survives across sessions."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = resolve_path(&self.memory_file);
        debug!(path = %path.display(), "list_memory tool");
        match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => ToolOutput::ok(&call.id, "(memory is empty)"),
            Ok(text) => ToolOutput::ok(&call.id, text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ToolOutput::ok(&call.id, "(memory is empty)")
            }
            Err(e) => ToolOutput::err(&call.id, format!("memory read error: {e}")),
        }
    }
}

/// Replace the persistent memory file.
///
/// `memories` is the complete replacement content, not an append — the model
/// is expected to pass back the full revised memory.
pub struct SaveMemoryTool {
    pub memory_file: Option<String>,
}

#[async_trait]
impl Tool for SaveMemoryTool {
    fn name(&self) -> &str {
        "save_memory"
    }

    fn description(&self) -> &str {
        "Replace the persistent memory file with the given content. \
         'memories' must be the COMPLETE new memory content; anything not \
         included is forgotten. Use list_memory first, then pass back the \
         full revised text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "memories": {
                    "type": "string",
                    "description": "Complete replacement content for the memory file"
                }
            },
            "required": ["memories"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let memories = match require_str(&call.args, "memories") {
            Ok(m) => m.to_string(),
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let path = resolve_path(&self.memory_file);
        debug!(path = %path.display(), bytes = memories.len(), "save_memory tool");

        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        match tokio::fs::write(&path, &memories).await {
            Ok(_) => ToolOutput::ok(
                &call.id,
                format!("memory saved ({} bytes)", memories.len()),
            ),
            Err(e) => ToolOutput::err(&call.id, format!("memory write error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn save_then_list_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.md");
        let path_str = path.to_str().unwrap().to_string();

        let save = SaveMemoryTool {
            memory_file: Some(path_str.clone()),
        };
        let out = save
            .execute(&ToolCall {
                id: "m1".into(),
                name: "save_memory".into(),
                args: json!({"memories": "- user prefers tabs"}),
            })
            .await;
        assert!(!out.is_error, "{}", out.content);

        let list = ListMemoryTool {
            memory_file: Some(path_str),
        };
        let out = list
            .execute(&ToolCall {
                id: "m2".into(),
                name: "list_memory".into(),
                args: json!({}),
            })
            .await;
        assert_eq!(out.content, "- user prefers tabs");
    }

    #[tokio::test]
    async fn list_missing_file_reports_empty() {
        let dir = tempfile::tempdir().unwrap();
        let list = ListMemoryTool {
            memory_file: Some(dir.path().join("absent.md").to_str().unwrap().into()),
        };
        let out = list
            .execute(&ToolCall {
                id: "m1".into(),
                name: "list_memory".into(),
                args: json!({}),
            })
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("empty"));
    }

    #[tokio::test]
    async fn save_replaces_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path_str = dir.path().join("memory.md").to_str().unwrap().to_string();
        let save = SaveMemoryTool {
            memory_file: Some(path_str.clone()),
        };
        for content in ["first version", "second version"] {
            save.execute(&ToolCall {
                id: "m".into(),
                name: "save_memory".into(),
                args: json!({"memories": content}),
            })
            .await;
        }
        let text = std::fs::read_to_string(&path_str).unwrap();
        assert_eq!(text, "second version");
    }
}
