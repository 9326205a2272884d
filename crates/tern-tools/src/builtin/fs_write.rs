// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::{require_str, unified_diff};
use crate::tool::{need_confirm_arg, Tool, ToolCall, ToolOutput};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, overwriting any existing content. \
         Creates parent directories automatically. \
         Prefer edit_file for changes to existing files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                },
                "need_confirm": {
                    "type": "boolean",
                    "description": "Ask the user before writing (default true)",
                    "default": true
                }
            },
            "required": ["path", "content"]
        })
    }

    fn needs_confirmation(&self, args: &Value) -> bool {
        need_confirm_arg(args)
    }

    async fn confirm_preview(&self, args: &Value) -> String {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("?");
        let new = args.get("content").and_then(|v| v.as_str()).unwrap_or("");
        let old = tokio::fs::read_to_string(path).await.unwrap_or_default();
        unified_diff(path, &old, new)
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match require_str(&call.args, "path") {
            Ok(p) => p.to_string(),
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let content = match require_str(&call.args, "content") {
            Ok(c) => c.to_string(),
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        debug!(path = %path, bytes = content.len(), "write_file tool");

        if let Some(parent) = std::path::Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
        }

        match tokio::fs::write(&path, &content).await {
            Ok(_) => ToolOutput::ok(&call.id, format!("wrote {} bytes to {path}", content.len())),
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "w1".into(),
            name: "write_file".into(),
            args,
        }
    }

    #[tokio::test]
    async fn write_creates_file_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/file.txt");
        let out = WriteFileTool
            .execute(&call(json!({
                "path": path.to_str().unwrap(),
                "content": "hello"
            })))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn missing_path_is_error() {
        let out = WriteFileTool.execute(&call(json!({"content": "x"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("'path'"));
    }

    #[tokio::test]
    async fn preview_is_a_diff_against_current_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "old line\n").unwrap();
        let preview = WriteFileTool
            .confirm_preview(&json!({
                "path": path.to_str().unwrap(),
                "content": "new line\n"
            }))
            .await;
        assert!(preview.contains("-old line"));
        assert!(preview.contains("+new line"));
    }

    #[test]
    fn confirmation_follows_need_confirm_arg() {
        assert!(WriteFileTool.needs_confirmation(&json!({})));
        assert!(!WriteFileTool.needs_confirmation(&json!({"need_confirm": false})));
    }
}
