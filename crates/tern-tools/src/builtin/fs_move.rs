// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::require_str;
use crate::tool::{need_confirm_arg, Tool, ToolCall, ToolOutput};

fn move_copy_schema(verb: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "source": { "type": "string", "description": "Existing path" },
            "destination": { "type": "string", "description": format!("Path to {verb} to") },
            "need_confirm": {
                "type": "boolean",
                "description": "Ask the user before the operation (default true)",
                "default": true
            }
        },
        "required": ["source", "destination"]
    })
}

pub struct MoveTool;

#[async_trait]
impl Tool for MoveTool {
    fn name(&self) -> &str {
        "move"
    }

    fn description(&self) -> &str {
        "Move or rename a file or directory. Parent directories of the \
         destination are created automatically."
    }

    fn parameters_schema(&self) -> Value {
        move_copy_schema("move")
    }

    fn needs_confirmation(&self, args: &Value) -> bool {
        need_confirm_arg(args)
    }

    async fn confirm_preview(&self, args: &Value) -> String {
        let src = args.get("source").and_then(|v| v.as_str()).unwrap_or("?");
        let dst = args
            .get("destination")
            .and_then(|v| v.as_str())
            .unwrap_or("?");
        format!("move: {src} -> {dst}")
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (src, dst) = match (
            require_str(&call.args, "source"),
            require_str(&call.args, "destination"),
        ) {
            (Ok(s), Ok(d)) => (s.to_string(), d.to_string()),
            (Err(e), _) | (_, Err(e)) => return ToolOutput::err(&call.id, e),
        };
        debug!(src = %src, dst = %dst, "move tool");
        if let Some(parent) = std::path::Path::new(&dst).parent() {
            if !parent.as_os_str().is_empty() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
        }
        match tokio::fs::rename(&src, &dst).await {
            Ok(_) => ToolOutput::ok(&call.id, format!("moved {src} to {dst}")),
            Err(e) => ToolOutput::err(&call.id, format!("move error: {e}")),
        }
    }
}

pub struct CopyTool;

#[async_trait]
impl Tool for CopyTool {
    fn name(&self) -> &str {
        "copy"
    }

    fn description(&self) -> &str {
        "Copy a file. Parent directories of the destination are created \
         automatically; directories are not copied."
    }

    fn parameters_schema(&self) -> Value {
        move_copy_schema("copy")
    }

    fn needs_confirmation(&self, args: &Value) -> bool {
        need_confirm_arg(args)
    }

    async fn confirm_preview(&self, args: &Value) -> String {
        let src = args.get("source").and_then(|v| v.as_str()).unwrap_or("?");
        let dst = args
            .get("destination")
            .and_then(|v| v.as_str())
            .unwrap_or("?");
        format!("copy: {src} -> {dst}")
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (src, dst) = match (
            require_str(&call.args, "source"),
            require_str(&call.args, "destination"),
        ) {
            (Ok(s), Ok(d)) => (s.to_string(), d.to_string()),
            (Err(e), _) | (_, Err(e)) => return ToolOutput::err(&call.id, e),
        };
        debug!(src = %src, dst = %dst, "copy tool");
        if let Some(parent) = std::path::Path::new(&dst).parent() {
            if !parent.as_os_str().is_empty() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
        }
        match tokio::fs::copy(&src, &dst).await {
            Ok(bytes) => ToolOutput::ok(&call.id, format!("copied {src} to {dst} ({bytes} bytes)")),
            Err(e) => ToolOutput::err(&call.id, format!("copy error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn move_renames_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("nested/b.txt");
        std::fs::write(&src, "payload").unwrap();
        let out = MoveTool
            .execute(&ToolCall {
                id: "m1".into(),
                name: "move".into(),
                args: json!({
                    "source": src.to_str().unwrap(),
                    "destination": dst.to_str().unwrap()
                }),
            })
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(!src.exists());
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "payload");
    }

    #[tokio::test]
    async fn copy_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        std::fs::write(&src, "payload").unwrap();
        let out = CopyTool
            .execute(&ToolCall {
                id: "c1".into(),
                name: "copy".into(),
                args: json!({
                    "source": src.to_str().unwrap(),
                    "destination": dst.to_str().unwrap()
                }),
            })
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(src.exists());
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "payload");
    }

    #[tokio::test]
    async fn move_missing_source_is_error() {
        let out = MoveTool
            .execute(&ToolCall {
                id: "m1".into(),
                name: "move".into(),
                args: json!({
                    "source": "/tmp/tern_missing_source_file",
                    "destination": "/tmp/tern_missing_dest"
                }),
            })
            .await;
        assert!(out.is_error);
    }
}
