// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::require_str;
use crate::tool::{need_confirm_arg, Tool, ToolCall, ToolOutput};

pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a single file. Fails on directories; use delete_directory for those."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the file to delete" },
                "need_confirm": {
                    "type": "boolean",
                    "description": "Ask the user before deleting (default true)",
                    "default": true
                }
            },
            "required": ["path"]
        })
    }

    fn needs_confirmation(&self, args: &Value) -> bool {
        need_confirm_arg(args)
    }

    async fn confirm_preview(&self, args: &Value) -> String {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("?");
        format!("delete file: {path}")
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match require_str(&call.args, "path") {
            Ok(p) => p.to_string(),
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        debug!(path = %path, "delete_file tool");
        match tokio::fs::remove_file(&path).await {
            Ok(_) => ToolOutput::ok(&call.id, format!("deleted {path}")),
            Err(e) => ToolOutput::err(&call.id, format!("delete error: {e}")),
        }
    }
}

pub struct DeleteDirectoryTool;

#[async_trait]
impl Tool for DeleteDirectoryTool {
    fn name(&self) -> &str {
        "delete_directory"
    }

    fn description(&self) -> &str {
        "Delete a directory and everything underneath it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the directory to delete" },
                "need_confirm": {
                    "type": "boolean",
                    "description": "Ask the user before deleting (default true)",
                    "default": true
                }
            },
            "required": ["path"]
        })
    }

    fn needs_confirmation(&self, args: &Value) -> bool {
        need_confirm_arg(args)
    }

    async fn confirm_preview(&self, args: &Value) -> String {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("?");
        let count = std::fs::read_dir(path)
            .map(|rd| rd.count())
            .unwrap_or(0);
        format!("delete directory recursively: {path} ({count} direct entries)")
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match require_str(&call.args, "path") {
            Ok(p) => p.to_string(),
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        debug!(path = %path, "delete_directory tool");
        match tokio::fs::remove_dir_all(&path).await {
            Ok(_) => ToolOutput::ok(&call.id, format!("deleted directory {path}")),
            Err(e) => ToolOutput::err(&call.id, format!("delete error: {e}")),
        }
    }
}
