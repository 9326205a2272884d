// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::require_str;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Hard cap on bytes returned per file to protect the context window.
const READ_LIMIT_BYTES: usize = 100_000;

async fn read_one(path: &str) -> Result<String, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("read error: {e}"))?;
    let text = String::from_utf8_lossy(&bytes);
    if text.len() > READ_LIMIT_BYTES {
        let mut end = READ_LIMIT_BYTES;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        Ok(format!(
            "{}\n...[truncated: {} of {} bytes shown]",
            &text[..end],
            end,
            text.len()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file and return its content as text. Output is capped at \
         100 KB; larger files are truncated with a marker."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the file" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match require_str(&call.args, "path") {
            Ok(p) => p.to_string(),
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        debug!(path = %path, "read_file tool");
        match read_one(&path).await {
            Ok(text) => ToolOutput::ok(&call.id, text),
            Err(e) => ToolOutput::err(&call.id, e),
        }
    }
}

pub struct ReadMultipleFilesTool;

#[async_trait]
impl Tool for ReadMultipleFilesTool {
    fn name(&self) -> &str {
        "read_multiple_files"
    }

    fn description(&self) -> &str {
        "Read several files in one call. Each file's content is preceded by \
         a '=== <path> ===' header; unreadable files report their error \
         inline without failing the rest."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "paths": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Paths to read, in order"
                }
            },
            "required": ["paths"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(paths) = call.args.get("paths").and_then(|v| v.as_array()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'paths'");
        };
        if paths.is_empty() {
            return ToolOutput::err(&call.id, "'paths' must contain at least one entry");
        }

        let mut sections = Vec::with_capacity(paths.len());
        for p in paths {
            let Some(path) = p.as_str() else {
                sections.push("=== (non-string path) ===\n(skipped)".to_string());
                continue;
            };
            let body = match read_one(path).await {
                Ok(text) => text,
                Err(e) => format!("({e})"),
            };
            sections.push(format!("=== {path} ===\n{body}"));
        }
        ToolOutput::ok(&call.id, sections.join("\n\n"))
    }
}
