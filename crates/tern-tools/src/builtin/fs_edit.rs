// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::{require_str, unified_diff};
use crate::tool::{need_confirm_arg, Tool, ToolCall, ToolOutput};

/// Search/replace file editor.
///
/// Each edit replaces one occurrence of `old` with `new`. An `old` string
/// that is absent or ambiguous (more than one occurrence) rejects the whole
/// edit batch so the file is never left half-patched.
pub struct EditFileTool;

fn apply_edits(original: &str, edits: &[(String, String)]) -> Result<String, String> {
    let mut text = original.to_string();
    for (i, (old, new)) in edits.iter().enumerate() {
        let count = text.matches(old.as_str()).count();
        if count == 0 {
            return Err(format!("edit {}: search text not found in file", i + 1));
        }
        if count > 1 {
            return Err(format!(
                "edit {}: search text matches {count} locations; add surrounding \
                 context to make it unique",
                i + 1
            ));
        }
        text = text.replacen(old.as_str(), new, 1);
    }
    Ok(text)
}

fn parse_edits(args: &Value) -> Result<Vec<(String, String)>, String> {
    let list = args
        .get("edits")
        .and_then(|v| v.as_array())
        .ok_or("missing required parameter 'edits'")?;
    if list.is_empty() {
        return Err("'edits' must contain at least one entry".into());
    }
    list.iter()
        .enumerate()
        .map(|(i, e)| {
            let old = e
                .get("old")
                .and_then(|v| v.as_str())
                .ok_or(format!("edit {}: missing 'old'", i + 1))?;
            let new = e
                .get("new")
                .and_then(|v| v.as_str())
                .ok_or(format!("edit {}: missing 'new'", i + 1))?;
            Ok((old.to_string(), new.to_string()))
        })
        .collect()
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit an existing file by replacing exact text. 'edits' is a list of \
         {old, new} pairs; each 'old' must match exactly one location in the \
         file (include surrounding lines to disambiguate). All edits apply \
         atomically or not at all."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to edit"
                },
                "edits": {
                    "type": "array",
                    "description": "Ordered list of replacements",
                    "items": {
                        "type": "object",
                        "properties": {
                            "old": { "type": "string", "description": "Exact text to replace" },
                            "new": { "type": "string", "description": "Replacement text" }
                        },
                        "required": ["old", "new"]
                    }
                },
                "need_confirm": {
                    "type": "boolean",
                    "description": "Ask the user before applying (default true)",
                    "default": true
                }
            },
            "required": ["path", "edits"]
        })
    }

    fn needs_confirmation(&self, args: &Value) -> bool {
        need_confirm_arg(args)
    }

    async fn confirm_preview(&self, args: &Value) -> String {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("?");
        let Ok(old) = tokio::fs::read_to_string(path).await else {
            return format!("edit_file: cannot read {path}");
        };
        let Ok(edits) = parse_edits(args) else {
            return format!("edit_file: malformed edits for {path}");
        };
        match apply_edits(&old, &edits) {
            Ok(new) => unified_diff(path, &old, &new),
            Err(e) => format!("edit_file: {e}"),
        }
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match require_str(&call.args, "path") {
            Ok(p) => p.to_string(),
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let edits = match parse_edits(&call.args) {
            Ok(e) => e,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        debug!(path = %path, edit_count = edits.len(), "edit_file tool");

        let original = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let updated = match apply_edits(&original, &edits) {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        match tokio::fs::write(&path, &updated).await {
            Ok(_) => ToolOutput::ok(
                &call.id,
                format!("applied {} edit(s) to {path}", edits.len()),
            ),
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
            id: "e1".into(),
            name: "edit_file".into(),
            args,
        }
    }

    #[tokio::test]
    async fn single_edit_applies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "alpha\nbeta\ngamma\n").unwrap();
        let out = EditFileTool
            .execute(&call(json!({
                "path": path.to_str().unwrap(),
                "edits": [{"old": "beta", "new": "delta"}]
            })))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "alpha\ndelta\ngamma\n"
        );
    }

    #[tokio::test]
    async fn ambiguous_edit_rejects_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "x\nx\n").unwrap();
        let out = EditFileTool
            .execute(&call(json!({
                "path": path.to_str().unwrap(),
                "edits": [{"old": "x", "new": "y"}]
            })))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("2 locations"));
        // File untouched.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "x\nx\n");
    }

    #[tokio::test]
    async fn missing_search_text_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "content\n").unwrap();
        let out = EditFileTool
            .execute(&call(json!({
                "path": path.to_str().unwrap(),
                "edits": [{"old": "absent", "new": "y"}]
            })))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("not found"));
    }

    #[tokio::test]
    async fn sequential_edits_see_earlier_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "one\n").unwrap();
        let out = EditFileTool
            .execute(&call(json!({
                "path": path.to_str().unwrap(),
                "edits": [
                    {"old": "one", "new": "two"},
                    {"old": "two", "new": "three"}
                ]
            })))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "three\n");
    }

    #[tokio::test]
    async fn preview_renders_unified_diff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "old\n").unwrap();
        let preview = EditFileTool
            .confirm_preview(&json!({
                "path": path.to_str().unwrap(),
                "edits": [{"old": "old", "new": "new"}]
            }))
            .await;
        assert!(preview.contains("-old"));
        assert!(preview.contains("+new"));
    }
}
