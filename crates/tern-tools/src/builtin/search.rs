// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::builtin::require_str;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Cap on reported matches so a loose pattern cannot flood the context.
const MAX_MATCHES: usize = 200;

pub struct SearchFilesTool;

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Recursively find files whose name contains the given pattern \
         (case-insensitive substring). Hidden directories and common build \
         output are skipped. Returns at most 200 paths."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Root directory to search" },
                "pattern": { "type": "string", "description": "Substring to match in file names" }
            },
            "required": ["path", "pattern"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (root, pattern) = match (
            require_str(&call.args, "path"),
            require_str(&call.args, "pattern"),
        ) {
            (Ok(r), Ok(p)) => (r.to_string(), p.to_lowercase()),
            (Err(e), _) | (_, Err(e)) => return ToolOutput::err(&call.id, e),
        };
        debug!(root = %root, pattern = %pattern, "search_files tool");

        // walkdir is synchronous; run the traversal on the blocking pool.
        let result = tokio::task::spawn_blocking(move || {
            let mut hits = Vec::new();
            for entry in WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| !is_skipped_dir(e))
                .filter_map(Result::ok)
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_lowercase();
                if name.contains(&pattern) {
                    hits.push(entry.path().display().to_string());
                    if hits.len() >= MAX_MATCHES {
                        break;
                    }
                }
            }
            hits
        })
        .await;

        match result {
            Ok(hits) if hits.is_empty() => ToolOutput::ok(&call.id, "no files matched"),
            Ok(hits) => ToolOutput::ok(&call.id, hits.join("\n")),
            Err(e) => ToolOutput::err(&call.id, format!("search task failed: {e}")),
        }
    }
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    // The search root itself is never filtered, whatever it is called.
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    (name.starts_with('.') && name.len() > 1) || name == "target" || name == "node_modules"
}

pub struct SearchTextTool;

#[async_trait]
impl Tool for SearchTextTool {
    fn name(&self) -> &str {
        "search_text_in_file"
    }

    fn description(&self) -> &str {
        "Search one file for a regular expression. Returns matching lines \
         prefixed with their 1-based line number, at most 200 matches."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to search" },
                "pattern": { "type": "string", "description": "Regular expression" }
            },
            "required": ["path", "pattern"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (path, pattern) = match (
            require_str(&call.args, "path"),
            require_str(&call.args, "pattern"),
        ) {
            (Ok(p), Ok(r)) => (p.to_string(), r.to_string()),
            (Err(e), _) | (_, Err(e)) => return ToolOutput::err(&call.id, e),
        };
        debug!(path = %path, pattern = %pattern, "search_text_in_file tool");

        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid pattern: {e}")),
        };

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let mut hits = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if re.is_match(line) {
                hits.push(format!("{}: {line}", i + 1));
                if hits.len() >= MAX_MATCHES {
                    hits.push(format!("...[stopped at {MAX_MATCHES} matches]"));
                    break;
                }
            }
        }

        if hits.is_empty() {
            ToolOutput::ok(&call.id, "no matches")
        } else {
            ToolOutput::ok(&call.id, hits.join("\n"))
        }
    }
}
