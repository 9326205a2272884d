// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::require_str;
use crate::tool::{ProgressKind, Tool, ToolCall, ToolOutput};
use crate::Citations;
use crate::Reference;

const DEFAULT_MAX_CHARS: usize = 50_000;

pub struct WebFetchTool {
    pub max_chars: usize,
    citations: Citations,
}

impl WebFetchTool {
    pub fn new(max_chars: usize, citations: Citations) -> Self {
        Self {
            max_chars,
            citations,
        }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL and convert the content to readable text. HTML is \
         converted to plain text; other text content is returned as-is. \
         Content is limited to 50,000 characters by default. No \
         authentication; read-only."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "The URL to fetch (http or https)" },
                "max_chars": {
                    "type": "integer",
                    "description": "Maximum characters to return (default 50000)"
                }
            },
            "required": ["url"]
        })
    }

    fn progress_kind(&self) -> ProgressKind {
        ProgressKind::Search
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let url = match require_str(&call.args, "url") {
            Ok(u) => u.to_string(),
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let max_chars = call
            .args
            .get("max_chars")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(self.max_chars);

        debug!(url = %url, max_chars, "web_fetch tool");

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ToolOutput::err(&call.id, "only http and https URLs are supported");
        }

        match fetch_as_text(&url, max_chars).await {
            Ok(content) => {
                self.citations
                    .lock()
                    .expect("citation lock poisoned")
                    .references
                    .push(Reference {
                        title: url.clone(),
                        url,
                    });
                ToolOutput::ok(&call.id, content)
            }
            Err(e) => ToolOutput::err(&call.id, format!("fetch error: {e}")),
        }
    }
}

async fn fetch_as_text(url: &str, max_chars: usize) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(20))
        .user_agent("tern-agent/0.4")
        .build()?;

    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("HTTP {}", resp.status());
    }

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let body = resp.text().await?;

    let text = if content_type.contains("text/html") || looks_like_html(&body) {
        html2text::from_read(body.as_bytes(), 100)
    } else {
        body
    };

    Ok(truncate_chars(&text, max_chars))
}

fn looks_like_html(body: &str) -> bool {
    let head = &body[..body.len().min(512)];
    head.contains("<html") || head.contains("<!DOCTYPE") || head.contains("<!doctype")
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars).collect();
    format!("{truncated}\n...[truncated at {max_chars} characters]")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::CitationLog;

    fn tool() -> WebFetchTool {
        WebFetchTool::new(DEFAULT_MAX_CHARS, Arc::new(Mutex::new(CitationLog::default())))
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let out = tool()
            .execute(&ToolCall {
                id: "f1".into(),
                name: "web_fetch".into(),
                args: json!({"url": "file:///etc/passwd"}),
            })
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("http"));
    }

    #[tokio::test]
    async fn missing_url_is_error() {
        let out = tool()
            .execute(&ToolCall {
                id: "f1".into(),
                name: "web_fetch".into(),
                args: json!({}),
            })
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("'url'"));
    }

    #[test]
    fn truncate_chars_appends_marker() {
        let out = truncate_chars(&"x".repeat(100), 10);
        assert!(out.starts_with("xxxxxxxxxx"));
        assert!(out.contains("truncated at 10"));
    }

    #[test]
    fn truncate_chars_short_input_unchanged() {
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn html_detection_by_doctype() {
        assert!(looks_like_html("<!DOCTYPE html><html></html>"));
        assert!(!looks_like_html("plain text body"));
    }
}
