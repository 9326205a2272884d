// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use tern_config::SearchEngineConfig;

use crate::builtin::require_str;
use crate::tool::{ProgressKind, Tool, ToolCall, ToolOutput};

/// One search hit as returned by a [`SearchEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A source the agent consulted during the turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub title: String,
    pub url: String,
}

/// Queries issued and references consulted during one turn, collected for
/// end-of-turn citation rendering. Owned by the agent; web tools hold a
/// clone of the handle.
#[derive(Debug, Default)]
pub struct CitationLog {
    pub queries: Vec<String>,
    pub references: Vec<Reference>,
}

pub type Citations = Arc<Mutex<CitationLog>>;

/// Pluggable search backend.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str, count: usize) -> anyhow::Result<Vec<SearchResult>>;
}

/// Brave Search API backend.
pub struct BraveSearch {
    api_key: Option<String>,
}

impl BraveSearch {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }
}

#[async_trait]
impl SearchEngine for BraveSearch {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str, count: usize) -> anyhow::Result<Vec<SearchResult>> {
        let Some(api_key) = self.api_key.as_deref() else {
            anyhow::bail!(
                "no search API key configured; set tools.web.search.api_key \
                 or the configured environment variable"
            );
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("tern-agent/0.4")
            .build()?;

        let url = format!(
            "https://api.search.brave.com/res/v1/web/search?q={}&count={}",
            urlencode(query),
            count
        );
        let resp = client
            .get(&url)
            .header("Accept", "application/json")
            .header("Accept-Encoding", "gzip")
            .header("X-Subscription-Token", api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("search API returned status {}", resp.status());
        }

        let body: Value = resp.json().await?;
        let results = body
            .get("web")
            .and_then(|w| w.get("results"))
            .and_then(|r| r.as_array())
            .map(|arr| arr.as_slice())
            .unwrap_or(&[]);

        Ok(results
            .iter()
            .map(|r| SearchResult {
                title: r["title"].as_str().unwrap_or("(untitled)").to_string(),
                url: r["url"].as_str().unwrap_or("").to_string(),
                snippet: r["description"].as_str().unwrap_or("").to_string(),
            })
            .collect())
    }
}

/// Deterministic in-memory backend for tests.
#[derive(Default)]
pub struct MockSearch {
    pub results: Vec<SearchResult>,
}

#[async_trait]
impl SearchEngine for MockSearch {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, _query: &str, count: usize) -> anyhow::Result<Vec<SearchResult>> {
        Ok(self.results.iter().take(count).cloned().collect())
    }
}

/// Construct the configured search backend.
pub fn engine_from_config(cfg: &SearchEngineConfig) -> Arc<dyn SearchEngine> {
    match cfg.engine.as_str() {
        "mock" => Arc::new(MockSearch::default()),
        _ => Arc::new(BraveSearch::new(cfg.resolve_api_key())),
    }
}

pub struct WebSearchTool {
    engine: Arc<dyn SearchEngine>,
    citations: Citations,
}

impl WebSearchTool {
    pub fn new(engine: Arc<dyn SearchEngine>, citations: Citations) -> Self {
        Self { engine, citations }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Real-time web search. count: 1-10 (default 5). Include the current \
         year in queries for recent information. Cite sources after \
         answering."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "count": {
                    "type": "integer",
                    "description": "Number of results to return (default 5, max 10)"
                }
            },
            "required": ["query"]
        })
    }

    fn progress_kind(&self) -> ProgressKind {
        ProgressKind::Search
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let query = match require_str(&call.args, "query") {
            Ok(q) => q.to_string(),
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let count = call
            .args
            .get("count")
            .and_then(|v| v.as_u64())
            .unwrap_or(5)
            .clamp(1, 10) as usize;

        debug!(query = %query, count, engine = self.engine.name(), "web_search tool");

        match self.engine.search(&query, count).await {
            Ok(results) => {
                {
                    let mut log = self.citations.lock().expect("citation lock poisoned");
                    log.queries.push(query.clone());
                    for r in &results {
                        log.references.push(Reference {
                            title: r.title.clone(),
                            url: r.url.clone(),
                        });
                    }
                }
                if results.is_empty() {
                    return ToolOutput::ok(&call.id, format!("no results for '{query}'"));
                }
                let rendered: Vec<String> = results
                    .iter()
                    .enumerate()
                    .map(|(i, r)| {
                        format!("{}. {}\n   {}\n   {}", i + 1, r.title, r.url, r.snippet)
                    })
                    .collect();
                ToolOutput::ok(&call.id, rendered.join("\n"))
            }
            Err(e) => ToolOutput::err(&call.id, format!("search error: {e}")),
        }
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn mock_tool(results: Vec<SearchResult>) -> (WebSearchTool, Citations) {
        let citations: Citations = Arc::new(Mutex::new(CitationLog::default()));
        let tool = WebSearchTool::new(Arc::new(MockSearch { results }), Arc::clone(&citations));
        (tool, citations)
    }

    fn hit(n: u32) -> SearchResult {
        SearchResult {
            title: format!("Result {n}"),
            url: format!("https://example.com/{n}"),
            snippet: format!("snippet {n}"),
        }
    }

    #[tokio::test]
    async fn search_renders_numbered_results() {
        let (tool, _) = mock_tool(vec![hit(1), hit(2)]);
        let out = tool
            .execute(&ToolCall {
                id: "ws1".into(),
                name: "web_search".into(),
                args: json!({"query": "rust agents"}),
            })
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("1. Result 1"));
        assert!(out.content.contains("https://example.com/2"));
    }

    #[tokio::test]
    async fn search_records_queries_and_references() {
        let (tool, citations) = mock_tool(vec![hit(1)]);
        tool.execute(&ToolCall {
            id: "ws1".into(),
            name: "web_search".into(),
            args: json!({"query": "rust agents"}),
        })
        .await;
        let log = citations.lock().unwrap();
        assert_eq!(log.queries, vec!["rust agents"]);
        assert_eq!(log.references.len(), 1);
        assert_eq!(log.references[0].url, "https://example.com/1");
    }

    #[tokio::test]
    async fn count_is_clamped_to_ten() {
        let (tool, _) = mock_tool((0..20).map(hit).collect());
        let out = tool
            .execute(&ToolCall {
                id: "ws1".into(),
                name: "web_search".into(),
                args: json!({"query": "q", "count": 50}),
            })
            .await;
        assert!(out.content.contains("10. "));
        assert!(!out.content.contains("11. "));
    }

    #[tokio::test]
    async fn missing_query_is_error() {
        let (tool, _) = mock_tool(vec![]);
        let out = tool
            .execute(&ToolCall {
                id: "ws1".into(),
                name: "web_search".into(),
                args: json!({}),
            })
            .await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn brave_without_key_reports_configuration_error() {
        let engine = BraveSearch::new(None);
        let err = engine.search("q", 5).await.err().unwrap();
        assert!(err.to_string().contains("no search API key"));
    }

    #[test]
    fn urlencode_escapes_reserved_chars() {
        assert_eq!(urlencode("a b&c"), "a%20b%26c");
    }

    #[test]
    fn progress_kind_is_search() {
        let (tool, _) = mock_tool(vec![]);
        assert_eq!(tool.progress_kind(), ProgressKind::Search);
    }
}
