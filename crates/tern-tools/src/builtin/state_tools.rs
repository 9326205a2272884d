// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::require_str;
use crate::state::SharedState;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Read one entry from the session's shared state.
pub struct GetStateTool {
    state: Arc<SharedState>,
}

impl GetStateTool {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Tool for GetStateTool {
    fn name(&self) -> &str {
        "get_state"
    }

    fn description(&self) -> &str {
        "Read a value from the shared session state. Sub-agent task outputs \
         are stored under their task keys."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": { "type": "string", "description": "State key to read" }
            },
            "required": ["key"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let key = match require_str(&call.args, "key") {
            Ok(k) => k,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        match self.state.get(key) {
            Some(entry) => ToolOutput::ok(&call.id, entry.value),
            None => ToolOutput::err(&call.id, format!("no state entry for key '{key}'")),
        }
    }
}

/// Write one entry into the session's shared state.
pub struct SetStateTool {
    state: Arc<SharedState>,
    /// Recorded as the entry creator.
    agent_name: String,
}

impl SetStateTool {
    pub fn new(state: Arc<SharedState>, agent_name: impl Into<String>) -> Self {
        Self {
            state,
            agent_name: agent_name.into(),
        }
    }
}

#[async_trait]
impl Tool for SetStateTool {
    fn name(&self) -> &str {
        "set_state"
    }

    fn description(&self) -> &str {
        "Store a value in the shared session state so other agents can read \
         it with get_state. Overwrites any existing value for the key."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": { "type": "string", "description": "State key to write" },
                "value": { "type": "string", "description": "Value to store" },
                "content_type": {
                    "type": "string",
                    "description": "Content hint such as text/plain or text/markdown",
                    "default": "text/plain"
                }
            },
            "required": ["key", "value"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let key = match require_str(&call.args, "key") {
            Ok(k) => k.to_string(),
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let value = match require_str(&call.args, "value") {
            Ok(v) => v.to_string(),
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let content_type = call
            .args
            .get("content_type")
            .and_then(|v| v.as_str())
            .unwrap_or("text/plain");

        debug!(key = %key, bytes = value.len(), "set_state tool");
        self.state.set(&key, &value, &self.agent_name, content_type);
        ToolOutput::ok(&call.id, format!("stored {} bytes under '{key}'", value.len()))
    }
}

/// Enumerate the shared state entries.
pub struct ListStateTool {
    state: Arc<SharedState>,
}

impl ListStateTool {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Tool for ListStateTool {
    fn name(&self) -> &str {
        "list_state"
    }

    fn description(&self) -> &str {
        "List the keys in the shared session state with creator and size. \
         Use get_state to read a value."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let entries = self.state.list();
        if entries.is_empty() {
            return ToolOutput::ok(&call.id, "shared state is empty");
        }
        let lines: Vec<String> = entries
            .into_iter()
            .map(|(key, creator, bytes, content_type)| {
                format!("- {key} ({content_type}, {bytes} bytes, by {creator})")
            })
            .collect();
        ToolOutput::ok(&call.id, lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn state() -> Arc<SharedState> {
        Arc::new(SharedState::new())
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let s = state();
        let set = SetStateTool::new(Arc::clone(&s), "main");
        let out = set
            .execute(&ToolCall {
                id: "s1".into(),
                name: "set_state".into(),
                args: json!({"key": "plan", "value": "step one"}),
            })
            .await;
        assert!(!out.is_error);

        let get = GetStateTool::new(s);
        let out = get
            .execute(&ToolCall {
                id: "s2".into(),
                name: "get_state".into(),
                args: json!({"key": "plan"}),
            })
            .await;
        assert_eq!(out.content, "step one");
    }

    #[tokio::test]
    async fn get_missing_key_is_error() {
        let out = GetStateTool::new(state())
            .execute(&ToolCall {
                id: "g1".into(),
                name: "get_state".into(),
                args: json!({"key": "absent"}),
            })
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("absent"));
    }

    #[tokio::test]
    async fn list_shows_creator_and_size() {
        let s = state();
        s.set("report", "12345", "worker-a", "text/markdown");
        let out = ListStateTool::new(s)
            .execute(&ToolCall {
                id: "l1".into(),
                name: "list_state".into(),
                args: json!({}),
            })
            .await;
        assert!(out.content.contains("report"));
        assert!(out.content.contains("worker-a"));
        assert!(out.content.contains("5 bytes"));
    }

    #[tokio::test]
    async fn list_empty_state() {
        let out = ListStateTool::new(state())
            .execute(&ToolCall {
                id: "l1".into(),
                name: "list_state".into(),
                args: json!({}),
            })
            .await;
        assert!(out.content.contains("empty"));
    }
}
