// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{need_confirm_arg, Tool, ToolCall, ToolOutput, ToolSignal};

/// A known agent profile, as shown by `list_agent`.
#[derive(Debug, Clone)]
pub struct AgentEntry {
    pub name: String,
    pub description: String,
}

fn render_profiles(profiles: &[AgentEntry]) -> String {
    if profiles.is_empty() {
        return "no agent profiles are configured".to_string();
    }
    profiles
        .iter()
        .map(|p| {
            if p.description.is_empty() {
                format!("- {}", p.name)
            } else {
                format!("- {}: {}", p.name, p.description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Hand the conversation to another agent profile.
///
/// The tool itself never switches anything: it returns a
/// [`ToolSignal::SwitchAgent`] that the dispatcher records as a tool result
/// and the agent loop propagates upward unwrapped.
pub struct SwitchAgentTool {
    profiles: Vec<AgentEntry>,
}

impl SwitchAgentTool {
    pub fn new(profiles: Vec<AgentEntry>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl Tool for SwitchAgentTool {
    fn name(&self) -> &str {
        "switch_agent"
    }

    fn description(&self) -> &str {
        "Switch the conversation to a different agent profile. Pass the \
         profile name, or 'list' to see the available profiles. An optional \
         'instruction' is handed to the new agent as its first task."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Target profile name, or 'list' to enumerate profiles"
                },
                "instruction": {
                    "type": "string",
                    "description": "Optional first instruction for the target agent"
                },
                "need_confirm": {
                    "type": "boolean",
                    "description": "Ask the user before switching (default true)",
                    "default": true
                }
            },
            "required": ["name"]
        })
    }

    fn needs_confirmation(&self, args: &Value) -> bool {
        // Listing profiles is read-only and never needs approval.
        if args.get("name").and_then(|v| v.as_str()) == Some("list") {
            return false;
        }
        need_confirm_arg(args)
    }

    async fn confirm_preview(&self, args: &Value) -> String {
        let name = args.get("name").and_then(|v| v.as_str()).unwrap_or("?");
        format!("switch conversation to agent '{name}'")
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(name) = call.args.get("name").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'name'");
        };

        if name == "list" {
            return ToolOutput::ok(&call.id, render_profiles(&self.profiles));
        }

        if !self.profiles.iter().any(|p| p.name == name) {
            return ToolOutput::err(
                &call.id,
                format!(
                    "unknown agent '{name}'; use switch_agent with name='list' \
                     to see available profiles"
                ),
            );
        }

        let instruction = call
            .args
            .get("instruction")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        debug!(target = %name, "switch_agent tool");
        ToolOutput::signal(
            &call.id,
            format!("switching to agent '{name}'"),
            ToolSignal::SwitchAgent {
                target: name.to_string(),
                instruction,
            },
        )
    }
}

/// Enumerate the configured agent profiles.
pub struct ListAgentTool {
    profiles: Vec<AgentEntry>,
}

impl ListAgentTool {
    pub fn new(profiles: Vec<AgentEntry>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl Tool for ListAgentTool {
    fn name(&self) -> &str {
        "list_agent"
    }

    fn description(&self) -> &str {
        "List the agent profiles available for switch_agent and call_agent."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        ToolOutput::ok(&call.id, render_profiles(&self.profiles))
    }
}
