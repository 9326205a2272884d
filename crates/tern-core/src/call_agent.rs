// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tern_tools::{Tool, ToolCall, ToolOutput};

use crate::orchestrator::{render_summary, Orchestrator, TaskSpec};

const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Fan a batch of tasks out to sub-agents and wait for the results.
///
/// Registered on the main agent only — sub-agents cannot nest further
/// fan-outs.
pub struct CallAgentTool {
    orchestrator: Arc<Orchestrator>,
    cancel: CancellationToken,
}

impl CallAgentTool {
    pub fn new(orchestrator: Arc<Orchestrator>, cancel: CancellationToken) -> Self {
        Self {
            orchestrator,
            cancel,
        }
    }
}

#[async_trait]
impl Tool for CallAgentTool {
    fn name(&self) -> &str {
        "call_agent"
    }

    fn description(&self) -> &str {
        "Run a batch of tasks on sub-agents, in parallel where dependencies \
         allow. Each task names an agent profile and an instruction; \
         input_keys lists earlier task_keys whose outputs the task consumes \
         (they are prepended to its instruction). Outputs are stored in the \
         shared state under each task_key; the return value is only a \
         progress summary — read full results with get_state."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "description": "Task nodes, in dependency order",
                    "items": {
                        "type": "object",
                        "properties": {
                            "task_key": {
                                "type": "string",
                                "description": "Unique key; also the output key in shared state"
                            },
                            "agent_name": {
                                "type": "string",
                                "description": "Agent profile that runs this task"
                            },
                            "instruction": {
                                "type": "string",
                                "description": "What the sub-agent should do"
                            },
                            "input_keys": {
                                "type": "array",
                                "items": { "type": "string" },
                                "description": "Earlier task_keys whose outputs this task needs"
                            },
                            "wait_for_all": {
                                "type": "boolean",
                                "description": "Start only after every earlier task finished",
                                "default": false
                            }
                        },
                        "required": ["task_key", "agent_name", "instruction"]
                    }
                },
                "timeout_s": {
                    "type": "integer",
                    "description": "Wall-clock budget for the whole batch in seconds (default 300)",
                    "default": 300
                }
            },
            "required": ["tasks"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(tasks) = call.args.get("tasks") else {
            return ToolOutput::err(&call.id, "missing required parameter 'tasks'");
        };
        let specs: Vec<TaskSpec> = match serde_json::from_value(tasks.clone()) {
            Ok(s) => s,
            Err(e) => return ToolOutput::err(&call.id, format!("malformed tasks: {e}")),
        };
        let timeout = call
            .args
            .get("timeout_s")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        debug!(task_count = specs.len(), timeout, "call_agent tool");

        match self
            .orchestrator
            .run_batch(specs, Duration::from_secs(timeout), &self.cancel)
            .await
        {
            Ok(reports) => ToolOutput::ok(&call.id, render_summary(&reports)),
            Err(e) => ToolOutput::err(&call.id, format!("invalid task batch: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use tern_config::{AgentConfig, AgentProfile, ModelProfile, ToolsConfig};
    use tern_tools::SharedState;

    use super::*;

    fn tool() -> CallAgentTool {
        let mut profiles = HashMap::new();
        profiles.insert("worker".to_string(), AgentProfile::default());
        let orch = Arc::new(Orchestrator::new(
            profiles,
            ModelProfile {
                provider: "mock".into(),
                name: "mock-model".into(),
                ..Default::default()
            },
            Arc::new(AgentConfig {
                artifacts_dir: Some(
                    std::env::temp_dir()
                        .join("tern-call-agent-test")
                        .to_string_lossy()
                        .into_owned(),
                ),
                ..Default::default()
            }),
            ToolsConfig::default(),
            Arc::new(SharedState::new()),
        ));
        CallAgentTool::new(orch, CancellationToken::new())
    }

    #[tokio::test]
    async fn batch_returns_summary_not_outputs() {
        let t = tool();
        let out = t
            .execute(&ToolCall {
                id: "ca1".into(),
                name: "call_agent".into(),
                args: json!({
                    "tasks": [
                        {"task_key": "a", "agent_name": "worker", "instruction": "first"},
                        {"task_key": "b", "agent_name": "worker", "instruction": "second",
                         "input_keys": ["a"]}
                    ]
                }),
            })
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("2 task(s)"));
        assert!(out.content.contains("get_state"));
        // The summary carries status lines, not the sub-agent outputs.
        assert!(!out.content.contains("MOCK:"));
    }

    #[tokio::test]
    async fn cyclic_batch_is_rejected() {
        let t = tool();
        let out = t
            .execute(&ToolCall {
                id: "ca1".into(),
                name: "call_agent".into(),
                args: json!({
                    "tasks": [
                        {"task_key": "a", "agent_name": "worker", "instruction": "x",
                         "input_keys": ["a"]}
                    ]
                }),
            })
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("invalid task batch"));
    }

    #[tokio::test]
    async fn missing_tasks_is_error() {
        let t = tool();
        let out = t
            .execute(&ToolCall {
                id: "ca1".into(),
                name: "call_agent".into(),
                args: json!({}),
            })
            .await;
        assert!(out.is_error);
    }
}
