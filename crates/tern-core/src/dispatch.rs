// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool dispatcher: one tool call in, exactly one tool message out.
//!
//! Every failure mode — undecodable arguments, unknown names, denied
//! confirmations, tool errors — still produces a tool message, so the
//! call/result pairing invariant holds no matter what. Only control-flow
//! signals (switch-agent, user-cancel) additionally surface to the caller.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use tern_model::{Message, ToolCallRecord};
use tern_tools::{ProgressKind, Tool, ToolCall, ToolRegistry, ToolSignal};

use crate::status::{NotificationBus, NotifyData, StreamStatus, UserDecision};

/// Body of the tool message recorded when the user rejects a confirmation.
pub const OPERATION_CANCELLED: &str =
    "Based on your request, the OPERATION is CANCELLED. The file or operation \
     is unchanged; do not retry without new instructions from the user.";

/// Argument keys hidden from the function-calling announcement; their values
/// are bulky (file bodies, edit lists) and the UI renders them via the diff
/// preview instead.
const BULKY_ARG_KEYS: &[&str] = &["content", "edits", "memories"];

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    auto_approve: bool,
    confirm_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, auto_approve: bool, confirm_timeout: Duration) -> Self {
        Self {
            registry,
            auto_approve,
            confirm_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute one tool call and return its tool message.
    ///
    /// The second tuple element carries a control-flow signal when the tool
    /// raised one; the caller records the message first, then propagates.
    pub async fn execute_one(
        &self,
        call: &ToolCallRecord,
        bus: &mut NotificationBus,
    ) -> anyhow::Result<(Message, Option<ToolSignal>)> {
        // Decode arguments. Failure is the model's problem, reported back as
        // a tool result so it can correct itself.
        let args: Value = match serde_json::from_str(&call.arguments) {
            Ok(v) => v,
            Err(e) => {
                return Ok((
                    Message::tool(&call.id, format!("Error: invalid tool arguments: {e}")),
                    None,
                ));
            }
        };

        let Some(tool) = self.registry.get(&call.name) else {
            return Ok((
                Message::tool(&call.id, format!("Unknown function '{}'", call.name)),
                None,
            ));
        };

        let (opening, closing) = match tool.progress_kind() {
            ProgressKind::Search => (StreamStatus::Searching, StreamStatus::SearchingOver),
            ProgressKind::FunctionCall => {
                (StreamStatus::FunctionCalling, StreamStatus::FunctionCallingOver)
            }
        };

        bus.change_to(
            opening,
            Some(NotifyData::FunctionCall {
                function: call.name.clone(),
                args: filter_bulky_args(&args),
            }),
        )
        .await?;

        if tool.needs_confirmation(&args) && !self.auto_approve {
            let decision = self.confirm(tool.as_ref(), &args, bus).await?;
            if decision != UserDecision::Approve {
                debug!(tool = %call.name, ?decision, "operation rejected");
                bus.change_to(closing, None).await?;
                let body = match decision {
                    UserDecision::Timeout => {
                        format!("{OPERATION_CANCELLED} (confirmation timed out)")
                    }
                    _ => OPERATION_CANCELLED.to_string(),
                };
                return Ok((Message::tool(&call.id, body), None));
            }
        }

        debug!(tool = %call.name, id = %call.id, "executing tool");
        let output = tool
            .execute(&ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                args,
            })
            .await;

        bus.change_to(closing, None).await?;

        Ok((Message::tool(&call.id, output.content), output.signal))
    }

    /// Run the confirmation rendezvous for a guarded operation.
    async fn confirm(
        &self,
        tool: &dyn Tool,
        args: &Value,
        bus: &mut NotificationBus,
    ) -> anyhow::Result<UserDecision> {
        let preview = tool.confirm_preview(args).await;
        bus.change_to(StreamStatus::DiffConfirm, Some(NotifyData::Diff(preview)))
            .await?;
        let decision = bus.await_decision(self.confirm_timeout).await;
        bus.change_to(StreamStatus::DiffConfirmOver, None).await?;
        Ok(decision)
    }
}

/// Replace bulky argument values with a size placeholder for announcements.
fn filter_bulky_args(args: &Value) -> Value {
    let Value::Object(map) = args else {
        return args.clone();
    };
    let filtered = map
        .iter()
        .map(|(k, v)| {
            if BULKY_ARG_KEYS.contains(&k.as_str()) {
                let size = match v {
                    Value::String(s) => s.len(),
                    other => other.to_string().len(),
                };
                (k.clone(), Value::String(format!("[{size} bytes hidden]")))
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect();
    Value::Object(filtered)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
