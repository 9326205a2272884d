// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Streaming state machine: assembles provider deltas into an assistant
//! message.
//!
//! The machine starts in the Normal state. The first non-empty reasoning
//! chunk opens the Reasoning status; a delta that carries content but no
//! reasoning closes it again. Tool-call fragments are stitched by id — a
//! fragment without an id continues the last call whose id was seen.
//! Fragment names that are neither enabled tools nor MCP tools are dropped
//! (some providers emit spurious names).

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use tern_model::{
    sanitize::{extract_think_block, sanitize_tool_arguments},
    DeltaStream, ToolCallRecord, UsageReport,
};

use crate::status::{NotificationBus, StreamStatus};

/// Everything one model call produced.
#[derive(Debug, Default)]
pub struct StreamOutcome {
    pub reasoning: Option<String>,
    /// Final text; always newline-terminated when non-empty.
    pub content: Option<String>,
    /// Stitched and sanitized calls, ordered by first appearance.
    pub tool_calls: Vec<ToolCallRecord>,
    pub usage: Option<UsageReport>,
    /// True when the caller's cancellation stopped the stream early. The
    /// partial message carries no tool calls — the machine never invents
    /// calls from incomplete fragments.
    pub cancelled: bool,
}

#[derive(Debug)]
struct PendingCall {
    id: String,
    name: String,
    args_buf: String,
}

/// Drain `stream`, driving the status bus and assembling the outcome.
///
/// `is_known_tool` decides which fragment names are dispatchable (enabled
/// registry tools plus MCP tools).
pub async fn collect_stream(
    mut stream: DeltaStream,
    bus: &mut NotificationBus,
    is_known_tool: &(dyn Fn(&str) -> bool + Send + Sync),
    cancel: &CancellationToken,
) -> anyhow::Result<StreamOutcome> {
    let mut outcome = StreamOutcome::default();
    let mut reasoning_buf = String::new();
    let mut content_buf = String::new();

    // Stitching state: calls in order of first appearance, indexed by id.
    let mut pending: Vec<PendingCall> = Vec::new();
    let mut last_id: Option<String> = None;
    let mut dropped_ids: Vec<String> = Vec::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                outcome.cancelled = true;
                break;
            }
            next = stream.next() => next,
        };

        let delta = match next {
            None => break,
            Some(Err(e)) => return Err(e.context("model stream failed")),
            Some(Ok(d)) => d,
        };

        let has_reasoning = delta.reasoning.as_deref().is_some_and(|r| !r.is_empty());
        let has_content = delta.content.as_deref().is_some_and(|c| !c.is_empty());

        if has_reasoning {
            // The stack top drives the Normal ⇄ Reasoning transitions.
            if bus.current_status() != Some(StreamStatus::Reasoning) {
                bus.change_to(StreamStatus::Reasoning, None).await?;
            }
            let chunk = delta.reasoning.as_deref().unwrap();
            reasoning_buf.push_str(chunk);
            bus.reasoning_data(chunk).await?;
        }

        if has_content {
            // A delta with content and no reasoning ends the reasoning
            // phase.
            if !has_reasoning && bus.current_status() == Some(StreamStatus::Reasoning) {
                bus.change_to(StreamStatus::ReasoningOver, None).await?;
            }
            let chunk = delta.content.as_deref().unwrap();
            content_buf.push_str(chunk);
            bus.data(chunk).await?;
        }

        for frag in &delta.tool_calls {
            if let Some(name) = frag.name.as_deref() {
                if !is_known_tool(name) {
                    warn!(tool = name, "dropping tool-call fragment with unknown name");
                    if let Some(id) = frag.id.as_deref() {
                        dropped_ids.push(id.to_string());
                        last_id = Some(id.to_string());
                    }
                    continue;
                }
            }

            // Stitch by id, falling back to the last id seen for
            // continuation fragments.
            let Some(key) = frag.id.clone().or_else(|| last_id.clone()) else {
                warn!("tool-call fragment before any id; ignoring");
                continue;
            };
            last_id = Some(key.clone());
            if dropped_ids.iter().any(|d| *d == key) {
                continue;
            }

            let idx = match pending.iter().position(|p| p.id == key) {
                Some(i) => i,
                None => {
                    pending.push(PendingCall {
                        id: key.clone(),
                        name: String::new(),
                        args_buf: String::new(),
                    });
                    pending.len() - 1
                }
            };
            let entry = &mut pending[idx];
            if let Some(name) = frag.name.as_deref() {
                if !name.is_empty() {
                    entry.name = name.to_string();
                }
            }
            entry.args_buf.push_str(&frag.arguments);
        }

        if let Some(usage) = delta.usage {
            outcome.usage = Some(usage);
        }

        if delta.finish {
            break;
        }
    }

    if bus.current_status() == Some(StreamStatus::Reasoning) {
        bus.change_to(StreamStatus::ReasoningOver, None).await?;
    }

    // Providers without a reasoning channel embed <think> blocks in the
    // content; rescue them into the reasoning field.
    if reasoning_buf.is_empty() {
        if let Some((rescued, rest)) = extract_think_block(&content_buf) {
            reasoning_buf = rescued;
            content_buf = rest;
        }
    }

    if !content_buf.is_empty() && !content_buf.ends_with('\n') {
        content_buf.push('\n');
    }

    if !outcome.cancelled {
        for (i, p) in pending.into_iter().enumerate() {
            if p.name.is_empty() {
                warn!(tool_call_id = %p.id, "dropping tool call that never received a name");
                continue;
            }
            let id = if p.id.is_empty() {
                format!("call_synth_{i}")
            } else {
                p.id
            };
            outcome.tool_calls.push(ToolCallRecord {
                id,
                name: p.name,
                arguments: sanitize_tool_arguments(&p.args_buf),
            });
        }
    }

    outcome.reasoning = (!reasoning_buf.is_empty()).then_some(reasoning_buf);
    outcome.content = (!content_buf.is_empty()).then_some(content_buf);
    Ok(outcome)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
