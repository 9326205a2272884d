// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Context window manager: token-aware truncation of the message list.
//!
//! Before each model call the estimated prompt size (messages + tool-schema
//! overhead) is compared against the model's window. While it overflows,
//! the earliest non-system message is dropped — and dropping an assistant
//! message that carries tool calls always drops its paired tool results in
//! the same step, so the call/result pairing is never broken. The system
//! message at index 0 and the latest message are never dropped.

use tern_model::{catalog, Message};
use tracing::debug;

/// Result of one fitting pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitOutcome {
    /// Everything already fit; nothing was dropped.
    Fitted,
    /// Old messages were dropped to make the prompt fit.
    Truncated { dropped: usize },
    /// Even the minimal message set overflows; the provider will surface
    /// the hard error.
    StillOverflowing { dropped: usize },
}

impl FitOutcome {
    pub fn truncated(&self) -> bool {
        !matches!(self, FitOutcome::Fitted)
    }
}

pub struct ContextWindowManager {
    model_id: String,
    /// Usable prompt budget in tokens.
    window_tokens: usize,
}

impl ContextWindowManager {
    pub fn new(model_id: impl Into<String>, window_tokens: usize) -> Self {
        Self {
            model_id: model_id.into(),
            window_tokens,
        }
    }

    /// Manager using the catalog window for `model_id`, reserving
    /// `max_output_tokens` for the completion.
    pub fn for_model(model_id: impl Into<String>, max_output_tokens: u32) -> Self {
        let model_id = model_id.into();
        let window = catalog::context_window(&model_id).saturating_sub(max_output_tokens) as usize;
        Self::new(model_id, window)
    }

    fn estimate(&self, messages: &[Message]) -> usize {
        let chars: usize = messages.iter().map(|m| m.approx_chars()).sum();
        catalog::estimate_tokens(&self.model_id, chars)
    }

    /// Reduce `messages` until the estimate (plus `overhead_tokens` for tool
    /// schemas) fits the window.
    pub fn fit(&self, messages: &mut Vec<Message>, overhead_tokens: usize) -> FitOutcome {
        let budget = self.window_tokens.saturating_sub(overhead_tokens);
        let mut dropped = 0usize;

        loop {
            if self.estimate(messages) <= budget {
                break;
            }
            if !drop_oldest(messages, &mut dropped) {
                // Nothing left that may be dropped.
                if dropped == 0 {
                    debug!(
                        model = %self.model_id,
                        "minimal message set exceeds the context window"
                    );
                    return FitOutcome::StillOverflowing { dropped };
                }
                return FitOutcome::StillOverflowing { dropped };
            }
        }

        if dropped == 0 {
            FitOutcome::Fitted
        } else {
            debug!(model = %self.model_id, dropped, "context truncated");
            FitOutcome::Truncated { dropped }
        }
    }
}

/// Drop the earliest droppable non-system message, preserving tool-call /
/// tool-result pairing. Returns false when nothing may be dropped (only the
/// system message and the latest message remain).
fn drop_oldest(messages: &mut Vec<Message>, dropped: &mut usize) -> bool {
    let start = usize::from(messages.first().is_some_and(Message::is_system));

    // The latest message (usually the new user prompt) is never dropped.
    if messages.len() <= start + 1 {
        return false;
    }

    let victim = messages.remove(start);
    *dropped += 1;

    // An assistant message with tool calls takes its tool results with it; a
    // tool message never outlives its originating call.
    let ids: Vec<&str> = victim.tool_calls().iter().map(|tc| tc.id.as_str()).collect();
    if !ids.is_empty() {
        let before = messages.len();
        messages.retain(|m| match m {
            Message::Tool { tool_call_id, .. } => !ids.contains(&tool_call_id.as_str()),
            _ => true,
        });
        *dropped += before - messages.len();
    }

    true
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use tern_model::{verify_pairing, ToolCallRecord};

    use super::*;

    fn call(id: &str) -> ToolCallRecord {
        ToolCallRecord {
            id: id.into(),
            name: "read_file".into(),
            arguments: r#"{"path":"/tmp/x"}"#.into(),
        }
    }

    fn conversation() -> Vec<Message> {
        vec![
            Message::system("sys"),
            Message::user("old ".repeat(100)),
            Message::assistant_full(None, None, vec![call("c1")]),
            Message::tool("c1", "listing ".repeat(100)),
            Message::assistant("earlier answer"),
            Message::user("latest question"),
        ]
    }

    #[test]
    fn fitted_when_window_is_large() {
        let mgr = ContextWindowManager::new("gpt-4o", 100_000);
        let mut msgs = conversation();
        assert_eq!(mgr.fit(&mut msgs, 0), FitOutcome::Fitted);
        assert_eq!(msgs.len(), 6);
    }

    #[test]
    fn truncation_drops_oldest_non_system_first() {
        let mgr = ContextWindowManager::new("gpt-4o", 260);
        let mut msgs = conversation();
        let outcome = mgr.fit(&mut msgs, 0);
        assert!(outcome.truncated());
        // System message survives at index 0.
        assert!(msgs[0].is_system());
        // The old user message went first.
        assert!(msgs.iter().all(|m| m.as_text() != Some("old ")));
    }

    #[test]
    fn dropping_assistant_with_calls_drops_paired_tool_messages() {
        let mgr = ContextWindowManager::new("gpt-4o", 40);
        let mut msgs = conversation();
        mgr.fit(&mut msgs, 0);
        // Pairing must hold whatever was dropped.
        verify_pairing(&msgs).unwrap();
        // The orphaned tool result cannot survive its assistant.
        let has_assistant_c1 = msgs.iter().any(|m| m.tool_calls().iter().any(|c| c.id == "c1"));
        let has_tool_c1 = msgs
            .iter()
            .any(|m| matches!(m, Message::Tool { tool_call_id, .. } if tool_call_id == "c1"));
        assert_eq!(has_assistant_c1, has_tool_c1);
    }

    #[test]
    fn latest_message_is_never_dropped() {
        let mgr = ContextWindowManager::new("gpt-4o", 1);
        let mut msgs = conversation();
        let outcome = mgr.fit(&mut msgs, 0);
        assert!(matches!(outcome, FitOutcome::StillOverflowing { .. }));
        assert!(msgs
            .iter()
            .any(|m| m.as_text() == Some("latest question")));
    }

    #[test]
    fn overflow_with_only_system_and_user_reports_still_overflowing() {
        let mgr = ContextWindowManager::new("gpt-4o", 2);
        let mut msgs = vec![
            Message::system("s".repeat(100)),
            Message::user("u".repeat(100)),
        ];
        let outcome = mgr.fit(&mut msgs, 0);
        assert!(matches!(outcome, FitOutcome::StillOverflowing { dropped: 0 }));
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn schema_overhead_counts_against_budget() {
        let mgr = ContextWindowManager::new("gpt-4o", 1000);
        let mut msgs = conversation();
        // Without overhead it fits; with a huge overhead it must truncate.
        assert_eq!(mgr.fit(&mut msgs.clone(), 0), FitOutcome::Fitted);
        assert!(mgr.fit(&mut msgs, 900).truncated());
    }

    #[test]
    fn for_model_reserves_output_tokens() {
        let mgr = ContextWindowManager::for_model("gpt-4o", 16_384);
        assert_eq!(mgr.window_tokens, 128_000 - 16_384);
    }
}
