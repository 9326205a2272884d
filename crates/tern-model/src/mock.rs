// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use tern_config::ThinkingLevel;

use crate::{
    adapter::{AdapterError, DeltaStream, ProviderAdapter, StreamRequest},
    Message, StreamDelta, UsageReport,
};

/// Deterministic mock adapter for tests and dry runs. Echoes the last user
/// message back as the assistant response.
#[derive(Default)]
pub struct EchoAdapter;

#[async_trait]
impl ProviderAdapter for EchoAdapter {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_id(&self) -> &str {
        "mock-model"
    }

    async fn stream(&self, req: StreamRequest) -> Result<DeltaStream, AdapterError> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find_map(|m| match m {
                Message::User { content } => content.as_text(),
                _ => None,
            })
            .unwrap_or("[no input]")
            .to_string();

        let deltas: Vec<anyhow::Result<StreamDelta>> = vec![
            Ok(StreamDelta::text(format!("MOCK: {reply}"))),
            Ok(StreamDelta::finished_with_usage(UsageReport {
                prompt_tokens: 10,
                completion_tokens: 10,
                total_tokens: 20,
                ..Default::default()
            })),
        ];
        Ok(Box::pin(stream::iter(deltas)))
    }
}

/// A pre-scripted adapter. Each call to `stream` pops the next delta script
/// from the front of the queue, letting tests specify exact event sequences
/// — including fragmented tool calls — without network access.
pub struct ScriptedAdapter {
    scripts: Arc<Mutex<Vec<Vec<StreamDelta>>>>,
    thinking_supported: bool,
    /// The last [`StreamRequest`] seen by this adapter, for test inspection.
    pub last_request: Arc<Mutex<Option<StreamRequest>>>,
    /// Thinking levels of every request received, in order.
    pub thinking_seen: Arc<Mutex<Vec<ThinkingLevel>>>,
}

impl ScriptedAdapter {
    /// Build an adapter from an ordered list of per-call delta scripts.
    pub fn new(scripts: Vec<Vec<StreamDelta>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            thinking_supported: false,
            last_request: Arc::new(Mutex::new(None)),
            thinking_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Declare that this adapter accepts a thinking budget.
    pub fn with_thinking(mut self) -> Self {
        self.thinking_supported = true;
        self
    }

    /// Convenience: adapter that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![vec![
            StreamDelta::text(reply),
            StreamDelta::finished_with_usage(UsageReport {
                prompt_tokens: 5,
                completion_tokens: 5,
                total_tokens: 10,
                ..Default::default()
            }),
        ]])
    }

    /// Convenience: adapter that returns one tool call, then a text reply on
    /// the following request.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            vec![
                StreamDelta::tool_fragment(
                    Some(&tool_id.into()),
                    Some(&tool_name.into()),
                    args_json.into(),
                ),
                StreamDelta::finished(),
            ],
            vec![StreamDelta::text(final_text), StreamDelta::finished()],
        ])
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_id(&self) -> &str {
        "scripted-mock-model"
    }

    fn supports_thinking(&self) -> bool {
        self.thinking_supported
    }

    async fn stream(&self, req: StreamRequest) -> Result<DeltaStream, AdapterError> {
        if req.thinking != ThinkingLevel::Off && !self.thinking_supported {
            return Err(AdapterError::ThinkingUnsupported {
                model: self.model_id().to_string(),
            });
        }
        self.thinking_seen.lock().unwrap().push(req.thinking);
        *self.last_request.lock().unwrap() = Some(req);
        let deltas = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                // Default fallback when all scripts are consumed.
                vec![StreamDelta::text("[no more scripts]"), StreamDelta::finished()]
            } else {
                scripts.remove(0)
            }
        };
        let wrapped: Vec<anyhow::Result<StreamDelta>> = deltas.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn req(text: &str) -> StreamRequest {
        StreamRequest {
            messages: vec![Message::user(text)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn echo_replies_with_last_user_message() {
        let mut s = EchoAdapter.stream(req("hi")).await.unwrap();
        let first = s.next().await.unwrap().unwrap();
        assert!(first.content.unwrap().contains("MOCK: hi"));
    }

    #[tokio::test]
    async fn echo_terminates_with_finish() {
        let mut s = EchoAdapter.stream(req("x")).await.unwrap();
        let mut last = StreamDelta::default();
        while let Some(d) = s.next().await {
            last = d.unwrap();
        }
        assert!(last.finish);
        assert!(last.usage.is_some());
    }

    #[tokio::test]
    async fn scripted_pops_scripts_in_order() {
        let a = ScriptedAdapter::tool_then_text("c1", "shell", r#"{"command":"ls"}"#, "done");

        let mut s1 = a.stream(req("go")).await.unwrap();
        let d = s1.next().await.unwrap().unwrap();
        assert_eq!(d.tool_calls[0].name.as_deref(), Some("shell"));

        let mut s2 = a.stream(req("go")).await.unwrap();
        let d = s2.next().await.unwrap().unwrap();
        assert_eq!(d.content.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn scripted_rejects_thinking_when_unsupported() {
        let a = ScriptedAdapter::always_text("x");
        let r = StreamRequest {
            messages: vec![Message::user("u")],
            thinking: ThinkingLevel::High,
            ..Default::default()
        };
        let err = a.stream(r).await.err().unwrap();
        assert!(matches!(err, AdapterError::ThinkingUnsupported { .. }));
    }

    #[tokio::test]
    async fn scripted_accepts_thinking_when_enabled() {
        let a = ScriptedAdapter::always_text("x").with_thinking();
        let r = StreamRequest {
            messages: vec![Message::user("u")],
            thinking: ThinkingLevel::Low,
            ..Default::default()
        };
        assert!(a.stream(r).await.is_ok());
        assert_eq!(a.thinking_seen.lock().unwrap()[0], ThinkingLevel::Low);
    }

    #[tokio::test]
    async fn scripted_fallback_after_exhaustion() {
        let a = ScriptedAdapter::new(vec![]);
        let mut s = a.stream(req("u")).await.unwrap();
        let d = s.next().await.unwrap().unwrap();
        assert!(d.content.unwrap().contains("no more scripts"));
    }
}
