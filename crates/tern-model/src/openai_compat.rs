// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use tern_config::{ModelProfile, ThinkingLevel};

use crate::{
    adapter::{AdapterError, DeltaStream, ProviderAdapter, StreamRequest},
    ContentPart, Message, StreamDelta, ToolCallFragment, UsageReport, UserContent,
};

/// Driver for any OpenAI-compatible `/chat/completions` endpoint: the hosted
/// API, LiteLLM, OpenRouter, llama.cpp, Ollama, vLLM.
pub struct OpenAiCompatAdapter {
    model: String,
    api_key: Option<String>,
    chat_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    client: reqwest::Client,
}

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model families that accept a `reasoning_effort` parameter.
fn model_accepts_reasoning(model: &str) -> bool {
    model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
        || model.starts_with("gpt-5")
        || model.starts_with("deepseek-r")
}

impl OpenAiCompatAdapter {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
        top_p: Option<f32>,
    ) -> Self {
        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let base = base.trim_end_matches('/');
        Self {
            model: model.into(),
            api_key,
            chat_url: format!("{base}/chat/completions"),
            max_tokens,
            temperature,
            top_p,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_profile(profile: &ModelProfile) -> Self {
        let api_key = profile.api_key.clone().or_else(|| {
            profile
                .api_key_env
                .as_deref()
                .or(Some("OPENAI_API_KEY"))
                .and_then(|var| std::env::var(var).ok())
        });
        Self::new(
            profile.name.clone(),
            api_key,
            profile.base_url.clone(),
            profile.max_tokens,
            profile.temperature,
            profile.top_p,
        )
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn supports_thinking(&self) -> bool {
        model_accepts_reasoning(&self.model)
    }

    async fn stream(&self, req: StreamRequest) -> Result<DeltaStream, AdapterError> {
        if req.thinking != ThinkingLevel::Off && !self.supports_thinking() {
            return Err(AdapterError::ThinkingUnsupported {
                model: self.model.clone(),
            });
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages_to_json(&req.messages),
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if !req.tools.is_empty() {
            body["tools"] = self.encode_tools(&req.tools);
        }
        if let Some(mt) = req.max_tokens.or(self.max_tokens) {
            body["max_tokens"] = json!(mt);
        }
        if let Some(t) = req.temperature.or(self.temperature) {
            body["temperature"] = json!(t);
        }
        if let Some(p) = req.top_p.or(self.top_p) {
            body["top_p"] = json!(p);
        }
        if req.thinking != ThinkingLevel::Off {
            body["reasoning_effort"] = json!(req.thinking.to_string());
        }

        debug!(
            model = %self.model,
            tool_count = req.tools.len(),
            message_count = req.messages.len(),
            "sending completion request"
        );

        let mut http_req = self.client.post(&self.chat_url).json(&body);
        if let Some(key) = self.api_key.as_deref() {
            http_req = http_req.bearer_auth(key);
        }

        let resp = http_req
            .send()
            .await
            .context("chat completion request failed")
            .map_err(AdapterError::Other)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            // Endpoints that reject the reasoning parameter report it in the
            // error body; surface that as the typed unsupported error so the
            // agent loop can retry without thinking.
            if text.contains("reasoning_effort") || text.contains("reasoning is not supported") {
                return Err(AdapterError::ThinkingUnsupported {
                    model: self.model.clone(),
                });
            }
            return Err(AdapterError::Other(anyhow::anyhow!(
                "chat completion error {status}: {text}"
            )));
        }

        // SSE events can be split across TCP packets; keep a line buffer
        // across chunks and emit deltas only for complete lines.
        let byte_stream = resp.bytes_stream();
        let delta_stream = byte_stream
            .scan(String::new(), |buf, chunk| {
                let deltas: Vec<anyhow::Result<StreamDelta>> = match chunk {
                    Ok(b) => {
                        buf.push_str(&String::from_utf8_lossy(&b));
                        drain_complete_sse_lines(buf)
                    }
                    Err(e) => vec![Err(anyhow::anyhow!(e))],
                };
                std::future::ready(Some(deltas))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(delta_stream))
    }
}

// ─── Wire mapping ─────────────────────────────────────────────────────────────

fn messages_to_json(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| match m {
            Message::System { content } => json!({ "role": "system", "content": content }),
            Message::User { content } => match content {
                UserContent::Text(t) => json!({ "role": "user", "content": t }),
                UserContent::Parts(parts) => {
                    let parts: Vec<Value> = parts
                        .iter()
                        .map(|p| match p {
                            ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                            ContentPart::Image { image_url } => {
                                json!({ "type": "image_url", "image_url": { "url": image_url } })
                            }
                            ContentPart::Video { video_url } => {
                                json!({ "type": "video_url", "video_url": { "url": video_url } })
                            }
                        })
                        .collect();
                    json!({ "role": "user", "content": parts })
                }
            },
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                // Reasoning is never echoed back to the provider.
                let mut v = json!({ "role": "assistant" });
                v["content"] = match content {
                    Some(c) => json!(c),
                    None => Value::Null,
                };
                if !tool_calls.is_empty() {
                    v["tool_calls"] = json!(tool_calls
                        .iter()
                        .map(|tc| json!({
                            "id": tc.id,
                            "type": "function",
                            "function": { "name": tc.name, "arguments": tc.arguments }
                        }))
                        .collect::<Vec<_>>());
                }
                v
            }
            Message::Tool {
                tool_call_id,
                content,
            } => json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "content": content,
            }),
        })
        .collect()
}

/// Drain all complete `\n`-terminated SSE lines from `buf`.
///
/// A trailing incomplete line is left in `buf` so the next TCP chunk can
/// extend it.
fn drain_complete_sse_lines(buf: &mut String) -> Vec<anyhow::Result<StreamDelta>> {
    let mut deltas = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        if let Some(d) = parse_sse_data_line(&line) {
            deltas.push(d);
        }
    }
    deltas
}

/// Parse a single complete SSE `data:` line into a [`StreamDelta`].
///
/// Returns `None` for empty lines, comments, or unparseable data.
fn parse_sse_data_line(line: &str) -> Option<anyhow::Result<StreamDelta>> {
    let data = line.strip_prefix("data: ")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(StreamDelta::finished()));
    }
    let v: Value = serde_json::from_str(data).ok()?;
    Some(Ok(parse_sse_chunk(&v)))
}

fn parse_sse_chunk(v: &Value) -> StreamDelta {
    let mut delta = StreamDelta::default();

    // Usage-only chunk (stream_options.include_usage = true). OpenAI reports
    // cached tokens under prompt_tokens_details and includes them in
    // prompt_tokens; DeepSeek reports prompt_cache_hit_tokens separately.
    if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
        let openai_cached = usage
            .get("prompt_tokens_details")
            .and_then(|d| d.get("cached_tokens"))
            .and_then(|t| t.as_u64());
        let deepseek_cached = usage.get("prompt_cache_hit_tokens").and_then(|t| t.as_u64());
        let cached_included_in_prompt = openai_cached.is_some();
        delta.usage = Some(UsageReport {
            prompt_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
            cached_prompt_tokens: openai_cached.or(deepseek_cached).unwrap_or(0) as u32,
            reasoning_tokens: usage
                .get("completion_tokens_details")
                .and_then(|d| d.get("reasoning_tokens"))
                .and_then(|t| t.as_u64())
                .unwrap_or(0) as u32,
            total_tokens: usage["total_tokens"].as_u64().unwrap_or(0) as u32,
            cached_included_in_prompt,
        });
    }

    let Some(choice) = v.get("choices").and_then(|c| c.get(0)) else {
        return delta;
    };

    if choice
        .get("finish_reason")
        .and_then(|f| f.as_str())
        .is_some()
    {
        delta.finish = true;
    }

    let Some(d) = choice.get("delta") else {
        return delta;
    };

    // Reasoning arrives as reasoning_content (DeepSeek / llama.cpp) or
    // reasoning (OpenRouter).
    let reasoning = d
        .get("reasoning_content")
        .or_else(|| d.get("reasoning"))
        .and_then(|r| r.as_str());
    if let Some(r) = reasoning {
        if !r.is_empty() {
            delta.reasoning = Some(r.to_string());
        }
    }
    if let Some(c) = d.get("content").and_then(|c| c.as_str()) {
        if !c.is_empty() {
            delta.content = Some(c.to_string());
        }
    }
    if let Some(tcs) = d.get("tool_calls").and_then(|t| t.as_array()) {
        for tc in tcs {
            let id = tc.get("id").and_then(|i| i.as_str()).filter(|s| !s.is_empty());
            let func = tc.get("function");
            let name = func
                .and_then(|f| f.get("name"))
                .and_then(|n| n.as_str())
                .filter(|s| !s.is_empty());
            let arguments = func
                .and_then(|f| f.get("arguments"))
                .and_then(|a| a.as_str())
                .unwrap_or("");
            delta.tool_calls.push(ToolCallFragment {
                id: id.map(str::to_string),
                name: name.map(str::to_string),
                arguments: arguments.to_string(),
            });
        }
    }

    delta
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCallRecord;

    fn adapter() -> OpenAiCompatAdapter {
        OpenAiCompatAdapter::new(
            "test-model",
            None,
            Some("http://localhost:9999/v1".into()),
            Some(1024),
            Some(0.0),
            None,
        )
    }

    #[test]
    fn chat_url_appends_path() {
        assert_eq!(adapter().chat_url, "http://localhost:9999/v1/chat/completions");
    }

    #[test]
    fn base_url_trailing_slash_stripped() {
        let a = OpenAiCompatAdapter::new("m", None, Some("http://h/v1/".into()), None, None, None);
        assert_eq!(a.chat_url, "http://h/v1/chat/completions");
    }

    #[test]
    fn reasoning_models_support_thinking() {
        let a = OpenAiCompatAdapter::new("o3-mini", None, None, None, None, None);
        assert!(a.supports_thinking());
        assert!(!adapter().supports_thinking());
    }

    #[test]
    fn parse_text_delta_chunk() {
        let v = json!({ "choices": [{ "delta": { "content": "hi" } }] });
        let d = parse_sse_chunk(&v);
        assert_eq!(d.content.as_deref(), Some("hi"));
        assert!(d.tool_calls.is_empty());
        assert!(!d.finish);
    }

    #[test]
    fn parse_reasoning_content_chunk() {
        let v = json!({ "choices": [{ "delta": { "reasoning_content": "hmm" } }] });
        let d = parse_sse_chunk(&v);
        assert_eq!(d.reasoning.as_deref(), Some("hmm"));
        assert!(d.content.is_none());
    }

    #[test]
    fn parse_tool_call_fragment_chunk() {
        let v = json!({
            "choices": [{ "delta": { "tool_calls": [{
                "id": "c1",
                "function": { "name": "shell", "arguments": "{\"com" }
            }] } }]
        });
        let d = parse_sse_chunk(&v);
        assert_eq!(d.tool_calls.len(), 1);
        assert_eq!(d.tool_calls[0].id.as_deref(), Some("c1"));
        assert_eq!(d.tool_calls[0].name.as_deref(), Some("shell"));
        assert_eq!(d.tool_calls[0].arguments, "{\"com");
    }

    #[test]
    fn parse_continuation_fragment_has_no_id() {
        let v = json!({
            "choices": [{ "delta": { "tool_calls": [{
                "function": { "arguments": "mand\":\"ls\"}" }
            }] } }]
        });
        let d = parse_sse_chunk(&v);
        assert!(d.tool_calls[0].id.is_none());
        assert!(d.tool_calls[0].name.is_none());
    }

    #[test]
    fn parse_usage_chunk_openai_style() {
        let v = json!({
            "choices": [],
            "usage": {
                "prompt_tokens": 100,
                "completion_tokens": 20,
                "total_tokens": 120,
                "prompt_tokens_details": { "cached_tokens": 80 },
                "completion_tokens_details": { "reasoning_tokens": 5 }
            }
        });
        let d = parse_sse_chunk(&v);
        let u = d.usage.unwrap();
        assert_eq!(u.prompt_tokens, 100);
        assert_eq!(u.cached_prompt_tokens, 80);
        assert_eq!(u.reasoning_tokens, 5);
        assert!(u.cached_included_in_prompt);
    }

    #[test]
    fn parse_usage_chunk_deepseek_style_cached_not_in_prompt() {
        let v = json!({
            "choices": [],
            "usage": {
                "prompt_tokens": 20,
                "completion_tokens": 5,
                "total_tokens": 25,
                "prompt_cache_hit_tokens": 100
            }
        });
        let u = parse_sse_chunk(&v).usage.unwrap();
        assert_eq!(u.cached_prompt_tokens, 100);
        assert!(!u.cached_included_in_prompt);
    }

    #[test]
    fn done_line_yields_finish() {
        let d = parse_sse_data_line("data: [DONE]").unwrap().unwrap();
        assert!(d.finish);
    }

    #[test]
    fn drain_keeps_partial_line_in_buffer() {
        let mut buf = "data: [DONE]\ndata: {\"choi".to_string();
        let deltas = drain_complete_sse_lines(&mut buf);
        assert_eq!(deltas.len(), 1);
        assert_eq!(buf, "data: {\"choi");
    }

    #[test]
    fn assistant_tool_calls_serialize_for_wire() {
        let msgs = vec![Message::assistant_full(
            Some("hidden reasoning".into()),
            None,
            vec![ToolCallRecord {
                id: "c1".into(),
                name: "shell".into(),
                arguments: r#"{"command":"ls"}"#.into(),
            }],
        )];
        let wire = messages_to_json(&msgs);
        assert_eq!(wire[0]["role"], "assistant");
        assert_eq!(wire[0]["content"], Value::Null);
        assert_eq!(wire[0]["tool_calls"][0]["function"]["name"], "shell");
        // Reasoning must not leak onto the wire.
        assert!(wire[0].get("reasoning").is_none());
    }

    #[test]
    fn tool_message_maps_to_tool_role() {
        let wire = messages_to_json(&[Message::tool("c9", "listing")]);
        assert_eq!(wire[0]["role"], "tool");
        assert_eq!(wire[0]["tool_call_id"], "c9");
    }
}
