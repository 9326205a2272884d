// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

// ─── Content part types ───────────────────────────────────────────────────────

/// A single content part in a multi-part user message.
///
/// Inline media is always a data URL (`data:<mime>;base64,<b64>`); HTTPS URLs
/// are forwarded for providers that accept remote references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { image_url: String },
    Video { video_url: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(image_url: impl Into<String>) -> Self {
        Self::Image {
            image_url: image_url.into(),
        }
    }

    pub fn video(video_url: impl Into<String>) -> Self {
        Self::Video {
            video_url: video_url.into(),
        }
    }
}

/// User message body: a single text string or an ordered list of parts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl UserContent {
    /// Plain text of this content, if it is a single text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Parts(parts) if parts.len() == 1 => match &parts[0] {
                ContentPart::Text { text } => Some(text),
                _ => None,
            },
            _ => None,
        }
    }
}

// ─── Tool call record ─────────────────────────────────────────────────────────

/// One tool invocation requested by the model, as stored in history.
///
/// `arguments` is kept as the raw JSON string the model produced (after
/// stream-side sanitization) so that the dispatcher owns the decode step and
/// decode failures surface as tool results rather than history corruption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    /// Identifier assigned by the model, unique within a turn.
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

// ─── Message ──────────────────────────────────────────────────────────────────

/// A single message in the conversation history.
///
/// Tool messages pair with the assistant tool call of the same
/// `tool_call_id`; every call emitted by an assistant message must be
/// answered by exactly one tool message before the next model request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: UserContent,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRecord>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: UserContent::Text(text.into()),
        }
    }

    /// Construct a user message from a list of content parts.
    ///
    /// An empty list collapses to empty text; a single text part collapses to
    /// the plain `Text` form for cleaner serialization.
    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        let content = if parts.is_empty() {
            UserContent::Text(String::new())
        } else if parts.len() == 1 {
            if let ContentPart::Text { text } = &parts[0] {
                UserContent::Text(text.clone())
            } else {
                UserContent::Parts(parts)
            }
        } else {
            UserContent::Parts(parts)
        };
        Self::User { content }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            reasoning: None,
            content: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_full(
        reasoning: Option<String>,
        content: Option<String>,
        tool_calls: Vec<ToolCallRecord>,
    ) -> Self {
        Self::Assistant {
            reasoning,
            content,
            tool_calls,
        }
    }

    pub fn tool(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: id.into(),
            content: content.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System { .. })
    }

    /// Plain text of this message, where one exists.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::System { content } => Some(content),
            Self::User { content } => content.as_text(),
            Self::Assistant { content, .. } => content.as_deref(),
            Self::Tool { .. } => None,
        }
    }

    /// Tool calls carried by this message (empty for non-assistant roles).
    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Character weight used by the token estimator.
    ///
    /// Inline media uses flat estimates (an image ≈ 765 tokens, a video frame
    /// budget ≈ 2000 tokens) expressed in character units so the same
    /// chars-per-token divisor applies everywhere.
    pub fn approx_chars(&self) -> usize {
        match self {
            Self::System { content } => content.len(),
            Self::User { content } => match content {
                UserContent::Text(t) => t.len(),
                UserContent::Parts(parts) => parts
                    .iter()
                    .map(|p| match p {
                        ContentPart::Text { text } => text.len(),
                        ContentPart::Image { .. } => 765 * 4,
                        ContentPart::Video { .. } => 2000 * 4,
                    })
                    .sum(),
            },
            Self::Assistant {
                reasoning,
                content,
                tool_calls,
            } => {
                reasoning.as_deref().map(str::len).unwrap_or(0)
                    + content.as_deref().map(str::len).unwrap_or(0)
                    + tool_calls
                        .iter()
                        .map(|tc| tc.name.len() + tc.arguments.len())
                        .sum::<usize>()
            }
            Self::Tool { content, .. } => content.len(),
        }
    }
}

// ─── Tool schema ──────────────────────────────────────────────────────────────

/// A tool schema provided to the model.
///
/// `parameters` is a JSON-Schema subset: type ∈ {object, string, integer,
/// boolean, array}, properties, required, enum, items, default, description.
/// Adapters translate this into their provider's dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

// ─── Streaming delta ──────────────────────────────────────────────────────────

/// One fragment of a streamed tool call.
///
/// Fragments are stitched by `id`; a fragment with no id continues the last
/// call whose id was seen.
#[derive(Debug, Clone, Default)]
pub struct ToolCallFragment {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Argument chunk appended to the call's argument buffer.
    pub arguments: String,
}

/// Token usage reported at the end of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageReport {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cached_prompt_tokens: u32,
    pub reasoning_tokens: u32,
    pub total_tokens: u32,
    /// When true, `cached_prompt_tokens` is already included in
    /// `prompt_tokens`; otherwise it is billed separately.
    pub cached_included_in_prompt: bool,
}

/// An incremental slice of a streaming model response.
#[derive(Debug, Clone, Default)]
pub struct StreamDelta {
    pub reasoning: Option<String>,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallFragment>,
    pub usage: Option<UsageReport>,
    /// Set on the terminal delta.
    pub finish: bool,
}

impl StreamDelta {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn reasoning(chunk: impl Into<String>) -> Self {
        Self {
            reasoning: Some(chunk.into()),
            ..Default::default()
        }
    }

    pub fn tool_fragment(
        id: Option<&str>,
        name: Option<&str>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            tool_calls: vec![ToolCallFragment {
                id: id.map(str::to_string),
                name: name.map(str::to_string),
                arguments: arguments.into(),
            }],
            ..Default::default()
        }
    }

    pub fn finished() -> Self {
        Self {
            finish: true,
            ..Default::default()
        }
    }

    pub fn finished_with_usage(usage: UsageReport) -> Self {
        Self {
            usage: Some(usage),
            finish: true,
            ..Default::default()
        }
    }
}

// ─── Invariant checks ─────────────────────────────────────────────────────────

/// Verify tool-call / tool-result pairing over a message list.
///
/// Checks that every assistant tool call is answered by exactly one tool
/// message appearing after it, that no tool message precedes its originating
/// assistant message, and that a system message only ever sits at index 0.
/// Returns a developer-facing description of the first violation found.
pub fn verify_pairing(messages: &[Message]) -> Result<(), String> {
    use std::collections::HashMap;

    let mut answered: HashMap<&str, usize> = HashMap::new();
    let mut open: Vec<&str> = Vec::new();

    for (i, msg) in messages.iter().enumerate() {
        match msg {
            Message::System { .. } if i != 0 => {
                return Err(format!("system message at index {i} (must be index 0)"));
            }
            Message::Assistant { tool_calls, .. } => {
                for tc in tool_calls {
                    open.push(&tc.id);
                }
            }
            Message::Tool { tool_call_id, .. } => {
                if !open.iter().any(|id| *id == tool_call_id.as_str()) {
                    return Err(format!(
                        "tool message '{tool_call_id}' at index {i} has no preceding tool call"
                    ));
                }
                *answered.entry(tool_call_id.as_str()).or_insert(0) += 1;
            }
            _ => {}
        }
    }

    for id in open {
        match answered.get(id) {
            Some(1) => {}
            Some(n) => return Err(format!("tool call '{id}' answered {n} times")),
            None => return Err(format!("tool call '{id}' has no tool result")),
        }
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_carries_text() {
        let m = Message::user("hello");
        assert_eq!(m.as_text(), Some("hello"));
    }

    #[test]
    fn user_with_single_text_part_collapses() {
        let m = Message::user_with_parts(vec![ContentPart::text("hi")]);
        assert_eq!(m.as_text(), Some("hi"));
    }

    #[test]
    fn user_with_image_part_has_no_plain_text() {
        let m = Message::user_with_parts(vec![
            ContentPart::text("what is this?"),
            ContentPart::image("data:image/png;base64,AAA"),
        ]);
        assert!(m.as_text().is_none());
    }

    #[test]
    fn assistant_tool_calls_accessor() {
        let m = Message::assistant_full(
            None,
            None,
            vec![ToolCallRecord {
                id: "c1".into(),
                name: "read_file".into(),
                arguments: "{}".into(),
            }],
        );
        assert_eq!(m.tool_calls().len(), 1);
        assert_eq!(m.tool_calls()[0].name, "read_file");
    }

    #[test]
    fn approx_chars_counts_reasoning_and_calls() {
        let m = Message::assistant_full(
            Some("abcd".into()),
            Some("efgh".into()),
            vec![ToolCallRecord {
                id: "c".into(),
                name: "xy".into(),
                arguments: "{}".into(),
            }],
        );
        // 4 + 4 + (2 + 2)
        assert_eq!(m.approx_chars(), 12);
    }

    #[test]
    fn message_serde_round_trip() {
        let msgs = vec![
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant_full(
                Some("thinking".into()),
                Some("answer".into()),
                vec![ToolCallRecord {
                    id: "c1".into(),
                    name: "shell".into(),
                    arguments: r#"{"command":"ls"}"#.into(),
                }],
            ),
            Message::tool("c1", "out"),
        ];
        let json = serde_json::to_string(&msgs).unwrap();
        let back: Vec<Message> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msgs);
    }

    #[test]
    fn pairing_accepts_answered_calls() {
        let msgs = vec![
            Message::user("u"),
            Message::assistant_full(
                None,
                None,
                vec![ToolCallRecord {
                    id: "c1".into(),
                    name: "t".into(),
                    arguments: "{}".into(),
                }],
            ),
            Message::tool("c1", "result"),
        ];
        assert!(verify_pairing(&msgs).is_ok());
    }

    #[test]
    fn pairing_rejects_unanswered_call() {
        let msgs = vec![Message::assistant_full(
            None,
            None,
            vec![ToolCallRecord {
                id: "c1".into(),
                name: "t".into(),
                arguments: "{}".into(),
            }],
        )];
        assert!(verify_pairing(&msgs).is_err());
    }

    #[test]
    fn pairing_rejects_orphan_tool_message() {
        let msgs = vec![Message::tool("ghost", "x")];
        assert!(verify_pairing(&msgs).is_err());
    }

    #[test]
    fn pairing_rejects_system_after_start() {
        let msgs = vec![Message::user("u"), Message::system("late")];
        assert!(verify_pairing(&msgs).is_err());
    }
}
