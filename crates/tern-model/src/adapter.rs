// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::json;

use tern_config::ThinkingLevel;

use crate::{Message, StreamDelta, ToolSchema};

pub type DeltaStream = Pin<Box<dyn Stream<Item = anyhow::Result<StreamDelta>> + Send>>;

/// Errors surfaced by [`ProviderAdapter::stream`] before any delta arrives.
///
/// `ThinkingUnsupported` is detected by kind: the agent loop retries the
/// request once with thinking disabled and remembers the downgrade for the
/// rest of the turn. Everything else is operational and ends the turn.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("model '{model}' does not support thinking")]
    ThinkingUnsupported { model: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Request handed to a provider adapter for one model call.
#[derive(Debug, Clone, Default)]
pub struct StreamRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub thinking: ThinkingLevel,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Streaming model client capability.
///
/// Implementations translate the abstract request into their wire protocol
/// and yield [`StreamDelta`] records; the agent core never sees provider
/// payloads.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_id(&self) -> &str;

    /// Send a completion request and return a streaming response.
    async fn stream(&self, req: StreamRequest) -> Result<DeltaStream, AdapterError>;

    /// Translate tool schemas into the provider's dialect.
    ///
    /// The default covers the common `{type: "function", function: {...}}`
    /// shape used by OpenAI-compatible endpoints.
    fn encode_tools(&self, tools: &[ToolSchema]) -> serde_json::Value {
        json!(tools
            .iter()
            .map(|t| json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            }))
            .collect::<Vec<_>>())
    }

    /// Whether this provider/model combination accepts a thinking budget.
    fn supports_thinking(&self) -> bool {
        false
    }

    /// Context window size from the static catalog, if the model is known.
    fn catalog_context_window(&self) -> Option<u32> {
        crate::catalog::lookup(self.model_id()).map(|e| e.context_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EchoAdapter;

    #[test]
    fn default_tool_encoding_wraps_as_functions() {
        let tools = vec![ToolSchema {
            name: "read_file".into(),
            description: "read a file".into(),
            parameters: json!({ "type": "object" }),
        }];
        let encoded = EchoAdapter.encode_tools(&tools);
        assert_eq!(encoded[0]["type"], "function");
        assert_eq!(encoded[0]["function"]["name"], "read_file");
    }

    #[test]
    fn thinking_unsupported_is_detectable_by_kind() {
        let err = AdapterError::ThinkingUnsupported {
            model: "m".into(),
        };
        assert!(matches!(err, AdapterError::ThinkingUnsupported { .. }));
    }
}
