// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelProfile,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Named agent profiles.
    ///
    /// These are the targets of `switch_agent` and the worker definitions for
    /// `call_agent`. A profile may override the model, system prompt, thinking
    /// level, and enabled tool set; anything left unset falls back to the
    /// top-level configuration.
    ///
    /// ```yaml
    /// agents:
    ///   researcher:
    ///     description: read-only web research worker
    ///     thinking: high
    ///     tools: [web_search, web_fetch, read_file]
    ///   coder:
    ///     model:
    ///       provider: openai
    ///       name: gpt-4o
    /// ```
    #[serde(default)]
    pub agents: HashMap<String, AgentProfile>,
}

/// Endpoint, model id, and sampling parameters for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Provider identifier: "openai" (any OpenAI-compatible endpoint) or "mock".
    pub provider: String,
    /// Model name forwarded to the provider API.
    pub name: String,
    /// Environment variable that holds the API key (read at runtime).
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files so that secrets
    /// stay out of version-controlled files.
    pub api_key: Option<String>,
    /// Base URL override. Useful for local servers, LiteLLM, or proxies.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion.
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0).
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter (0.0–1.0).
    pub top_p: Option<f32>,
}

impl Default for ModelProfile {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: Some(4096),
            temperature: Some(0.2),
            top_p: None,
        }
    }
}

/// Reasoning-budget level requested from the model.
///
/// Providers map this to their own parameters (effort strings, token
/// budgets); an adapter that cannot honour it reports thinking as
/// unsupported and the agent retries the turn with `Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    #[default]
    Off,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ThinkingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThinkingLevel::Off => write!(f, "off"),
            ThinkingLevel::Low => write!(f, "low"),
            ThinkingLevel::Medium => write!(f, "medium"),
            ThinkingLevel::High => write!(f, "high"),
        }
    }
}

fn default_max_tool_rounds() -> u32 {
    20
}
fn default_confirm_timeout_secs() -> u64 {
    60
}
fn default_max_workers_paralleled() -> usize {
    4
}
fn default_call_agent_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of model-call → tool-dispatch rounds per user turn.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Skip all tool confirmations. Sub-agents always run with this on.
    #[serde(default)]
    pub auto_approve: bool,
    /// Reasoning budget requested from the model.
    #[serde(default)]
    pub thinking: ThinkingLevel,
    /// System prompt override; leave unset to use the built-in prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Seconds to wait for a user decision on a confirmation before it
    /// resolves as a timeout.
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    /// Worker-pool cap for `call_agent` task batches.
    #[serde(default = "default_max_workers_paralleled")]
    pub max_workers_paralleled: usize,
    /// Wall-clock budget for one `call_agent` batch in seconds.
    #[serde(default = "default_call_agent_timeout_secs")]
    pub call_agent_timeout_secs: u64,
    /// Directory for per-task artifact files written by the orchestrator.
    /// Defaults to `~/.local/share/tern/tasks`.
    #[serde(default)]
    pub artifacts_dir: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            auto_approve: false,
            thinking: ThinkingLevel::Off,
            system_prompt: None,
            confirm_timeout_secs: default_confirm_timeout_secs(),
            max_workers_paralleled: default_max_workers_paralleled(),
            call_agent_timeout_secs: default_call_agent_timeout_secs(),
            artifacts_dir: None,
        }
    }
}

/// A named agent profile: the target of `switch_agent` and the worker
/// definition for `call_agent` task nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentProfile {
    /// One-line description shown by `list_agent`.
    #[serde(default)]
    pub description: String,
    /// Model override; falls back to the top-level model when unset.
    #[serde(default)]
    pub model: Option<ModelProfile>,
    /// Thinking-level override.
    #[serde(default)]
    pub thinking: Option<ThinkingLevel>,
    /// System prompt override.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Restrict the profile to this tool set; unset means all tools.
    #[serde(default)]
    pub tools: Option<Vec<String>>,
}

fn default_tool_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default timeout in seconds for a single shell invocation.
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    /// Web fetch and search configuration.
    #[serde(default)]
    pub web: WebConfig,
    /// Persistent memory configuration.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Directory containing skill markdown files for `activate_skill`.
    #[serde(default)]
    pub skills_dir: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
            web: WebConfig::default(),
            memory: MemoryConfig::default(),
            skills_dir: None,
        }
    }
}

/// Search backend selection and credentials.
///
/// This is a value owned by the agent and passed into the tool registry
/// explicitly — there is no process-global search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEngineConfig {
    /// Backend identifier: "brave" or "mock".
    pub engine: String,
    /// Explicit API key for the search backend.
    pub api_key: Option<String>,
    /// Environment variable to read the key from when `api_key` is unset.
    pub api_key_env: Option<String>,
}

impl Default for SearchEngineConfig {
    fn default() -> Self {
        Self {
            engine: "brave".into(),
            api_key: None,
            api_key_env: Some("BRAVE_API_KEY".into()),
        }
    }
}

impl SearchEngineConfig {
    /// Resolve the API key from config or the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Search backend configuration.
    #[serde(default)]
    pub search: SearchEngineConfig,
    /// Default maximum characters for web_fetch.
    pub fetch_max_chars: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            search: SearchEngineConfig::default(),
            fetch_max_chars: 50_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Path to the memory file (default: ~/.config/tern/memory.md).
    pub memory_file: Option<String>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses_round_trip() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.model.provider, "openai");
        assert_eq!(back.agent.max_tool_rounds, 20);
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.agent.max_workers_paralleled, 4);
        assert_eq!(cfg.agent.call_agent_timeout_secs, 300);
        assert!(!cfg.agent.auto_approve);
    }

    #[test]
    fn thinking_level_parses_lowercase() {
        let lvl: ThinkingLevel = serde_yaml::from_str("high").unwrap();
        assert_eq!(lvl, ThinkingLevel::High);
        assert_eq!(lvl.to_string(), "high");
    }

    #[test]
    fn agent_profile_overrides_are_optional() {
        let yaml = "description: research worker\nthinking: medium\n";
        let p: AgentProfile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(p.thinking, Some(ThinkingLevel::Medium));
        assert!(p.model.is_none());
        assert!(p.tools.is_none());
    }

    #[test]
    fn search_engine_key_prefers_explicit_value() {
        let cfg = SearchEngineConfig {
            engine: "brave".into(),
            api_key: Some("k-123".into()),
            api_key_env: Some("TERN_UNSET_VAR_FOR_TEST".into()),
        };
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("k-123"));
    }

    #[test]
    fn tool_timeout_default_is_sixty() {
        let cfg: ToolsConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.timeout_secs, 60);
    }
}
