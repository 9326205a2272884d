// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// A single tool invocation requested by the model, with decoded arguments.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier from the model (forwarded verbatim).
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments.
    pub args: Value,
}

/// Control-flow signal a tool can attach to its output.
///
/// These become the sentinel errors of the agent loop: the dispatcher still
/// records a tool result (so the call/result pairing holds), then propagates
/// the signal unwrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSignal {
    /// The model asked to hand the conversation to another agent profile.
    SwitchAgent {
        target: String,
        instruction: Option<String>,
    },
    /// The user cancelled the operation.
    UserCancel { reason: String },
}

/// The result of executing a tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    /// True when the tool failed non-fatally; the content then starts with
    /// `Error:` so the model can adapt.
    pub is_error: bool,
    /// Control-flow signal for the agent loop, if any.
    pub signal: Option<ToolSignal>,
}

impl ToolOutput {
    /// Successful plain-text result.
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
            signal: None,
        }
    }

    /// Recoverable error result. The body is prefixed with `Error:` unless
    /// the message already carries it.
    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let content = if msg.starts_with("Error:") {
            msg
        } else {
            format!("Error: {msg}")
        };
        Self {
            call_id: call_id.into(),
            content,
            is_error: true,
            signal: None,
        }
    }

    /// Result carrying a control-flow signal for the agent loop.
    pub fn signal(
        call_id: impl Into<String>,
        content: impl Into<String>,
        signal: ToolSignal,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
            signal: Some(signal),
        }
    }
}

/// What the dispatcher announces while this tool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressKind {
    /// Generic function-call announcement.
    #[default]
    FunctionCall,
    /// Web search / fetch; the UI shows a searching indicator instead.
    Search,
}

/// Read the `need_confirm` argument with the mutator default of `true`.
pub fn need_confirm_arg(args: &Value) -> bool {
    args.get("need_confirm").and_then(|v| v.as_bool()).unwrap_or(true)
}

/// Trait every built-in and user-defined tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the argument object.
    fn parameters_schema(&self) -> Value;

    /// Whether this call must be confirmed by the user before execution.
    ///
    /// Mutating tools read the `need_confirm` argument (default true);
    /// read-only tools keep the default of never asking.
    fn needs_confirmation(&self, _args: &Value) -> bool {
        false
    }

    /// Human-reviewable preview shown during confirmation: a unified diff
    /// for file mutators, the command line for shell, a one-line operation
    /// summary otherwise.
    async fn confirm_preview(&self, args: &Value) -> String {
        serde_json::to_string_pretty(args).unwrap_or_else(|_| "(no preview)".into())
    }

    /// Which progress status the dispatcher publishes while this runs.
    fn progress_kind(&self) -> ProgressKind {
        ProgressKind::FunctionCall
    }

    /// Execute the tool. Failures are wrapped in [`ToolOutput::err`]; only
    /// I/O-level invariant breaches should panic.
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
