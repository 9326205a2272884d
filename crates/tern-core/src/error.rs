// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Sentinel errors of the agent loop.
//!
//! `SwitchAgent` and `UserCancel` are control flow, not failures: they are
//! propagated exactly as raised (never wrapped with context) and detected by
//! kind via downcast, never by message text.

use tern_tools::ToolSignal;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    /// The conversation should be handed to another agent profile.
    #[error("switch agent to '{target}'")]
    SwitchAgent {
        target: String,
        instruction: Option<String>,
    },
    /// The user cancelled the turn or a guarded operation.
    #[error("cancelled by user: {reason}")]
    UserCancel { reason: String },
}

impl AgentError {
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::UserCancel {
            reason: reason.into(),
        }
    }
}

impl From<ToolSignal> for AgentError {
    fn from(signal: ToolSignal) -> Self {
        match signal {
            ToolSignal::SwitchAgent {
                target,
                instruction,
            } => Self::SwitchAgent {
                target,
                instruction,
            },
            ToolSignal::UserCancel { reason } => Self::UserCancel { reason },
        }
    }
}

/// Test whether `err` is (or wraps) the switch-agent sentinel.
pub fn as_switch_agent(err: &anyhow::Error) -> Option<&AgentError> {
    match err.downcast_ref::<AgentError>() {
        Some(e @ AgentError::SwitchAgent { .. }) => Some(e),
        _ => None,
    }
}

/// Test whether `err` is (or wraps) the user-cancel sentinel.
pub fn is_user_cancel(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<AgentError>(),
        Some(AgentError::UserCancel { .. })
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_agent_detected_by_kind_through_anyhow() {
        let err: anyhow::Error = AgentError::SwitchAgent {
            target: "coder".into(),
            instruction: Some("go".into()),
        }
        .into();
        let found = as_switch_agent(&err).unwrap();
        match found {
            AgentError::SwitchAgent { target, .. } => assert_eq!(target, "coder"),
            _ => unreachable!(),
        }
        assert!(!is_user_cancel(&err));
    }

    #[test]
    fn user_cancel_detected_by_kind() {
        let err: anyhow::Error = AgentError::cancelled("ctrl-c").into();
        assert!(is_user_cancel(&err));
        assert!(as_switch_agent(&err).is_none());
    }

    #[test]
    fn signal_conversion_preserves_payload() {
        let e: AgentError = ToolSignal::SwitchAgent {
            target: "t".into(),
            instruction: None,
        }
        .into();
        assert!(matches!(e, AgentError::SwitchAgent { ref target, .. } if target == "t"));
    }

    #[test]
    fn unrelated_error_is_neither_sentinel() {
        let err = anyhow::anyhow!("disk on fire");
        assert!(as_switch_agent(&err).is_none());
        assert!(!is_user_cancel(&err));
    }
}
