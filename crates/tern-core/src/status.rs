// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Status stack and UI notification bus.
//!
//! The agent publishes every observable state transition as a
//! [`StreamNotify`] and — except for fire-and-forget warnings and errors —
//! blocks until the UI collaborator acknowledges it on the `proceed`
//! channel. Paired states (Reasoning, FunctionCalling, DiffConfirm,
//! Searching) are tracked on a LIFO stack; every push must be matched by its
//! `…Over` pop before the turn ends.

use std::time::Duration;

use anyhow::bail;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use tern_model::UsageReport;

use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Processing,
    Started,
    Reasoning,
    ReasoningOver,
    FunctionCalling,
    FunctionCallingOver,
    DiffConfirm,
    DiffConfirmOver,
    Searching,
    SearchingOver,
    Data,
    Finished,
    Error,
    Warn,
}

impl StreamStatus {
    /// The `…Over` twin that pops this status from the stack, if it is a
    /// paired opening state.
    pub fn over(self) -> Option<StreamStatus> {
        match self {
            Self::Reasoning => Some(Self::ReasoningOver),
            Self::FunctionCalling => Some(Self::FunctionCallingOver),
            Self::DiffConfirm => Some(Self::DiffConfirmOver),
            Self::Searching => Some(Self::SearchingOver),
            _ => None,
        }
    }

    /// The opening state this status closes, if it is an `…Over`.
    pub fn closes(self) -> Option<StreamStatus> {
        match self {
            Self::ReasoningOver => Some(Self::Reasoning),
            Self::FunctionCallingOver => Some(Self::FunctionCalling),
            Self::DiffConfirmOver => Some(Self::DiffConfirm),
            Self::SearchingOver => Some(Self::Searching),
            _ => None,
        }
    }

    /// Fire-and-forget statuses are published without waiting for an ack.
    pub fn is_fire_and_forget(self) -> bool {
        matches!(self, Self::Error | Self::Warn)
    }
}

/// Payload attached to a [`StreamNotify`].
#[derive(Debug, Clone)]
pub enum NotifyData {
    /// Normal content chunk.
    Text(String),
    /// Reasoning chunk (published under the `Data` status while the
    /// `Reasoning` state is open).
    Reasoning(String),
    /// Function announcement; bulky argument fields are already hidden.
    FunctionCall {
        function: String,
        args: serde_json::Value,
    },
    /// Reviewable preview for a confirmation.
    Diff(String),
    /// Token usage snapshot.
    Usage(UsageReport),
    /// Human-readable message (errors, warnings, citation block).
    Message(String),
}

#[derive(Debug, Clone)]
pub struct StreamNotify {
    pub status: StreamStatus,
    pub data: Option<NotifyData>,
}

/// Outcome of a confirmation rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDecision {
    Approve,
    Deny,
    Timeout,
}

/// LIFO stack of open paired statuses.
#[derive(Debug, Default)]
pub struct StatusStack {
    stack: Vec<StreamStatus>,
}

impl StatusStack {
    pub fn push(&mut self, status: StreamStatus) {
        self.stack.push(status);
    }

    /// Pop the top of the stack, verifying it matches `opener`.
    pub fn pop(&mut self, opener: StreamStatus) -> anyhow::Result<()> {
        match self.stack.pop() {
            Some(top) if top == opener => Ok(()),
            Some(top) => bail!("status stack out of order: closing {opener:?} over open {top:?}"),
            None => bail!("status stack underflow closing {opener:?}"),
        }
    }

    pub fn top(&self) -> Option<StreamStatus> {
        self.stack.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

/// The UI-facing half of the bus, handed to the console or a test harness.
pub struct UiEndpoint {
    pub notify_rx: mpsc::Receiver<StreamNotify>,
    pub proceed_tx: mpsc::Sender<bool>,
    pub decision_tx: mpsc::Sender<UserDecision>,
}

/// Agent-side notification bus.
///
/// Owned by the agent loop; not shareable across threads. The dispatcher
/// borrows it for the duration of one tool call.
pub struct NotificationBus {
    notify_tx: mpsc::Sender<StreamNotify>,
    proceed_rx: mpsc::Receiver<bool>,
    decision_rx: mpsc::Receiver<UserDecision>,
    stack: StatusStack,
    cancel: CancellationToken,
}

impl NotificationBus {
    /// Create a connected bus/endpoint pair.
    pub fn channel(cancel: CancellationToken) -> (Self, UiEndpoint) {
        let (notify_tx, notify_rx) = mpsc::channel(256);
        let (proceed_tx, proceed_rx) = mpsc::channel(64);
        let (decision_tx, decision_rx) = mpsc::channel(8);
        (
            Self {
                notify_tx,
                proceed_rx,
                decision_rx,
                stack: StatusStack::default(),
                cancel,
            },
            UiEndpoint {
                notify_rx,
                proceed_tx,
                decision_tx,
            },
        )
    }

    /// Bus with a detached auto-acknowledging consumer.
    ///
    /// Used for sub-agents and headless runs where no UI renders the events;
    /// every rendezvous resolves immediately and decisions never arrive
    /// (callers run with auto-approve).
    pub fn auto_ack(cancel: CancellationToken) -> Self {
        let (bus, mut endpoint) = Self::channel(cancel.clone());
        tokio::spawn(async move {
            while let Some(notify) = endpoint.notify_rx.recv().await {
                if notify.status.is_fire_and_forget() {
                    continue;
                }
                if endpoint.proceed_tx.send(true).await.is_err() {
                    break;
                }
            }
        });
        bus
    }

    /// Publish a status transition and rendezvous with the UI.
    ///
    /// Opening states push onto the stack, `…Over` states pop their opener
    /// (LIFO order enforced). Fire-and-forget statuses return immediately
    /// after the send; everything else blocks until the UI acknowledges or
    /// the turn is cancelled.
    pub async fn change_to(
        &mut self,
        status: StreamStatus,
        data: Option<NotifyData>,
    ) -> anyhow::Result<()> {
        if status.over().is_some() {
            self.stack.push(status);
        } else if let Some(opener) = status.closes() {
            self.stack.pop(opener)?;
        }

        if self
            .notify_tx
            .send(StreamNotify { status, data })
            .await
            .is_err()
        {
            // UI went away; only cancellation can legitimately close the
            // channel mid-turn.
            return Err(AgentError::cancelled("notification channel closed").into());
        }

        if status.is_fire_and_forget() {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(AgentError::cancelled("turn cancelled while awaiting UI ack").into())
            }
            ack = self.proceed_rx.recv() => match ack {
                Some(_) => Ok(()),
                None => Err(AgentError::cancelled("UI acknowledgement channel closed").into()),
            },
        }
    }

    /// Publish a normal content chunk.
    pub async fn data(&mut self, chunk: impl Into<String>) -> anyhow::Result<()> {
        self.change_to(StreamStatus::Data, Some(NotifyData::Text(chunk.into())))
            .await
    }

    /// Publish a reasoning chunk.
    pub async fn reasoning_data(&mut self, chunk: impl Into<String>) -> anyhow::Result<()> {
        self.change_to(
            StreamStatus::Data,
            Some(NotifyData::Reasoning(chunk.into())),
        )
        .await
    }

    /// Fire-and-forget warning.
    pub async fn warn(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("{msg}");
        let _ = self
            .change_to(StreamStatus::Warn, Some(NotifyData::Message(msg)))
            .await;
    }

    /// Fire-and-forget error report.
    pub async fn error(&mut self, msg: impl Into<String>) {
        let _ = self
            .change_to(StreamStatus::Error, Some(NotifyData::Message(msg.into())))
            .await;
    }

    /// Await a user decision for a pending confirmation.
    ///
    /// Resolves to `Timeout` when the window elapses, the decision channel
    /// is gone, or the turn is cancelled.
    pub async fn await_decision(&mut self, window: Duration) -> UserDecision {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => UserDecision::Timeout,
            decision = tokio::time::timeout(window, self.decision_rx.recv()) => match decision {
                Ok(Some(d)) => d,
                Ok(None) | Err(_) => UserDecision::Timeout,
            },
        }
    }

    /// Top of the status stack, observable by the streaming state machine.
    pub fn current_status(&self) -> Option<StreamStatus> {
        self.stack.top()
    }

    /// Verify the stack unwound completely; called at turn end.
    pub fn ensure_balanced(&self) -> anyhow::Result<()> {
        if self.stack.is_empty() {
            Ok(())
        } else {
            bail!(
                "status stack not balanced at turn end: {:?} still open",
                self.stack.top()
            )
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
