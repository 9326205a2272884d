// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tern_config::{AgentConfig, ModelProfile, ThinkingLevel};
use tern_model::{
    AdapterError, ContentPart, Message, ProviderAdapter, StreamRequest, ToolCallRecord,
    ToolSchema, UsageReport,
};
use tern_tools::{CitationLog, Citations, ToolRegistry};

use crate::{
    context::ContextWindowManager,
    dispatch::ToolDispatcher,
    error::{as_switch_agent, is_user_cancel, AgentError},
    mcp::McpClient,
    prompts,
    session::Session,
    status::{NotificationBus, NotifyData, StreamStatus},
    store::{clear_tool_bodies, ConversationStore},
    stream::collect_stream,
};

/// Accumulated token usage over one turn.
#[derive(Debug, Default, Clone, Copy)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_prompt_tokens: u64,
    pub reasoning_tokens: u64,
    pub total_tokens: u64,
}

impl UsageTotals {
    fn add(&mut self, u: UsageReport) {
        // When the provider does not include cached tokens in the prompt
        // count, they are billed on top of it.
        let extra_cached = if u.cached_included_in_prompt {
            0
        } else {
            u.cached_prompt_tokens
        };
        self.prompt_tokens += u64::from(u.prompt_tokens) + u64::from(extra_cached);
        self.completion_tokens += u64::from(u.completion_tokens);
        self.cached_prompt_tokens += u64::from(u.cached_prompt_tokens);
        self.reasoning_tokens += u64::from(u.reasoning_tokens);
        self.total_tokens += u64::from(u.total_tokens);
    }
}

/// What one user turn produced.
#[derive(Debug, Default)]
pub struct TurnOutcome {
    pub final_text: String,
    pub rounds: u32,
    pub truncated: bool,
    pub usage: UsageTotals,
}

/// The core agent: one conversation, one provider adapter, one tool set.
///
/// Constructed per conversation; `run_turn` drives one user prompt to
/// completion through the model ↔ tool loop. The agent exclusively owns its
/// message list while a turn is in flight.
pub struct Agent {
    pub name: String,
    adapter: Arc<dyn ProviderAdapter>,
    profile: ModelProfile,
    registry: Arc<ToolRegistry>,
    dispatcher: ToolDispatcher,
    session: Session,
    config: Arc<AgentConfig>,
    thinking: ThinkingLevel,
    bus: NotificationBus,
    cancel: CancellationToken,
    store: Option<Arc<dyn ConversationStore>>,
    citations: Citations,
    context: ContextWindowManager,
    mcp: Option<Arc<dyn McpClient>>,
    system_prompt: String,
    running: bool,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        adapter: Arc<dyn ProviderAdapter>,
        profile: ModelProfile,
        registry: Arc<ToolRegistry>,
        config: Arc<AgentConfig>,
        bus: NotificationBus,
        cancel: CancellationToken,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(
            Arc::clone(&registry),
            config.auto_approve,
            std::time::Duration::from_secs(config.confirm_timeout_secs),
        );
        let context = ContextWindowManager::for_model(
            adapter.model_id(),
            profile.max_tokens.unwrap_or(4096),
        );
        let system_prompt = prompts::system_prompt(config.system_prompt.as_deref());
        let thinking = config.thinking;
        Self {
            name: name.into(),
            adapter,
            profile,
            registry,
            dispatcher,
            session: Session::new(),
            config,
            thinking,
            bus,
            cancel,
            store: None,
            citations: Arc::new(Mutex::new(CitationLog::default())),
            context,
            mcp: None,
            system_prompt,
            running: false,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share the citation log written by the web tools in the registry.
    pub fn with_citations(mut self, citations: Citations) -> Self {
        self.citations = citations;
        self
    }

    pub fn with_mcp(mut self, mcp: Arc<dyn McpClient>) -> Self {
        self.mcp = Some(mcp);
        self
    }

    /// Token for cancelling this agent's in-flight turn from another task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Override the context window manager (tests, live-probed windows).
    pub fn context_window_mut(&mut self) -> &mut ContextWindowManager {
        &mut self.context
    }

    /// Pre-load history (resume). System messages are stripped; the correct
    /// system prompt is reconciled on the next turn.
    pub fn seed_history(&mut self, messages: Vec<Message>) {
        let msgs: Vec<Message> = messages.into_iter().filter(|m| !m.is_system()).collect();
        self.session.replace_messages(msgs);
    }

    /// Run one user turn to completion.
    ///
    /// Appends exactly one user message, then alternates model calls and
    /// tool dispatches until the model stops calling tools or the recursion
    /// budget runs out. The message list is persisted at the end (and at
    /// every early exit) — persistence failure is surfaced as a warning, it
    /// never rolls back in-memory state.
    pub async fn run_turn(
        &mut self,
        prompt: &str,
        attachments: Vec<ContentPart>,
    ) -> anyhow::Result<TurnOutcome> {
        anyhow::ensure!(
            !self.running,
            "agent '{}' is already running a turn",
            self.name
        );
        self.running = true;
        let result = self.run_turn_inner(prompt, attachments).await;
        self.running = false;

        if let Err(e) = &result {
            // Sentinels propagate silently; everything else is operational
            // and reported on the bus.
            if as_switch_agent(e).is_none() && !is_user_cancel(e) {
                self.bus.error(format!("{e:#}")).await;
            }
        }
        result
    }

    async fn run_turn_inner(
        &mut self,
        prompt: &str,
        attachments: Vec<ContentPart>,
    ) -> anyhow::Result<TurnOutcome> {
        if let Err(problem) = tern_model::verify_pairing(&self.session.messages) {
            anyhow::bail!("conversation invariant violated: {problem}");
        }
        self.session.reconcile_system_prompt(&self.system_prompt.clone());

        if attachments.is_empty() {
            self.session.push(Message::user(prompt));
        } else {
            let mut parts = vec![ContentPart::text(prompt)];
            parts.extend(attachments);
            self.session.push(Message::user_with_parts(parts));
        }

        let schemas = self.registry.schemas();
        let overhead = self.schema_overhead(&schemas);

        let mut outcome = TurnOutcome::default();
        let mut thinking = self.thinking;

        loop {
            if outcome.rounds >= self.config.max_tool_rounds {
                self.bus
                    .warn(format!(
                        "tool-call budget exhausted after {} rounds; ending the turn",
                        self.config.max_tool_rounds
                    ))
                    .await;
                break;
            }
            outcome.rounds += 1;

            let fit = self.context.fit(&mut self.session.messages, overhead);
            if fit.truncated() {
                outcome.truncated = true;
                self.bus
                    .warn("conversation was truncated to fit the context window")
                    .await;
            }

            self.bus.change_to(StreamStatus::Processing, None).await?;

            let stream = match self.open_stream(&schemas, thinking).await {
                Ok(s) => s,
                Err(AdapterError::ThinkingUnsupported { model })
                    if thinking != ThinkingLevel::Off =>
                {
                    debug!(model = %model, "thinking not supported; retrying without");
                    // Remember the downgrade for the rest of this turn.
                    thinking = ThinkingLevel::Off;
                    self.open_stream(&schemas, thinking)
                        .await
                        .map_err(anyhow::Error::from)?
                }
                Err(e) => return Err(e.into()),
            };

            self.bus.change_to(StreamStatus::Started, None).await?;

            let registry = Arc::clone(&self.registry);
            let mcp = self.mcp.clone();
            let known = move |name: &str| {
                registry.contains(name) || mcp.as_ref().is_some_and(|m| m.has_tool(name))
            };
            let cancel = self.cancel.clone();
            let step = collect_stream(stream, &mut self.bus, &known, &cancel).await?;

            if let Some(usage) = step.usage {
                outcome.usage.add(usage);
                self.bus
                    .change_to(StreamStatus::Data, Some(NotifyData::Usage(usage)))
                    .await?;
            }

            let calls = step.tool_calls.clone();
            if step.reasoning.is_some() || step.content.is_some() || !calls.is_empty() {
                self.session.push(Message::assistant_full(
                    step.reasoning,
                    step.content.clone(),
                    step.tool_calls,
                ));
            }
            if let Some(text) = step.content {
                outcome.final_text = text;
            }

            if step.cancelled {
                self.persist().await;
                return Err(AgentError::cancelled("turn cancelled during streaming").into());
            }

            if calls.is_empty() {
                break;
            }

            for (i, call) in calls.iter().enumerate() {
                let result = if self.is_mcp_call(&call.name) {
                    self.execute_mcp(call).await
                } else {
                    self.dispatcher.execute_one(call, &mut self.bus).await
                };

                match result {
                    Ok((tool_msg, signal)) => {
                        self.session.push(tool_msg);
                        if let Some(sig) = signal {
                            // Orphaned calls after this one are paired with
                            // synthetic results before the sentinel leaves
                            // the loop.
                            self.pair_remaining(
                                &calls[i + 1..],
                                "Error: not executed; the conversation was handed over \
                                 before this call ran",
                            );
                            self.persist().await;
                            return Err(AgentError::from(sig).into());
                        }
                    }
                    Err(e) => {
                        self.session
                            .push(Message::tool(&call.id, format!("Error: {e}")));
                        self.pair_remaining(
                            &calls[i + 1..],
                            "Error: not executed; the turn ended before this call ran",
                        );
                        self.persist().await;
                        return Err(e);
                    }
                }
            }
        }

        self.flush_citations().await?;
        self.bus.change_to(StreamStatus::Finished, None).await?;
        self.bus.ensure_balanced()?;
        self.persist().await;
        Ok(outcome)
    }

    async fn open_stream(
        &self,
        schemas: &[tern_tools::ToolSchema],
        thinking: ThinkingLevel,
    ) -> Result<tern_model::DeltaStream, AdapterError> {
        let tools: Vec<ToolSchema> = schemas
            .iter()
            .map(|s| ToolSchema {
                name: s.name.clone(),
                description: s.description.clone(),
                parameters: s.parameters.clone(),
            })
            .collect();
        let req = StreamRequest {
            messages: self.session.messages.clone(),
            tools,
            thinking,
            temperature: self.profile.temperature,
            top_p: self.profile.top_p,
            max_tokens: self.profile.max_tokens,
        };
        self.adapter.stream(req).await
    }

    fn is_mcp_call(&self, name: &str) -> bool {
        !self.registry.contains(name) && self.mcp.as_ref().is_some_and(|m| m.has_tool(name))
    }

    async fn execute_mcp(
        &mut self,
        call: &ToolCallRecord,
    ) -> anyhow::Result<(Message, Option<tern_tools::ToolSignal>)> {
        let mcp = self.mcp.clone().expect("mcp call without client");
        let args: Value =
            serde_json::from_str(&call.arguments).unwrap_or(Value::Object(Default::default()));

        self.bus
            .change_to(
                StreamStatus::FunctionCalling,
                Some(NotifyData::FunctionCall {
                    function: call.name.clone(),
                    args: args.clone(),
                }),
            )
            .await?;
        let result = mcp.call(&call.name, args).await;
        self.bus
            .change_to(StreamStatus::FunctionCallingOver, None)
            .await?;

        let body = match result {
            Ok(text) => text,
            Err(e) => format!("Error: {e}"),
        };
        Ok((Message::tool(&call.id, body), None))
    }

    /// Pair every not-yet-answered call with a synthetic tool result.
    fn pair_remaining(&mut self, calls: &[ToolCallRecord], body: &str) {
        for call in calls {
            self.session.push(Message::tool(&call.id, body));
        }
    }

    /// Render collected citations as a final data block, then reset the log
    /// for the next turn.
    async fn flush_citations(&mut self) -> anyhow::Result<()> {
        let rendered = {
            let mut log = self.citations.lock().expect("citation lock poisoned");
            if log.references.is_empty() {
                None
            } else {
                let mut text = String::from("Sources:\n");
                let mut seen = Vec::new();
                for r in &log.references {
                    if seen.contains(&r.url) {
                        continue;
                    }
                    seen.push(r.url.clone());
                    text.push_str(&format!("- {} ({})\n", r.title, r.url));
                }
                log.queries.clear();
                log.references.clear();
                Some(text)
            }
        };
        if let Some(text) = rendered {
            self.bus
                .change_to(StreamStatus::Data, Some(NotifyData::Message(text)))
                .await?;
        }
        Ok(())
    }

    fn schema_overhead(&self, schemas: &[tern_tools::ToolSchema]) -> usize {
        let chars: usize = schemas
            .iter()
            .map(|s| s.name.len() + s.description.len() + s.parameters.to_string().len())
            .sum();
        tern_model::catalog::estimate_tokens(self.adapter.model_id(), chars)
    }

    /// Best-effort persistence; tool bodies are cleared before handing the
    /// list to the store.
    async fn persist(&mut self) {
        let Some(store) = self.store.clone() else {
            return;
        };
        if let Err(e) = store.save(&clear_tool_bodies(&self.session.messages)) {
            self.bus.warn(format!("failed to persist conversation: {e}")).await;
        }
    }
}
