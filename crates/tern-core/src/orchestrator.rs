// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Sub-agent orchestrator: runs a batch of task nodes as a DAG.
//!
//! Dependencies must reference earlier tasks in the batch, which keeps the
//! graph acyclic by construction. A bounded worker pool pulls nodes whose
//! inputs are available; each node runs a fresh child agent built from its
//! named profile with auto-approve on and the parent's shared state. A
//! node's output lands in the shared state under its task key — and on disk
//! as a per-task artifact — before any dependent starts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use tern_config::{AgentConfig, AgentProfile, ModelProfile, ToolsConfig};
use tern_tools::{AgentEntry, CitationLog, SharedState};

use crate::{agent::Agent, bootstrap, status::NotificationBus};

/// One work item of a `call_agent` invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    pub task_key: String,
    pub agent_name: String,
    pub instruction: String,
    /// Task keys whose outputs this node consumes.
    #[serde(default)]
    pub input_keys: Vec<String>,
    /// When true, wait for every earlier task in the batch to finish
    /// (succeed or fail) before starting.
    #[serde(default)]
    pub wait_for_all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Final per-task record returned to the caller.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task_key: String,
    pub state: TaskState,
    /// One-line outcome description (error text, byte count, "timeout").
    pub detail: String,
    pub result_path: Option<PathBuf>,
}

pub struct Orchestrator {
    profiles: HashMap<String, AgentProfile>,
    default_model: ModelProfile,
    agent_config: Arc<AgentConfig>,
    tools_config: ToolsConfig,
    state: Arc<SharedState>,
    artifacts_dir: PathBuf,
    max_workers: usize,
}

impl Orchestrator {
    pub fn new(
        profiles: HashMap<String, AgentProfile>,
        default_model: ModelProfile,
        agent_config: Arc<AgentConfig>,
        tools_config: ToolsConfig,
        state: Arc<SharedState>,
    ) -> Self {
        let artifacts_dir = agent_config
            .artifacts_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(std::env::temp_dir)
                    .join("tern/tasks")
            });
        let max_workers = agent_config.max_workers_paralleled.max(1);
        Self {
            profiles,
            default_model,
            agent_config,
            tools_config,
            state,
            artifacts_dir,
            max_workers,
        }
    }

    pub fn shared_state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    /// Validate a batch: non-empty, unique keys, dependencies referencing
    /// earlier tasks only (which makes the graph acyclic).
    fn validate(specs: &[TaskSpec]) -> anyhow::Result<()> {
        anyhow::ensure!(!specs.is_empty(), "task batch is empty");
        let mut seen: Vec<&str> = Vec::with_capacity(specs.len());
        for spec in specs {
            anyhow::ensure!(
                !spec.task_key.is_empty(),
                "task_key must not be empty"
            );
            anyhow::ensure!(
                !seen.contains(&spec.task_key.as_str()),
                "duplicate task_key '{}'",
                spec.task_key
            );
            for dep in &spec.input_keys {
                anyhow::ensure!(
                    seen.contains(&dep.as_str()),
                    "task '{}' depends on '{}', which is not an earlier task in the \
                     batch; dependencies must reference prior tasks (no cycles)",
                    spec.task_key,
                    dep
                );
            }
            seen.push(&spec.task_key);
        }
        Ok(())
    }

    /// Execute the batch and return one report per task, in batch order.
    pub async fn run_batch(
        self: &Arc<Self>,
        specs: Vec<TaskSpec>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<TaskReport>> {
        Self::validate(&specs)?;

        let run_dir = self.artifacts_dir.join(format!("run-{}", Uuid::new_v4()));
        let child_cancel = cancel.child_token();
        let deadline = tokio::time::Instant::now() + timeout;

        let mut states: HashMap<String, TaskState> = specs
            .iter()
            .map(|s| (s.task_key.clone(), TaskState::Pending))
            .collect();
        let mut details: HashMap<String, String> = HashMap::new();
        let mut paths: HashMap<String, PathBuf> = HashMap::new();

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut pool: JoinSet<(String, Result<String, String>)> = JoinSet::new();

        'schedule: loop {
            // Promote pending nodes whose inputs are satisfied.
            for (idx, spec) in specs.iter().enumerate() {
                if states[&spec.task_key] != TaskState::Pending {
                    continue;
                }
                if spec.wait_for_all {
                    let all_prior_terminal = specs[..idx]
                        .iter()
                        .all(|p| states[&p.task_key].is_terminal());
                    if all_prior_terminal {
                        states.insert(spec.task_key.clone(), TaskState::Ready);
                    }
                    continue;
                }
                let mut blocked = false;
                let mut dead = None;
                for dep in &spec.input_keys {
                    if self.state.contains(dep) {
                        continue;
                    }
                    if states[dep].is_terminal() {
                        // The dependency finished without publishing output;
                        // this node can never start.
                        dead = Some(dep.clone());
                    }
                    blocked = true;
                }
                if let Some(dep) = dead {
                    let msg = format!("dependency '{dep}' produced no output");
                    self.state.set(
                        &format!("{}:error", spec.task_key),
                        &msg,
                        "orchestrator",
                        "text/plain",
                    );
                    details.insert(spec.task_key.clone(), msg);
                    states.insert(spec.task_key.clone(), TaskState::Failed);
                } else if !blocked {
                    states.insert(spec.task_key.clone(), TaskState::Ready);
                }
            }

            // Hand ready nodes to the pool.
            for spec in &specs {
                if states[&spec.task_key] != TaskState::Ready {
                    continue;
                }
                states.insert(spec.task_key.clone(), TaskState::Running);
                let this = Arc::clone(self);
                let spec = spec.clone();
                let permits = Arc::clone(&semaphore);
                let token = child_cancel.clone();
                pool.spawn(async move {
                    let _permit = permits.acquire_owned().await.ok();
                    let key = spec.task_key.clone();
                    debug!(task = %key, agent = %spec.agent_name, "starting sub-agent task");
                    (key, this.run_child(spec, token).await)
                });
            }

            let open_count = states.values().filter(|s| !s.is_terminal()).count();
            if open_count == 0 {
                break;
            }
            if pool.is_empty() {
                // Non-terminal nodes remain but nothing is running: they are
                // unreachable (dependency never produced output and was not
                // flagged above, e.g. waiting on a cancelled task).
                for spec in &specs {
                    if !states[&spec.task_key].is_terminal() {
                        details.insert(
                            spec.task_key.clone(),
                            "dependencies never became available".into(),
                        );
                        states.insert(spec.task_key.clone(), TaskState::Failed);
                    }
                }
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("sub-agent batch cancelled by parent");
                    child_cancel.cancel();
                    mark_open_cancelled(&specs, &mut states, &mut details, "cancelled");
                    break 'schedule;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!("sub-agent batch timed out");
                    child_cancel.cancel();
                    mark_open_cancelled(&specs, &mut states, &mut details, "timeout");
                    break 'schedule;
                }
                joined = pool.join_next() => {
                    let Some(joined) = joined else { continue };
                    let (key, result) = match joined {
                        Ok(r) => r,
                        Err(e) => {
                            warn!("sub-agent task panicked: {e}");
                            continue;
                        }
                    };
                    let creator = specs
                        .iter()
                        .find(|s| s.task_key == key)
                        .map(|s| s.agent_name.as_str())
                        .unwrap_or("orchestrator");
                    match result {
                        Ok(output) => {
                            // Output becomes visible to dependents before any
                            // of them is promoted to Ready.
                            self.state.set(&key, &output, creator, "text/markdown");
                            let path = self.write_artifact(&run_dir, &key, &output);
                            details.insert(
                                key.clone(),
                                format!("{} bytes of output", output.len()),
                            );
                            if let Some(p) = path {
                                paths.insert(key.clone(), p);
                            }
                            states.insert(key, TaskState::Succeeded);
                        }
                        Err(err) => {
                            self.state.set(
                                &format!("{key}:error"),
                                &err,
                                "orchestrator",
                                "text/plain",
                            );
                            details.insert(key.clone(), err);
                            states.insert(key, TaskState::Failed);
                        }
                    }
                }
            }
        }

        pool.abort_all();

        Ok(specs
            .iter()
            .map(|s| TaskReport {
                task_key: s.task_key.clone(),
                state: states[&s.task_key],
                detail: details.get(&s.task_key).cloned().unwrap_or_default(),
                result_path: paths.get(&s.task_key).cloned(),
            })
            .collect())
    }

    /// Run one child agent to completion and return its final text.
    async fn run_child(
        self: Arc<Self>,
        spec: TaskSpec,
        cancel: CancellationToken,
    ) -> Result<String, String> {
        let profile = self
            .profiles
            .get(&spec.agent_name)
            .ok_or_else(|| format!("unknown agent profile '{}'", spec.agent_name))?;

        let model = profile
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let adapter = tern_model::from_profile(&model).map_err(|e| e.to_string())?;

        let mut cfg = (*self.agent_config).clone();
        // Children never prompt the user.
        cfg.auto_approve = true;
        if let Some(t) = profile.thinking {
            cfg.thinking = t;
        }
        if let Some(sp) = &profile.system_prompt {
            cfg.system_prompt = Some(sp.clone());
        }

        let citations = Arc::new(Mutex::new(CitationLog::default()));
        let mut registry = bootstrap::build_registry(
            &self.tools_config,
            &profile_entries(&self.profiles),
            Arc::clone(&self.state),
            &spec.agent_name,
            Arc::clone(&citations),
            // Sub-agents may not fan out further.
            None,
        );
        if let Some(allowed) = &profile.tools {
            registry.restrict_to(allowed);
        }

        let bus = NotificationBus::auto_ack(cancel.clone());
        let mut agent = Agent::new(
            &spec.agent_name,
            Arc::from(adapter),
            model,
            Arc::new(registry),
            Arc::new(cfg),
            bus,
            cancel,
        )
        .with_citations(citations);

        let instruction = self.compose_instruction(&spec);
        match agent.run_turn(&instruction, Vec::new()).await {
            Ok(outcome) => Ok(outcome.final_text),
            Err(e) => Err(format!("{e:#}")),
        }
    }

    /// Prefix the node's instruction with its labelled inputs.
    fn compose_instruction(&self, spec: &TaskSpec) -> String {
        let mut text = String::new();
        for key in &spec.input_keys {
            if let Some(entry) = self.state.get(key) {
                text.push_str(&format!("### Input '{key}'\n{}\n\n", entry.value));
            }
        }
        text.push_str(&spec.instruction);
        text
    }

    fn write_artifact(&self, run_dir: &PathBuf, key: &str, output: &str) -> Option<PathBuf> {
        if std::fs::create_dir_all(run_dir).is_err() {
            return None;
        }
        let path = run_dir.join(format!("{key}.md"));
        match std::fs::write(&path, output) {
            Ok(_) => Some(path),
            Err(e) => {
                warn!(task = key, "failed to write task artifact: {e}");
                None
            }
        }
    }
}

fn mark_open_cancelled(
    specs: &[TaskSpec],
    states: &mut HashMap<String, TaskState>,
    details: &mut HashMap<String, String>,
    reason: &str,
) {
    for spec in specs {
        if !states[&spec.task_key].is_terminal() {
            states.insert(spec.task_key.clone(), TaskState::Cancelled);
            details.insert(spec.task_key.clone(), reason.to_string());
        }
    }
}

/// Profiles as list entries for the agent-control tools.
pub fn profile_entries(profiles: &HashMap<String, AgentProfile>) -> Vec<AgentEntry> {
    let mut entries: Vec<AgentEntry> = profiles
        .iter()
        .map(|(name, p)| AgentEntry {
            name: name.clone(),
            description: p.description.clone(),
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

/// Render the parent-facing summary of a finished batch.
///
/// Deliberately compact: counts plus a one-liner per task. Full outputs stay
/// in the shared state where `get_state` can fetch them.
pub fn render_summary(reports: &[TaskReport]) -> String {
    let count = |state: TaskState| reports.iter().filter(|r| r.state == state).count();
    let mut text = format!(
        "{} task(s): {} succeeded, {} failed, {} cancelled\n",
        reports.len(),
        count(TaskState::Succeeded),
        count(TaskState::Failed),
        count(TaskState::Cancelled),
    );
    for r in reports {
        let detail = r.detail.lines().next().unwrap_or("");
        if detail.is_empty() {
            text.push_str(&format!("- {}: {}\n", r.task_key, r.state));
        } else {
            text.push_str(&format!("- {}: {} — {}\n", r.task_key, r.state, detail));
        }
    }
    text.push_str("Use get_state(<task_key>) for the full result of a task.");
    text
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
