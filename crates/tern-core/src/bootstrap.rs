// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Registry and agent wiring shared by the binary and the orchestrator.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use tern_config::{Config, ToolsConfig};
use tern_tools::{
    engine_from_config, ActivateSkillTool, AgentEntry, CitationLog, Citations, CopyTool,
    DeleteDirectoryTool, DeleteFileTool, EditFileTool, GetStateTool, ListAgentTool,
    ListDirectoryTool, ListMemoryTool, ListStateTool, MoveTool, ReadFileTool,
    ReadMultipleFilesTool, SaveMemoryTool, SearchFilesTool, SearchTextTool, SetStateTool,
    SharedState, ShellTool, SwitchAgentTool, ToolRegistry, WebFetchTool, WebSearchTool,
    WriteFileTool,
};

use crate::{
    agent::Agent,
    call_agent::CallAgentTool,
    orchestrator::{profile_entries, Orchestrator},
    status::NotificationBus,
    store::ConversationStore,
};

/// Build the standard tool registry.
///
/// `call_agent` is present only when an orchestrator handle is supplied —
/// the main agent gets one, sub-agents do not.
pub fn build_registry(
    tools: &ToolsConfig,
    agents: &[AgentEntry],
    state: Arc<SharedState>,
    agent_name: &str,
    citations: Citations,
    call_agent: Option<CallAgentTool>,
) -> ToolRegistry {
    let mut reg = ToolRegistry::new();

    // Filesystem readers.
    reg.register(ReadFileTool);
    reg.register(ReadMultipleFilesTool);
    reg.register(ListDirectoryTool);
    reg.register(SearchFilesTool);
    reg.register(SearchTextTool);

    // Filesystem mutators.
    reg.register(WriteFileTool);
    reg.register(EditFileTool);
    reg.register(DeleteFileTool);
    reg.register(DeleteDirectoryTool);
    reg.register(MoveTool);
    reg.register(CopyTool);

    reg.register(ShellTool {
        timeout_secs: tools.timeout_secs,
    });

    // Web.
    let engine = engine_from_config(&tools.web.search);
    reg.register(WebSearchTool::new(engine, Arc::clone(&citations)));
    reg.register(WebFetchTool::new(tools.web.fetch_max_chars, citations));

    // Memory.
    reg.register(ListMemoryTool {
        memory_file: tools.memory.memory_file.clone(),
    });
    reg.register(SaveMemoryTool {
        memory_file: tools.memory.memory_file.clone(),
    });

    // Agent control.
    reg.register(SwitchAgentTool::new(agents.to_vec()));
    reg.register(ListAgentTool::new(agents.to_vec()));

    // Shared state.
    reg.register(GetStateTool::new(Arc::clone(&state)));
    reg.register(SetStateTool::new(Arc::clone(&state), agent_name));
    reg.register(ListStateTool::new(state));

    if let Some(dir) = &tools.skills_dir {
        reg.register(ActivateSkillTool::new(dir.as_str()));
    }

    if let Some(tool) = call_agent {
        reg.register(tool);
    }

    reg
}

/// Assemble the main agent from configuration: adapter, shared state,
/// orchestrator, registry, and bus, all wired together.
///
/// Returns the agent plus the UI endpoint for the console collaborator.
pub fn build_main_agent(
    config: &Config,
    store: Option<Arc<dyn ConversationStore>>,
) -> anyhow::Result<(Agent, crate::status::UiEndpoint)> {
    let adapter = tern_model::from_profile(&config.model)?;
    let cancel = CancellationToken::new();
    let state = Arc::new(SharedState::new());
    let citations: Citations = Arc::new(Mutex::new(CitationLog::default()));

    let orchestrator = Arc::new(Orchestrator::new(
        config.agents.clone(),
        config.model.clone(),
        Arc::new(config.agent.clone()),
        config.tools.clone(),
        Arc::clone(&state),
    ));

    let registry = build_registry(
        &config.tools,
        &profile_entries(&config.agents),
        state,
        "main",
        Arc::clone(&citations),
        Some(CallAgentTool::new(orchestrator, cancel.clone())),
    );

    let (bus, endpoint) = NotificationBus::channel(cancel.clone());

    let mut agent = Agent::new(
        "main",
        Arc::from(adapter),
        config.model.clone(),
        Arc::new(registry),
        Arc::new(config.agent.clone()),
        bus,
        cancel,
    )
    .with_citations(citations);
    if let Some(store) = store {
        agent = agent.with_store(store);
    }

    Ok((agent, endpoint))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn citations() -> Citations {
        Arc::new(Mutex::new(CitationLog::default()))
    }

    #[test]
    fn registry_contains_the_full_tool_surface() {
        let reg = build_registry(
            &ToolsConfig::default(),
            &[],
            Arc::new(SharedState::new()),
            "main",
            citations(),
            None,
        );
        for name in [
            "write_file",
            "edit_file",
            "delete_file",
            "delete_directory",
            "move",
            "copy",
            "read_file",
            "read_multiple_files",
            "list_directory",
            "search_files",
            "search_text_in_file",
            "shell",
            "web_fetch",
            "web_search",
            "list_memory",
            "save_memory",
            "switch_agent",
            "list_agent",
            "get_state",
            "set_state",
            "list_state",
        ] {
            assert!(reg.contains(name), "registry is missing '{name}'");
        }
        // No orchestrator handle, no fan-out tool.
        assert!(!reg.contains("call_agent"));
    }

    #[test]
    fn skills_tool_requires_configured_directory() {
        let mut tools = ToolsConfig::default();
        assert!(!build_registry(
            &tools,
            &[],
            Arc::new(SharedState::new()),
            "main",
            citations(),
            None
        )
        .contains("activate_skill"));

        tools.skills_dir = Some("/tmp/tern-skills".into());
        assert!(build_registry(
            &tools,
            &[],
            Arc::new(SharedState::new()),
            "main",
            citations(),
            None
        )
        .contains("activate_skill"));
    }

    #[test]
    fn main_agent_builds_from_default_config_with_mock_model() {
        let mut config = Config::default();
        config.model.provider = "mock".into();
        let (agent, _endpoint) = build_main_agent(&config, None).unwrap();
        assert_eq!(agent.name, "main");
    }
}
