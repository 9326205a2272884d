// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod registry;
pub mod state;
pub mod tool;

pub use registry::{ToolRegistry, ToolSchema};
pub use state::{SharedState, StateEntry};
pub use tool::{ProgressKind, Tool, ToolCall, ToolOutput, ToolSignal};

pub use builtin::agents::{AgentEntry, ListAgentTool, SwitchAgentTool};
pub use builtin::fs_delete::{DeleteDirectoryTool, DeleteFileTool};
pub use builtin::fs_edit::EditFileTool;
pub use builtin::fs_move::{CopyTool, MoveTool};
pub use builtin::fs_read::{ReadFileTool, ReadMultipleFilesTool};
pub use builtin::fs_write::WriteFileTool;
pub use builtin::list_dir::ListDirectoryTool;
pub use builtin::memory::{ListMemoryTool, SaveMemoryTool};
pub use builtin::search::{SearchFilesTool, SearchTextTool};
pub use builtin::shell::ShellTool;
pub use builtin::skill::ActivateSkillTool;
pub use builtin::state_tools::{GetStateTool, ListStateTool, SetStateTool};
pub use builtin::web_fetch::WebFetchTool;
pub use builtin::web_search::{
    engine_from_config, BraveSearch, CitationLog, Citations, MockSearch, Reference, SearchEngine,
    SearchResult, WebSearchTool,
};
