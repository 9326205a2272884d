// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! MCP client capability.
//!
//! The transport lives outside the core; the agent only needs to know which
//! tool names belong to a connected MCP server (so the streaming state
//! machine does not drop them as spurious) and how to invoke one.

use async_trait::async_trait;

#[async_trait]
pub trait McpClient: Send + Sync {
    /// True when `name` is a tool served by this client.
    fn has_tool(&self, name: &str) -> bool;

    /// Names of all served tools.
    fn tool_names(&self) -> Vec<String>;

    /// Invoke a served tool and return its text result.
    async fn call(&self, name: &str, args: serde_json::Value) -> anyhow::Result<String>;
}

/// Static in-process client used in tests.
#[derive(Default)]
pub struct StaticMcpClient {
    pub tools: Vec<String>,
}

#[async_trait]
impl McpClient for StaticMcpClient {
    fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t == name)
    }

    fn tool_names(&self) -> Vec<String> {
        self.tools.clone()
    }

    async fn call(&self, name: &str, _args: serde_json::Value) -> anyhow::Result<String> {
        if self.has_tool(name) {
            Ok(format!("[mcp:{name}] ok"))
        } else {
            anyhow::bail!("no such MCP tool: {name}")
        }
    }
}
