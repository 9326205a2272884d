// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::require_str;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Load a named skill file into the conversation.
///
/// Skills are markdown instruction files stored in the configured skills
/// directory; activating one returns its full content so the model can
/// follow it for the rest of the turn.
pub struct ActivateSkillTool {
    skills_dir: PathBuf,
}

impl ActivateSkillTool {
    pub fn new(skills_dir: impl Into<PathBuf>) -> Self {
        Self {
            skills_dir: skills_dir.into(),
        }
    }

    fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.skills_dir)
            .map(|rd| {
                rd.filter_map(Result::ok)
                    .filter_map(|e| {
                        let name = e.file_name().to_string_lossy().into_owned();
                        name.strip_suffix(".md").map(str::to_string)
                    })
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[async_trait]
impl Tool for ActivateSkillTool {
    fn name(&self) -> &str {
        "activate_skill"
    }

    fn description(&self) -> &str {
        "Load a named skill (a markdown instruction file) and return its \
         content. Follow the returned instructions for the remainder of the \
         task. Pass name='list' to enumerate available skills."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Skill name (file name without .md), or 'list'"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let name = match require_str(&call.args, "name") {
            Ok(n) => n.to_string(),
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        if name == "list" {
            let names = self.available();
            return if names.is_empty() {
                ToolOutput::ok(&call.id, "no skills available")
            } else {
                ToolOutput::ok(&call.id, names.join("\n"))
            };
        }

        // Reject path traversal; skills are flat files in one directory.
        if name.contains('/') || name.contains("..") {
            return ToolOutput::err(&call.id, "invalid skill name");
        }

        let path = self.skills_dir.join(format!("{name}.md"));
        debug!(path = %path.display(), "activate_skill tool");
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => ToolOutput::ok(&call.id, content),
            Err(_) => {
                let names = self.available();
                let hint = if names.is_empty() {
                    "no skills are installed".to_string()
                } else {
                    format!("available: {}", names.join(", "))
                };
                ToolOutput::err(&call.id, format!("unknown skill '{name}'; {hint}"))
            }
        }
    }
}
