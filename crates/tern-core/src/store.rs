// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Conversation persistence.
//!
//! The core's contract with any store: what `save` wrote and `load` read
//! back is the same message list, except that tool message bodies are
//! cleared before handing over — the tool-call record is preserved for
//! pairing, the bulky result text is not worth its tokens on resume.

use std::path::PathBuf;

use anyhow::Context;

use tern_model::Message;

pub trait ConversationStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Vec<Message>>;
    fn save(&self, messages: &[Message]) -> anyhow::Result<()>;
    /// Append messages without rewriting the file.
    fn push(&self, messages: &[Message]) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// Clone `messages` with tool bodies emptied, ready for persistence.
pub fn clear_tool_bodies(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .map(|m| match m {
            Message::Tool { tool_call_id, .. } => Message::tool(tool_call_id, ""),
            other => other.clone(),
        })
        .collect()
}

/// One JSON message per line, append-friendly.
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn ensure_parent(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        Ok(())
    }
}

impl ConversationStore for JsonlStore {
    fn load(&self) -> anyhow::Result<Vec<Message>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).with_context(|| format!("parsing line: {l}")))
            .collect()
    }

    fn save(&self, messages: &[Message]) -> anyhow::Result<()> {
        self.ensure_parent()?;
        let mut out = String::new();
        for m in messages {
            out.push_str(&serde_json::to_string(m)?);
            out.push('\n');
        }
        std::fs::write(&self.path, out).with_context(|| format!("writing {}", self.path.display()))
    }

    fn push(&self, messages: &[Message]) -> anyhow::Result<()> {
        use std::io::Write;
        self.ensure_parent()?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        for m in messages {
            writeln!(file, "{}", serde_json::to_string(m)?)?;
        }
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", self.path.display())),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use tern_model::ToolCallRecord;

    use super::*;

    fn sample() -> Vec<Message> {
        vec![
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant_full(
                Some("why".into()),
                Some("hello\n".into()),
                vec![ToolCallRecord {
                    id: "c1".into(),
                    name: "shell".into(),
                    arguments: r#"{"command":"ls"}"#.into(),
                }],
            ),
            Message::tool("c1", "a very long directory listing"),
        ]
    }

    fn store() -> (tempfile::TempDir, JsonlStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("conversation.jsonl"));
        (dir, store)
    }

    #[test]
    fn save_load_round_trips_modulo_tool_bodies() {
        let (_dir, store) = store();
        let original = sample();
        store.save(&clear_tool_bodies(&original)).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, clear_tool_bodies(&original));
        // Tool-call records survive; the tool body does not.
        assert_eq!(loaded[2].tool_calls().len(), 1);
        assert!(matches!(
            &loaded[3],
            Message::Tool { content, .. } if content.is_empty()
        ));
    }

    #[test]
    fn load_missing_file_is_empty() {
        let (_dir, store) = store();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn push_appends_to_existing_log() {
        let (_dir, store) = store();
        store.save(&[Message::user("first")]).unwrap();
        store.push(&[Message::assistant("second")]).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].as_text(), Some("second"));
    }

    #[test]
    fn clear_removes_the_log() {
        let (_dir, store) = store();
        store.save(&sample()).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn clear_tool_bodies_leaves_other_roles_alone() {
        let cleared = clear_tool_bodies(&sample());
        assert_eq!(cleared[1].as_text(), Some("hi"));
        assert_eq!(cleared[2].as_text(), Some("hello\n"));
    }
}
