// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use tern_model::Message;
use uuid::Uuid;

/// In-memory conversation session.
///
/// Owned exclusively by one agent while a turn is in flight; the message
/// list is handed to the persistence collaborator only at save points.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub messages: Vec<Message>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// Replace the message list (resume, edit-and-resubmit).
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Total character weight of the session, for token estimation.
    pub fn approx_chars(&self) -> usize {
        self.messages.iter().map(|m| m.approx_chars()).sum()
    }

    /// Reconcile the system prompt at index 0.
    ///
    /// If a system message exists and does not already contain `prompt`, the
    /// prompt is appended on a new line — prior system context is preserved
    /// across turns without duplication. If no system message exists and the
    /// prompt is non-empty, one is inserted at index 0.
    pub fn reconcile_system_prompt(&mut self, prompt: &str) {
        match self.messages.first_mut() {
            Some(Message::System { content }) => {
                if !prompt.is_empty() && !content.contains(prompt) {
                    content.push('\n');
                    content.push_str(prompt);
                }
            }
            _ => {
                if !prompt.is_empty() {
                    self.messages.insert(0, Message::system(prompt));
                }
            }
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sessions_have_unique_ids() {
        assert_ne!(Session::new().id, Session::new().id);
    }

    #[test]
    fn reconcile_inserts_system_message_when_absent() {
        let mut s = Session::new();
        s.push(Message::user("hi"));
        s.reconcile_system_prompt("be brief");
        assert_eq!(s.messages[0].as_text(), Some("be brief"));
        assert!(s.messages[0].is_system());
    }

    #[test]
    fn reconcile_appends_new_prompt_to_existing_system() {
        let mut s = Session::new();
        s.push(Message::system("original"));
        s.reconcile_system_prompt("addendum");
        assert_eq!(s.messages[0].as_text(), Some("original\naddendum"));
        assert_eq!(s.messages.len(), 1);
    }

    #[test]
    fn reconcile_does_not_duplicate_contained_prompt() {
        let mut s = Session::new();
        s.push(Message::system("rules: be brief"));
        s.reconcile_system_prompt("be brief");
        assert_eq!(s.messages[0].as_text(), Some("rules: be brief"));
    }

    #[test]
    fn reconcile_empty_prompt_is_a_no_op() {
        let mut s = Session::new();
        s.reconcile_system_prompt("");
        assert!(s.messages.is_empty());
    }

    #[test]
    fn approx_chars_sums_messages() {
        let mut s = Session::new();
        s.push(Message::user("1234"));
        s.push(Message::assistant("5678"));
        assert_eq!(s.approx_chars(), 8);
    }
}
