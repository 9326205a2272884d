// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Process-local shared key/value store used by cooperating agents.
//!
//! Sub-agents publish their outputs here under their task key; siblings and
//! the parent read them back with `get_state`. The store is read-mostly:
//! writes take a short exclusive section around the map, reads clone the
//! entry out. Entries live for the session.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// One stored value with its provenance.
#[derive(Debug, Clone)]
pub struct StateEntry {
    pub value: String,
    /// Name of the agent that created the entry.
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// MIME-ish hint, e.g. "text/plain" or "text/markdown".
    pub content_type: String,
    pub byte_size: usize,
}

#[derive(Debug, Default)]
pub struct SharedState {
    entries: RwLock<HashMap<String, StateEntry>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a key. Updates keep the original creation time and
    /// creator; per-key writes are linearizable under the lock.
    pub fn set(&self, key: &str, value: &str, creator: &str, content_type: &str) {
        let now = Utc::now();
        let mut map = self.entries.write().expect("shared state lock poisoned");
        match map.get_mut(key) {
            Some(entry) => {
                entry.value = value.to_string();
                entry.updated_at = now;
                entry.content_type = content_type.to_string();
                entry.byte_size = value.len();
            }
            None => {
                map.insert(
                    key.to_string(),
                    StateEntry {
                        value: value.to_string(),
                        creator: creator.to_string(),
                        created_at: now,
                        updated_at: now,
                        content_type: content_type.to_string(),
                        byte_size: value.len(),
                    },
                );
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<StateEntry> {
        self.entries
            .read()
            .expect("shared state lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .expect("shared state lock poisoned")
            .contains_key(key)
    }

    /// Sorted list of (key, creator, byte_size, content_type) summaries.
    pub fn list(&self) -> Vec<(String, String, usize, String)> {
        let map = self.entries.read().expect("shared state lock poisoned");
        let mut out: Vec<_> = map
            .iter()
            .map(|(k, e)| {
                (
                    k.clone(),
                    e.creator.clone(),
                    e.byte_size,
                    e.content_type.clone(),
                )
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("shared state lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_round_trip() {
        let s = SharedState::new();
        s.set("k", "v", "tester", "text/plain");
        let e = s.get("k").unwrap();
        assert_eq!(e.value, "v");
        assert_eq!(e.creator, "tester");
        assert_eq!(e.byte_size, 1);
    }

    #[test]
    fn get_missing_key_is_none() {
        let s = SharedState::new();
        assert!(s.get("nope").is_none());
    }

    #[test]
    fn update_preserves_creator_and_created_at() {
        let s = SharedState::new();
        s.set("k", "first", "alice", "text/plain");
        let created = s.get("k").unwrap().created_at;
        s.set("k", "second", "bob", "text/plain");
        let e = s.get("k").unwrap();
        assert_eq!(e.value, "second");
        assert_eq!(e.creator, "alice");
        assert_eq!(e.created_at, created);
        assert!(e.updated_at >= created);
    }

    #[test]
    fn list_is_sorted_by_key() {
        let s = SharedState::new();
        s.set("b", "2", "x", "text/plain");
        s.set("a", "1", "x", "text/plain");
        let keys: Vec<_> = s.list().into_iter().map(|(k, ..)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn concurrent_writers_do_not_lose_keys() {
        use std::sync::Arc;
        let s = Arc::new(SharedState::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let s = Arc::clone(&s);
            handles.push(std::thread::spawn(move || {
                s.set(&format!("k{i}"), "v", "w", "text/plain");
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(s.len(), 8);
    }
}
