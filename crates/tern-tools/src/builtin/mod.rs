// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod agents;
pub mod fs_delete;
pub mod fs_edit;
pub mod fs_move;
pub mod fs_read;
pub mod fs_write;
pub mod list_dir;
pub mod memory;
pub mod search;
pub mod shell;
pub mod skill;
pub mod state_tools;
pub mod web_fetch;
pub mod web_search;

use similar::TextDiff;

/// Render a unified diff between two file states for the confirmation view.
pub(crate) fn unified_diff(path: &str, old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let header = format!("--- a/{path}\n+++ b/{path}\n");
    let body = diff
        .unified_diff()
        .context_radius(3)
        .to_string();
    if body.is_empty() {
        format!("{header}(no changes)")
    } else {
        format!("{header}{body}")
    }
}

/// Read a required string argument, or produce the standard error text.
pub(crate) fn require_str<'a>(
    args: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing required parameter '{key}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unified_diff_shows_added_line() {
        let d = unified_diff("f.txt", "a\n", "a\nb\n");
        assert!(d.contains("+++ b/f.txt"));
        assert!(d.contains("+b"));
    }

    #[test]
    fn unified_diff_identical_inputs() {
        let d = unified_diff("f.txt", "same\n", "same\n");
        assert!(d.contains("(no changes)"));
    }

    #[test]
    fn require_str_reports_missing_key() {
        let args = serde_json::json!({"other": 1});
        let err = require_str(&args, "path").unwrap_err();
        assert!(err.contains("'path'"));
    }
}
