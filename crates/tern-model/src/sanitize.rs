// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Model-output sanitization: tool-call argument repair and inline
//! `<think>` block extraction.
//!
//! Models frequently emit argument JSON with trailing garbage (a second
//! object, stray prose, closing fences) or with invalid escape sequences.
//! [`sanitize_tool_arguments`] normalizes what can be normalized and leaves
//! genuinely undecodable input untouched so the dispatcher can surface the
//! decode error as a tool result.

/// Normalize a streamed tool-call argument buffer.
///
/// - empty input becomes `{}` (providers require an object, not null)
/// - valid JSON is re-emitted in canonical serialization
/// - when a balanced JSON object decodes as a prefix, the remainder is
///   dropped and the object is re-emitted canonically
/// - invalid escape sequences inside strings are repaired and the result
///   re-tried
/// - anything else is returned unchanged for the dispatcher to reject
pub fn sanitize_tool_arguments(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "{}".to_string();
    }

    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return v.to_string();
    }

    // Prefix decode: take the first well-formed JSON value and drop whatever
    // the model appended after it.
    if let Some(v) = decode_first_value(trimmed) {
        return v.to_string();
    }

    // Invalid escapes (\c, \(, …) are not valid JSON; escape the backslash
    // and retry both full and prefix decode.
    let repaired = fix_invalid_escapes(trimmed);
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(&repaired) {
        return v.to_string();
    }
    if let Some(v) = decode_first_value(&repaired) {
        return v.to_string();
    }

    raw.to_string()
}

/// Decode the first complete JSON value at the start of `s`, ignoring
/// trailing bytes. Returns `None` when even the prefix fails to decode.
fn decode_first_value(s: &str) -> Option<serde_json::Value> {
    let mut iter = serde_json::Deserializer::from_str(s).into_iter::<serde_json::Value>();
    match iter.next() {
        Some(Ok(v)) => Some(v),
        _ => None,
    }
}

/// Walk through a JSON string and replace invalid escape sequences inside
/// string values with a properly escaped backslash.
///
/// Valid JSON escape characters are `"`, `\`, `/`, `b`, `f`, `n`, `r`, `t`,
/// `u`; anything else becomes `\\X` so serde_json can parse the result.
fn fix_invalid_escapes(json_str: &str) -> String {
    let mut result = String::with_capacity(json_str.len() + 16);
    let mut chars = json_str.chars();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => match chars.next() {
                    Some(next)
                        if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') =>
                    {
                        result.push('\\');
                        result.push(next);
                    }
                    Some(next) => {
                        result.push('\\');
                        result.push('\\');
                        result.push(next);
                    }
                    None => result.push('\\'),
                },
                '"' => {
                    in_string = false;
                    result.push('"');
                }
                _ => result.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            result.push(c);
        }
    }
    result
}

/// Extract a balanced `<think>…</think>` block from accumulated content.
///
/// Some serving layers embed the model's reasoning in the content stream
/// instead of a separate channel. When the content contains a balanced
/// block, returns `(reasoning, remaining_content)`; the block is removed
/// from the content and any text around it is preserved.
pub fn extract_think_block(content: &str) -> Option<(String, String)> {
    let open = content.find("<think>")?;
    let after_open = open + "<think>".len();
    let close_rel = content[after_open..].find("</think>")?;
    let close = after_open + close_rel;

    let reasoning = content[after_open..close].trim().to_string();
    let mut rest = String::with_capacity(content.len());
    rest.push_str(&content[..open]);
    rest.push_str(&content[close + "</think>".len()..]);
    let rest = rest.trim_start_matches('\n').to_string();
    Some((reasoning, rest))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Argument sanitization ─────────────────────────────────────────────────

    #[test]
    fn empty_arguments_become_object() {
        assert_eq!(sanitize_tool_arguments(""), "{}");
        assert_eq!(sanitize_tool_arguments("   "), "{}");
    }

    #[test]
    fn valid_json_is_canonicalized() {
        let out = sanitize_tool_arguments("{ \"path\" : \"/tmp\" }");
        assert_eq!(out, r#"{"path":"/tmp"}"#);
    }

    #[test]
    fn trailing_garbage_after_object_is_dropped() {
        let out = sanitize_tool_arguments(r#"{"path":"/tmp"} and then some prose"#);
        assert_eq!(out, r#"{"path":"/tmp"}"#);
    }

    #[test]
    fn duplicated_object_keeps_first() {
        let out = sanitize_tool_arguments(r#"{"a":1}{"a":2}"#);
        assert_eq!(out, r#"{"a":1}"#);
    }

    #[test]
    fn invalid_escape_is_repaired() {
        let out = sanitize_tool_arguments(r#"{"pattern":"\d+"}"#);
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["pattern"], "\\d+");
    }

    #[test]
    fn undecodable_input_is_returned_unchanged() {
        let raw = "not json at all";
        assert_eq!(sanitize_tool_arguments(raw), raw);
    }

    // ── <think> extraction ────────────────────────────────────────────────────

    #[test]
    fn think_block_with_trailing_answer_splits() {
        let (reasoning, rest) = extract_think_block("<think>planning</think>answer").unwrap();
        assert_eq!(reasoning, "planning");
        assert_eq!(rest, "answer");
    }

    #[test]
    fn think_block_only_leaves_empty_content() {
        let (reasoning, rest) = extract_think_block("<think>all thought</think>").unwrap();
        assert_eq!(reasoning, "all thought");
        assert!(rest.is_empty());
    }

    #[test]
    fn unbalanced_think_block_is_left_alone() {
        assert!(extract_think_block("<think>never closed").is_none());
        assert!(extract_think_block("no tags here").is_none());
    }

    #[test]
    fn text_before_block_is_preserved() {
        let (reasoning, rest) = extract_think_block("pre <think>x</think>post").unwrap();
        assert_eq!(reasoning, "x");
        assert_eq!(rest, "pre post");
    }
}
