// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Static model catalog: context windows and token-estimation divisors.
//!
//! The catalog is keyed by model-id prefix so that dated snapshots
//! (`gpt-4o-2024-11-20`) resolve to their family entry. Token counts are
//! estimated as `chars / chars_per_token`; the divisor is per-family because
//! code-heavy and CJK-heavy models tokenize denser than plain English.

/// One catalog entry, matched by model-id prefix.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub model_prefix: &'static str,
    pub context_window: u32,
    pub max_output_tokens: u32,
    /// Characters per token for the estimator.
    pub chars_per_token: f32,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        model_prefix: "gpt-4o-mini",
        context_window: 128_000,
        max_output_tokens: 16_384,
        chars_per_token: 4.0,
    },
    CatalogEntry {
        model_prefix: "gpt-4o",
        context_window: 128_000,
        max_output_tokens: 16_384,
        chars_per_token: 4.0,
    },
    CatalogEntry {
        model_prefix: "gpt-4.1",
        context_window: 1_000_000,
        max_output_tokens: 32_768,
        chars_per_token: 4.0,
    },
    CatalogEntry {
        model_prefix: "o3",
        context_window: 200_000,
        max_output_tokens: 100_000,
        chars_per_token: 4.0,
    },
    CatalogEntry {
        model_prefix: "o4-mini",
        context_window: 200_000,
        max_output_tokens: 100_000,
        chars_per_token: 4.0,
    },
    CatalogEntry {
        model_prefix: "claude-",
        context_window: 200_000,
        max_output_tokens: 64_000,
        chars_per_token: 3.8,
    },
    CatalogEntry {
        model_prefix: "gemini-",
        context_window: 1_000_000,
        max_output_tokens: 65_536,
        chars_per_token: 4.0,
    },
    CatalogEntry {
        model_prefix: "deepseek-",
        context_window: 128_000,
        max_output_tokens: 8_192,
        chars_per_token: 3.5,
    },
    CatalogEntry {
        model_prefix: "qwen",
        context_window: 131_072,
        max_output_tokens: 8_192,
        chars_per_token: 3.5,
    },
    CatalogEntry {
        model_prefix: "llama",
        context_window: 131_072,
        max_output_tokens: 8_192,
        chars_per_token: 4.0,
    },
    CatalogEntry {
        model_prefix: "mistral",
        context_window: 128_000,
        max_output_tokens: 8_192,
        chars_per_token: 4.0,
    },
];

/// Fallback window for models not present in the catalog.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 128_000;
const DEFAULT_CHARS_PER_TOKEN: f32 = 4.0;

/// Look up the catalog entry for a model id by longest prefix match.
pub fn lookup(model_id: &str) -> Option<&'static CatalogEntry> {
    CATALOG
        .iter()
        .filter(|e| model_id.starts_with(e.model_prefix))
        .max_by_key(|e| e.model_prefix.len())
}

/// Context window for a model, with the catalog fallback for unknown ids.
pub fn context_window(model_id: &str) -> u32 {
    lookup(model_id)
        .map(|e| e.context_window)
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}

/// Estimate a token count from a character count for the given model.
pub fn estimate_tokens(model_id: &str, chars: usize) -> usize {
    let divisor = lookup(model_id)
        .map(|e| e.chars_per_token)
        .unwrap_or(DEFAULT_CHARS_PER_TOKEN);
    ((chars as f32 / divisor) as usize).max(1)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
