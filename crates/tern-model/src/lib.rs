// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod catalog;
pub mod sanitize;
mod adapter;
mod mock;
mod openai_compat;
mod types;

pub use adapter::{AdapterError, DeltaStream, ProviderAdapter, StreamRequest};
pub use mock::{EchoAdapter, ScriptedAdapter};
pub use openai_compat::OpenAiCompatAdapter;
pub use types::*;

use tern_config::ModelProfile;

/// Construct a boxed [`ProviderAdapter`] from a model profile.
///
/// `provider` selects the driver: `"openai"` covers every OpenAI-compatible
/// endpoint (hosted or local); `"mock"` is the deterministic echo driver used
/// in tests and dry runs.
pub fn from_profile(profile: &ModelProfile) -> anyhow::Result<Box<dyn ProviderAdapter>> {
    match profile.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiCompatAdapter::from_profile(profile))),
        "mock" => Ok(Box::new(EchoAdapter)),
        other => anyhow::bail!("unknown provider '{other}' (expected 'openai' or 'mock')"),
    }
}
