//! LLM provider implementations for agentexec.
//!
//! All providers implement the `agentexec_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use agentexec_config::LlmConfig;
use agentexec_core::Provider;
use std::sync::Arc;

/// Build the default provider from the `[llm]` config section.
pub fn build_from_config(config: &LlmConfig) -> Arc<dyn Provider> {
    tracing::debug!(api_url = %config.api_url, model = %config.default_model, "Building provider");
    Arc::new(OpenAiCompatProvider::new(
        "openai",
        config.api_url.clone(),
        config.api_key.clone(),
    ))
}
