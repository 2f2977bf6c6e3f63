//! LLM provider implementation for websage.
//!
//! One backend: any OpenAI-compatible `/v1/chat/completions` endpoint.
//! The endpoint, model, and credential come from [`websage_config::AppConfig`].

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;
use websage_core::provider::Provider;

/// Build the configured provider.
///
/// Callers are expected to have checked `require_api_key()` already; an
/// empty key here would simply fail at the first request.
pub fn build_from_config(config: &websage_config::AppConfig) -> Arc<dyn Provider> {
    let api_key = config.api_key.clone().unwrap_or_default();
    Arc::new(OpenAiCompatProvider::new("openai", &config.api_url, api_key))
}
