//! Provider Adapter implementations and the owned registry/cache that
//! replaces the original's class-level singleton cache (`LLMRegistry`).
//!
//! A `ProviderRegistry` is constructed fresh per `Runner` and threaded
//! through the Router explicitly; it is never reached via ambient global
//! state, so concurrent runs in the same process do not share adapters
//! unless the caller chooses to share a `ProviderRegistry`.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::llm::ProviderAdapter;

#[derive(Default)]
pub struct ProviderRegistry {
    cache: Mutex<HashMap<String, Arc<dyn ProviderAdapter>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { cache: Mutex::new(HashMap::new()) }
    }

    /// Returns the cached adapter for `provider_name`, constructing and
    /// caching one on first use. Returns `None` for an unknown provider name.
    pub fn get(&self, provider_name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        let mut cache = self.cache.lock().expect("provider registry mutex poisoned");
        if let Some(adapter) = cache.get(provider_name) {
            return Some(adapter.clone());
        }
        let adapter: Arc<dyn ProviderAdapter> = match provider_name {
            "openai" => Arc::new(openai::OpenAiAdapter::from_env()),
            "anthropic" => Arc::new(anthropic::AnthropicAdapter::from_env()),
            "gemini" => Arc::new(gemini::GeminiAdapter::from_env()),
            _ => return None,
        };
        cache.insert(provider_name.to_string(), adapter.clone());
        Some(adapter)
    }

    /// Seeds the cache with a pre-built adapter, bypassing `from_env`
    /// construction. Used by Router tests to inject mock adapters.
    #[cfg(test)]
    pub fn insert_for_test(&self, provider_name: &str, adapter: Arc<dyn ProviderAdapter>) {
        self.cache.lock().expect("provider registry mutex poisoned").insert(provider_name.to_string(), adapter);
    }
}
