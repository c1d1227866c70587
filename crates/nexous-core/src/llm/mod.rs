//! Provider Adapter (C2): a uniform call surface over three heterogeneous
//! external LLM APIs, and the LLM Router (C3) that applies a policy to them.

pub mod providers;
pub mod router;

use std::time::Duration;

use async_trait::async_trait;

use crate::core_types::LLMMessage;

/// Failure contract for a single `generate` call. `recoverable` drives the
/// Router's retry/backoff decision: set when the provider's message suggests
/// a rate-limit, transient timeout, or quota condition.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub recoverable: bool,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}: {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// One concrete external LLM service. Implementations differ in system
/// message handling and token accounting but share this call surface.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Whether credentials (and any adapter-specific dependency) are present.
    fn is_available(&self) -> bool;

    async fn generate(
        &self,
        messages: &[LLMMessage],
        model: &str,
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<crate::core_types::LLMResponse, ProviderError>;
}
