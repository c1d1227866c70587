//! Core message and response types shared by the Router, Provider Adapters and Agents.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: Role,
    pub content: String,
}

impl LLMMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// A successful outcome from a Provider Adapter, stamped by the Router with
/// attempt bookkeeping before it reaches the Agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub latency_ms: u64,
    pub finish_reason: String,
    /// Attempt number within the responding provider (1-based).
    pub attempt: u32,
    /// `<provider>/<model>` of the primary, set only when this response came
    /// from a fallback provider.
    pub fallback_from: Option<String>,
}

impl LLMResponse {
    pub fn tokens_total(&self) -> u32 {
        self.tokens_input + self.tokens_output
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback_from.is_some()
    }
}
