//! Gemini Provider Adapter: every role folded into a single bracketed prompt
//! string, token counts estimated with a 4-characters-per-token heuristic.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{error, info};
use reqwest::Client;
use serde_json::{json, Value};

use crate::core_types::{LLMMessage, LLMResponse, Role};
use crate::llm::{ProviderAdapter, ProviderError};

const ALLOWED_MODELS: &[&str] = &["gemini-pro", "gemini-1.5-pro", "gemini-1.5-flash", "gemini-2.0-flash-exp"];

pub struct GeminiAdapter {
    client: Client,
    api_key: String,
    api_base: String,
}

impl GeminiAdapter {
    pub fn from_env() -> Self {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .unwrap_or_default();
        Self {
            client: Client::new(),
            api_key,
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    fn fold_prompt(messages: &[LLMMessage]) -> String {
        let mut parts = Vec::with_capacity(messages.len());
        for message in messages {
            let label = match message.role {
                Role::System => "[System Instructions]",
                Role::User => "[User]",
                Role::Assistant => "[Assistant]",
            };
            parts.push(format!("{label}\n{}\n", message.content));
        }
        parts.join("\n")
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate(
        &self,
        messages: &[LLMMessage],
        model: &str,
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<LLMResponse, ProviderError> {
        let err = |message: String, recoverable: bool| ProviderError {
            provider: "gemini".to_string(),
            model: model.to_string(),
            message,
            recoverable,
        };

        if self.api_key.is_empty() {
            return Err(err("GOOGLE_API_KEY not set".to_string(), false));
        }
        if !ALLOWED_MODELS.contains(&model) {
            return Err(err(
                format!("model '{model}' not allowed. Allowed: {ALLOWED_MODELS:?}"),
                false,
            ));
        }

        let prompt = Self::fold_prompt(messages);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_tokens,
            },
        });

        let url = format!("{}/models/{model}:generateContent?key={}", self.api_base, self.api_key);
        let start = Instant::now();
        let result = self.client.post(&url).timeout(timeout).json(&body).send().await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                let message = e.to_string();
                let recoverable = is_recoverable_rate_or_quota(&message);
                error!("[GeminiAdapter] request error: {message}");
                return Err(err(message, recoverable));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            let message = format!("HTTP {status}: {body_text}");
            let recoverable = is_recoverable_rate_or_quota(&message);
            error!("[GeminiAdapter] {message}");
            return Err(err(message, recoverable));
        }

        let parsed: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return Err(err(format!("failed to parse response: {e}"), false)),
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        let content = parsed["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or("")
            .to_string();

        // Gemini does not reliably report exact token counts; estimate at
        // 4 characters per token, matching the original client.
        let tokens_input = (prompt.len() / 4) as u32;
        let tokens_output = (content.len() / 4) as u32;

        info!(
            "[GeminiAdapter] {model} | tokens: ~{tokens_input}+{tokens_output}={} | latency: {latency_ms}ms",
            tokens_input + tokens_output
        );

        Ok(LLMResponse {
            content,
            provider: "gemini".to_string(),
            model: model.to_string(),
            tokens_input,
            tokens_output,
            latency_ms,
            finish_reason: "stop".to_string(),
            attempt: 0,
            fallback_from: None,
        })
    }
}

fn is_recoverable_rate_or_quota(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate") || lower.contains("quota")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_prompt_labels_each_role_in_order() {
        let messages = vec![LLMMessage::system("be terse"), LLMMessage::user("hello")];
        let folded = GeminiAdapter::fold_prompt(&messages);
        let system_pos = folded.find("[System Instructions]").unwrap();
        let user_pos = folded.find("[User]").unwrap();
        assert!(system_pos < user_pos);
        assert!(folded.contains("be terse"));
        assert!(folded.contains("hello"));
    }

    #[test]
    fn quota_and_rate_messages_are_recoverable() {
        assert!(is_recoverable_rate_or_quota("429 rate limit"));
        assert!(is_recoverable_rate_or_quota("quota exceeded for this project"));
        assert!(!is_recoverable_rate_or_quota("invalid api key"));
    }
}
