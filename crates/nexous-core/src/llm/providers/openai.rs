//! OpenAI Provider Adapter: system message inlined as a regular role,
//! exact token counts read from the API's `usage` object.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{error, info};
use reqwest::Client;
use serde_json::{json, Value};

use crate::core_types::{LLMMessage, LLMResponse};
use crate::llm::{ProviderAdapter, ProviderError};

const ALLOWED_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo"];

pub struct OpenAiAdapter {
    client: Client,
    api_key: String,
    api_base: String,
}

impl OpenAiAdapter {
    pub fn from_env() -> Self {
        Self {
            client: Client::new(),
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            api_base: "https://api.openai.com/v1".to_string(),
        }
    }

    fn format_messages(messages: &[LLMMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect()
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider_name(&self) -> &'static str {
        "openai"
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
            provider: "openai".to_string(),
            model: model.to_string(),
            message,
            recoverable,
        };

        if self.api_key.is_empty() {
            return Err(err("OPENAI_API_KEY not set".to_string(), false));
        }
        if !ALLOWED_MODELS.contains(&model) {
            return Err(err(
                format!("model '{model}' not allowed. Allowed: {ALLOWED_MODELS:?}"),
                false,
            ));
        }

        let body = json!({
            "model": model,
            "messages": Self::format_messages(messages),
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let start = Instant::now();
        let result = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                let message = e.to_string();
                let recoverable = is_recoverable_rate_or_timeout(&message);
                error!("[OpenAiAdapter] request error: {message}");
                return Err(err(message, recoverable));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            let message = format!("HTTP {status}: {body_text}");
            let recoverable = is_recoverable_rate_or_timeout(&message);
            error!("[OpenAiAdapter] {message}");
            return Err(err(message, recoverable));
        }

        let parsed: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return Err(err(format!("failed to parse response: {e}"), false)),
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        let content = parsed["choices"][0]["message"]["content"].as_str().unwrap_or("").to_string();
        let finish_reason = parsed["choices"][0]["finish_reason"].as_str().unwrap_or("stop").to_string();
        let tokens_input = parsed["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32;
        let tokens_output = parsed["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32;

        info!(
            "[OpenAiAdapter] {model} | tokens: {tokens_input}+{tokens_output}={} | latency: {latency_ms}ms",
            tokens_input + tokens_output
        );

        Ok(LLMResponse {
            content,
            provider: "openai".to_string(),
            model: model.to_string(),
            tokens_input,
            tokens_output,
            latency_ms,
            finish_reason,
            attempt: 0,
            fallback_from: None,
        })
    }
}

pub(crate) fn is_recoverable_rate_or_timeout(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate") || lower.contains("timeout")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_timeout_messages_are_recoverable() {
        assert!(is_recoverable_rate_or_timeout("HTTP 429: Rate limit exceeded"));
        assert!(is_recoverable_rate_or_timeout("request timeout after 60s"));
    }

    #[test]
    fn other_failures_are_not_recoverable() {
        assert!(!is_recoverable_rate_or_timeout("HTTP 401: invalid api key"));
        assert!(!is_recoverable_rate_or_timeout("model not found"));
    }

    #[tokio::test]
    async fn missing_api_key_is_unavailable_and_non_recoverable() {
        std::env::remove_var("OPENAI_API_KEY");
        let adapter = OpenAiAdapter::from_env();
        assert!(!adapter.is_available());

        let messages = vec![LLMMessage::user("hi")];
        let err = adapter
            .generate(&messages, "gpt-4o", 0.7, 256, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(!err.recoverable);
    }

    #[tokio::test]
    async fn unknown_model_is_non_recoverable() {
        std::env::set_var("OPENAI_API_KEY", "test-key");
        let adapter = OpenAiAdapter::from_env();
        let messages = vec![LLMMessage::user("hi")];
        let err = adapter
            .generate(&messages, "not-a-real-model", 0.7, 256, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(!err.recoverable);
        std::env::remove_var("OPENAI_API_KEY");
    }
}
