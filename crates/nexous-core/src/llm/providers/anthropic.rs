//! Anthropic Provider Adapter: system message carried in a separate `system`
//! parameter, exact token counts read from `usage.input_tokens`/`output_tokens`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{error, info};
use reqwest::Client;
use serde_json::{json, Value};

use crate::core_types::{LLMMessage, LLMResponse, Role};
use crate::llm::{ProviderAdapter, ProviderError};

const ALLOWED_MODELS: &[&str] = &[
    "claude-3-5-sonnet-20241022",
    "claude-3-5-sonnet-latest",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    client: Client,
    api_key: String,
    api_base: String,
}

impl AnthropicAdapter {
    pub fn from_env() -> Self {
        Self {
            client: Client::new(),
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            api_base: "https://api.anthropic.com/v1".to_string(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn provider_name(&self) -> &'static str {
        "anthropic"
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
            provider: "anthropic".to_string(),
            model: model.to_string(),
            message,
            recoverable,
        };

        if self.api_key.is_empty() {
            return Err(err("ANTHROPIC_API_KEY not set".to_string(), false));
        }
        if !ALLOWED_MODELS.contains(&model) {
            return Err(err(
                format!("model '{model}' not allowed. Allowed: {ALLOWED_MODELS:?}"),
                false,
            ));
        }

        // System message is separated out; everything else keeps its role.
        let mut system_content = String::new();
        let mut api_messages = Vec::new();
        for message in messages {
            if matches!(message.role, Role::System) {
                system_content = message.content.clone();
            } else {
                api_messages.push(json!({ "role": message.role.as_str(), "content": message.content }));
            }
        }

        let mut body = json!({
            "model": model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": api_messages,
        });
        if !system_content.is_empty() {
            body["system"] = system_content.into();
        }

        let start = Instant::now();
        let result = self
            .client
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(timeout)
            .json(&body)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                let message = e.to_string();
                let recoverable = super::openai::is_recoverable_rate_or_timeout(&message);
                error!("[AnthropicAdapter] request error: {message}");
                return Err(err(message, recoverable));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            let message = format!("HTTP {status}: {body_text}");
            let recoverable = super::openai::is_recoverable_rate_or_timeout(&message);
            error!("[AnthropicAdapter] {message}");
            return Err(err(message, recoverable));
        }

        let parsed: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return Err(err(format!("failed to parse response: {e}"), false)),
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        let content = parsed["content"][0]["text"].as_str().unwrap_or("").to_string();
        let finish_reason = parsed["stop_reason"].as_str().unwrap_or("stop").to_string();
        let tokens_input = parsed["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32;
        let tokens_output = parsed["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32;

        info!(
            "[AnthropicAdapter] {model} | tokens: {tokens_input}+{tokens_output}={} | latency: {latency_ms}ms",
            tokens_input + tokens_output
        );

        Ok(LLMResponse {
            content,
            provider: "anthropic".to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_api_key_is_unavailable_and_non_recoverable() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        let adapter = AnthropicAdapter::from_env();
        assert!(!adapter.is_available());

        let messages = vec![LLMMessage::user("hi")];
        let err = adapter
            .generate(&messages, "claude-3-5-sonnet-20241022", 0.7, 256, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(!err.recoverable);
    }

    #[tokio::test]
    async fn unknown_model_is_non_recoverable() {
        std::env::set_var("ANTHROPIC_API_KEY", "test-key");
        let adapter = AnthropicAdapter::from_env();
        let messages = vec![LLMMessage::user("hi")];
        let err = adapter.generate(&messages, "not-a-real-model", 0.7, 256, Duration::from_secs(5)).await.unwrap_err();
        assert!(!err.recoverable);
        std::env::remove_var("ANTHROPIC_API_KEY");
    }
}
