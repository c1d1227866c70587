//! LLM Router (C3): applies an `LLMPolicy` across primary and fallback
//! providers, producing one successful `LLMResponse` or a terminal
//! `AllProvidersFailed` error.

use std::time::Duration;

use log::{info, warn};
use serde_json::json;

use crate::config::preset::LLMPolicy;
use crate::core_types::{LLMMessage, LLMResponse};
use crate::errors::NexousError;
use crate::llm::providers::ProviderRegistry;
use crate::trace::{StepStatus, StepType, TraceRecorder};

#[derive(Debug, Clone, serde::Serialize)]
pub struct RouterAttempt {
    pub provider: String,
    pub model: String,
    pub attempt: u32,
    pub success: bool,
    pub is_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recoverable: Option<bool>,
}

/// One policy-driven LLM call. Constructed per Agent invocation; its
/// `attempts` log is discarded once `route` returns, save for the case where
/// every provider fails, in which case it is embedded in the single ERROR step.
pub struct Router<'a> {
    policy: &'a LLMPolicy,
    registry: &'a ProviderRegistry,
    recorder: &'a TraceRecorder,
    agent_id: String,
    attempts: Vec<RouterAttempt>,
}

impl<'a> Router<'a> {
    pub fn new(policy: &'a LLMPolicy, registry: &'a ProviderRegistry, recorder: &'a TraceRecorder, agent_id: impl Into<String>) -> Self {
        Self { policy, registry, recorder, agent_id: agent_id.into(), attempts: Vec::new() }
    }

    pub async fn route(&mut self, messages: &[LLMMessage], temperature: f32, max_tokens: u32) -> Result<LLMResponse, NexousError> {
        self.attempts.clear();

        let (primary_provider, primary_model) = LLMPolicy::split_spec(&self.policy.primary)
            .ok_or_else(|| NexousError::SchemaValidation(format!("malformed provider/model spec '{}'", self.policy.primary)))?;

        if let Some(response) = self
            .try_with_retry(primary_provider, primary_model, messages, temperature, max_tokens, self.policy.retry, None)
            .await
        {
            return Ok(response);
        }

        for fallback_spec in self.policy.fallback.clone() {
            let Some((provider, model)) = LLMPolicy::split_spec(&fallback_spec) else {
                warn!("skipping malformed fallback spec '{fallback_spec}'");
                continue;
            };
            if let Some(response) = self
                .try_with_retry(provider, model, messages, temperature, max_tokens, 1, Some(self.policy.primary.clone()))
                .await
            {
                return Ok(response);
            }
        }

        self.log_all_failed();
        Err(NexousError::LlmAllProvidersFailed {
            attempts: self.attempts.len(),
            message: format!("all LLM providers failed. Attempts: {}", self.attempts.len()),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_with_retry(
        &mut self,
        provider: &str,
        model: &str,
        messages: &[LLMMessage],
        temperature: f32,
        max_tokens: u32,
        retry_count: u32,
        fallback_from: Option<String>,
    ) -> Option<LLMResponse> {
        let is_fallback = fallback_from.is_some();

        for attempt in 1..=retry_count {
            let adapter = match self.registry.get(provider) {
                Some(adapter) => adapter,
                None => {
                    self.record_attempt(provider, model, attempt, is_fallback, None, Some(format!("unknown provider '{provider}'")), Some(false));
                    break;
                }
            };

            if !adapter.is_available() {
                self.record_attempt(provider, model, attempt, is_fallback, None, Some(format!("{provider} API key not set")), Some(false));
                break;
            }

            let timeout = Duration::from_secs(self.policy.timeout);
            match adapter.generate(messages, model, temperature, max_tokens, timeout).await {
                Ok(mut response) => {
                    response.attempt = attempt;
                    response.fallback_from = fallback_from.clone();

                    self.record_attempt(
                        provider,
                        model,
                        attempt,
                        is_fallback,
                        Some(&response),
                        None,
                        None,
                    );
                    self.log_llm_step(&response, is_fallback, fallback_from.as_deref());
                    return Some(response);
                }
                Err(provider_error) => {
                    self.record_attempt(
                        provider,
                        model,
                        attempt,
                        is_fallback,
                        None,
                        Some(provider_error.message.clone()),
                        Some(provider_error.recoverable),
                    );

                    if !provider_error.recoverable {
                        warn!("[Router] {provider}/{model} unrecoverable error: {}", provider_error.message);
                        break;
                    }

                    if attempt < retry_count {
                        let delay_secs = self.policy.retry_delay * 2f64.powi((attempt - 1) as i32);
                        info!("[Router] {provider}/{model} attempt {attempt} failed, retrying in {delay_secs:.1}s...");
                        tokio::time::sleep(Duration::from_secs_f64(delay_secs)).await;
                    }
                }
            }
        }

        None
    }

    #[allow(clippy::too_many_arguments)]
    fn record_attempt(
        &mut self,
        provider: &str,
        model: &str,
        attempt: u32,
        is_fallback: bool,
        response: Option<&LLMResponse>,
        error: Option<String>,
        recoverable: Option<bool>,
    ) {
        self.attempts.push(RouterAttempt {
            provider: provider.to_string(),
            model: model.to_string(),
            attempt,
            success: response.is_some(),
            is_fallback,
            tokens: response.map(|r| r.tokens_total()),
            latency_ms: response.map(|r| r.latency_ms),
            error,
            recoverable,
        });
    }

    fn log_llm_step(&self, response: &LLMResponse, is_fallback: bool, fallback_from: Option<&str>) {
        let mut input_summary = format!("LLM call to {}/{}", response.provider, response.model);
        if is_fallback {
            if let Some(from) = fallback_from {
                input_summary.push_str(&format!(" (fallback from {from})"));
            }
        }
        let output_summary = truncate(&response.content, 200);

        let mut metadata = json!({
            "provider": response.provider,
            "model": response.model,
            "tokens_input": response.tokens_input,
            "tokens_output": response.tokens_output,
            "latency_ms": response.latency_ms,
            "finish_reason": response.finish_reason,
            "attempt": response.attempt,
        });
        if is_fallback {
            metadata["is_fallback"] = json!(true);
            metadata["fallback_from"] = json!(fallback_from);
        }

        self.recorder.log_step(
            &self.agent_id,
            StepType::Llm,
            StepStatus::Ok,
            json!({ "input_summary": input_summary, "output_summary": output_summary }),
            Some(metadata),
        );
    }

    fn log_all_failed(&self) {
        self.recorder.log_step(
            &self.agent_id,
            StepType::Llm,
            StepStatus::Error,
            json!({ "error": "All LLM providers failed", "attempts": self.attempts.len() }),
            Some(json!({ "attempts_detail": self.attempts })),
        );
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::config::preset::LLMPolicy;
    use crate::llm::providers::ProviderRegistry;
    use crate::llm::{ProviderAdapter, ProviderError};

    #[test]
    fn truncates_by_char_count_not_bytes() {
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("hi", 5), "hi");
        assert_eq!(truncate("こんにちは世界", 3), "こんに");
    }

    struct ScriptedAdapter {
        name: &'static str,
        available: bool,
        /// Each call pops the next outcome; `true` succeeds, `false` fails recoverably.
        outcomes: std::sync::Mutex<Vec<bool>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn provider_name(&self) -> &'static str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn generate(
            &self,
            _messages: &[LLMMessage],
            model: &str,
            _temperature: f32,
            _max_tokens: u32,
            _timeout: Duration,
        ) -> Result<LLMResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let succeed = self.outcomes.lock().unwrap().pop().unwrap_or(false);
            if succeed {
                Ok(LLMResponse {
                    content: format!("ok from {}", self.name),
                    provider: self.name.to_string(),
                    model: model.to_string(),
                    tokens_input: 10,
                    tokens_output: 5,
                    latency_ms: 1,
                    finish_reason: "stop".to_string(),
                    attempt: 0,
                    fallback_from: None,
                })
            } else {
                Err(ProviderError {
                    provider: self.name.to_string(),
                    model: model.to_string(),
                    message: "rate limited".to_string(),
                    recoverable: true,
                })
            }
        }
    }

    fn policy(primary: &str, retry: u32, fallback: Vec<String>) -> LLMPolicy {
        LLMPolicy {
            primary: primary.to_string(),
            retry,
            retry_delay: 0.001,
            fallback,
            timeout: 5,
            temperature: 0.7,
            max_tokens: 256,
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_primary_attempt() {
        let registry = ProviderRegistry::new();
        registry.insert_for_test(
            "openai",
            Arc::new(ScriptedAdapter {
                name: "openai",
                available: true,
                outcomes: std::sync::Mutex::new(vec![true]),
                calls: AtomicU32::new(0),
            }),
        );
        let recorder = TraceRecorder::new(std::env::temp_dir());
        recorder.start_run("proj", "run1", "sequential").unwrap();
        recorder.start_agent("a1", "preset", "purpose").unwrap();

        let policy = policy("openai/gpt-4o", 1, vec![]);
        let mut router = Router::new(&policy, &registry, &recorder, "a1");
        let response = router.route(&[LLMMessage::user("hi")], 0.7, 256).await.unwrap();
        assert_eq!(response.provider, "openai");
        assert_eq!(response.attempt, 1);
        assert!(response.fallback_from.is_none());
    }

    #[tokio::test]
    async fn retries_then_succeeds_on_primary() {
        let registry = ProviderRegistry::new();
        // outcomes popped back-to-front: fail, fail, succeed.
        registry.insert_for_test(
            "openai",
            Arc::new(ScriptedAdapter {
                name: "openai",
                available: true,
                outcomes: std::sync::Mutex::new(vec![true, false, false]),
                calls: AtomicU32::new(0),
            }),
        );
        let recorder = TraceRecorder::new(std::env::temp_dir());
        recorder.start_run("proj", "run2", "sequential").unwrap();
        recorder.start_agent("a1", "preset", "purpose").unwrap();

        let policy = policy("openai/gpt-4o", 3, vec![]);
        let mut router = Router::new(&policy, &registry, &recorder, "a1");
        let response = router.route(&[LLMMessage::user("hi")], 0.7, 256).await.unwrap();
        assert_eq!(response.attempt, 3);
    }

    #[tokio::test]
    async fn falls_back_when_primary_unavailable() {
        let registry = ProviderRegistry::new();
        registry.insert_for_test(
            "openai",
            Arc::new(ScriptedAdapter {
                name: "openai",
                available: false,
                outcomes: std::sync::Mutex::new(vec![]),
                calls: AtomicU32::new(0),
            }),
        );
        registry.insert_for_test(
            "anthropic",
            Arc::new(ScriptedAdapter {
                name: "anthropic",
                available: true,
                outcomes: std::sync::Mutex::new(vec![true]),
                calls: AtomicU32::new(0),
            }),
        );
        let recorder = TraceRecorder::new(std::env::temp_dir());
        recorder.start_run("proj", "run3", "sequential").unwrap();
        recorder.start_agent("a1", "preset", "purpose").unwrap();

        let policy = policy("openai/gpt-4o", 1, vec!["anthropic/claude-3-5-sonnet-20241022".to_string()]);
        let mut router = Router::new(&policy, &registry, &recorder, "a1");
        let response = router.route(&[LLMMessage::user("hi")], 0.7, 256).await.unwrap();
        assert_eq!(response.provider, "anthropic");
        assert_eq!(response.attempt, 1);
        assert_eq!(response.fallback_from.as_deref(), Some("openai/gpt-4o"));
    }

    #[tokio::test]
    async fn all_providers_failing_is_terminal() {
        let registry = ProviderRegistry::new();
        registry.insert_for_test(
            "openai",
            Arc::new(ScriptedAdapter {
                name: "openai",
                available: true,
                outcomes: std::sync::Mutex::new(vec![false]),
                calls: AtomicU32::new(0),
            }),
        );
        registry.insert_for_test(
            "anthropic",
            Arc::new(ScriptedAdapter {
                name: "anthropic",
                available: true,
                outcomes: std::sync::Mutex::new(vec![false]),
                calls: AtomicU32::new(0),
            }),
        );
        let recorder = TraceRecorder::new(std::env::temp_dir());
        recorder.start_run("proj", "run4", "sequential").unwrap();
        recorder.start_agent("a1", "preset", "purpose").unwrap();

        let policy = policy("openai/gpt-4o", 1, vec!["anthropic/claude-3-5-sonnet-20241022".to_string()]);
        let mut router = Router::new(&policy, &registry, &recorder, "a1");
        let err = router.route(&[LLMMessage::user("hi")], 0.7, 256).await.unwrap_err();
        assert!(matches!(err, NexousError::LlmAllProvidersFailed { attempts: 2, .. }));
    }
}
