//! Agent (C4): builds a prompt, calls the Router, optionally invokes tools,
//! and validates output. The Agent is the sole caller of the Router.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::{json, Value};

use crate::config::preset::PresetSpec;
use crate::config::project::{AgentSpec, ProjectSpec};
use crate::core_types::LLMMessage;
use crate::errors::NexousError;
use crate::llm::providers::ProviderRegistry;
use crate::llm::router::Router;
use crate::tools::ToolRegistry;
use crate::trace::{StepStatus, StepType, TraceRecorder};

/// Per-invocation context supplied by the Runner.
pub struct AgentContext<'a> {
    pub project: &'a ProjectSpec,
    pub previous_results: &'a HashMap<String, AgentResult>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolInvocationResult {
    pub tool_name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: Value,
}

/// An Agent's observable outcome: success result carrying LLM content,
/// optionally validated output, token/latency accounting and any tool calls.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentResult {
    pub status: String,
    pub content: String,
    pub validated_output: Option<Value>,
    pub output_warnings: Vec<String>,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub latency_ms: u64,
    pub provider: String,
    pub model: String,
    pub tool_results: Vec<ToolInvocationResult>,
    pub router_attempt: u32,
}

pub struct Agent {
    spec: AgentSpec,
    preset: PresetSpec,
    registry: Arc<ProviderRegistry>,
    recorder: TraceRecorder,
    tools: Arc<ToolRegistry>,
    use_llm: bool,
}

impl Agent {
    pub fn new(
        spec: AgentSpec,
        preset: PresetSpec,
        registry: Arc<ProviderRegistry>,
        recorder: TraceRecorder,
        tools: Arc<ToolRegistry>,
        use_llm: bool,
    ) -> Self {
        Self { spec, preset, registry, recorder, tools, use_llm }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn preset_id(&self) -> &str {
        &self.preset.id
    }

    pub fn purpose(&self) -> &str {
        &self.spec.purpose
    }

    pub fn input_keys(&self) -> Vec<String> {
        self.spec.inputs.keys().cloned().collect()
    }

    /// Runs this agent. In placeholder mode (`use_llm = false`) this never
    /// calls the Router — the sole difference between the two modes.
    pub async fn execute(&self, ctx: &AgentContext<'_>) -> Result<AgentResult, NexousError> {
        if !self.use_llm {
            return Ok(self.placeholder_result());
        }

        let messages = self.compose_messages(ctx);

        let mut router = Router::new(&self.preset.llm_policy, &self.registry, &self.recorder, self.spec.id.clone());
        let response = router
            .route(&messages, self.preset.llm_policy.temperature, self.preset.llm_policy.max_tokens)
            .await?;

        let (validated_output, output_warnings) = self.validate_output(&response.content);
        let tool_results = self.execute_tools(&response.content).await;

        Ok(AgentResult {
            status: "success".to_string(),
            content: response.content,
            validated_output,
            output_warnings,
            tokens_input: response.tokens_input,
            tokens_output: response.tokens_output,
            latency_ms: response.latency_ms,
            provider: response.provider,
            model: response.model,
            tool_results,
            router_attempt: response.attempt,
        })
    }

    fn placeholder_result(&self) -> AgentResult {
        AgentResult {
            status: "success".to_string(),
            content: format!("[placeholder result for agent '{}' using preset '{}']", self.spec.id, self.preset.id),
            validated_output: None,
            output_warnings: Vec::new(),
            tokens_input: 0,
            tokens_output: 0,
            latency_ms: 0,
            provider: "placeholder".to_string(),
            model: "placeholder".to_string(),
            tool_results: Vec::new(),
            router_attempt: 0,
        }
    }

    /// Step 1: a system message (preset prompt + tool/JSON reminders) and a
    /// user message (purpose + inputs + the ids of prior results, never the
    /// result bodies, to bound prompt size).
    fn compose_messages(&self, ctx: &AgentContext<'_>) -> Vec<LLMMessage> {
        let mut system_prompt = self.preset.system_prompt.clone();
        if !self.preset.tools.is_empty() {
            system_prompt.push_str(&format!(
                "\n\nAvailable tools: {}. Emit any code you want executed inside a fenced ```python code block.",
                self.preset.tools.join(", ")
            ));
        }
        if self.preset.output_policy.as_ref().map(|p| p.wants_json()).unwrap_or(false) {
            system_prompt.push_str("\n\nRespond with valid JSON.");
        }

        let inputs_json = serde_json::to_string_pretty(&self.spec.inputs).unwrap_or_default();
        let mut prior_ids: Vec<&str> = ctx.previous_results.keys().map(String::as_str).collect();
        prior_ids.sort_unstable();

        let user_message = format!(
            "Purpose: {}\n\nInputs:\n{inputs_json}\n\nResults available from prior agents: {prior_ids:?}",
            self.spec.purpose
        );

        vec![LLMMessage::system(system_prompt), LLMMessage::user(user_message)]
    }

    /// Step 3: permissive JSON validation. A missing `required_fields` entry
    /// is a warning, never a failure — the raw content is always preserved.
    fn validate_output(&self, content: &str) -> (Option<Value>, Vec<String>) {
        let Some(policy) = &self.preset.output_policy else {
            return (None, Vec::new());
        };
        if !policy.wants_json() {
            return (None, Vec::new());
        }

        let extracted = extract_json_block(content).or_else(|| serde_json::from_str::<Value>(content).ok());
        let Some(value) = extracted else {
            return (None, vec!["output_policy requires JSON but none could be extracted from the response".to_string()]);
        };

        let mut warnings = Vec::new();
        for field in &policy.required_fields {
            if value.get(field).is_none() {
                warnings.push(format!("required field '{field}' missing from output"));
            }
        }
        (Some(value), warnings)
    }

    /// Step 4: scan fenced `python`/`py`/`python_exec` blocks in document
    /// order and invoke `python_exec` for each, if it is in the allowed set.
    async fn execute_tools(&self, content: &str) -> Vec<ToolInvocationResult> {
        if !self.preset.tools.iter().any(|t| t == "python_exec") {
            return Vec::new();
        }

        let mut results = Vec::new();
        for code in extract_code_blocks(content) {
            let result = self.tools.invoke("python_exec", json!({ "code": code })).await;

            let input_summary = truncate(&code, 100);
            let output_summary = truncate(result.output.as_deref().or(result.error.as_deref()).unwrap_or(""), 200);

            self.recorder.log_step(
                &self.spec.id,
                StepType::Tool,
                if result.ok { StepStatus::Ok } else { StepStatus::Error },
                json!({ "tool_name": "python_exec", "input_summary": input_summary, "output_summary": output_summary }),
                Some(result.metadata.clone()),
            );

            results.push(ToolInvocationResult {
                tool_name: "python_exec".to_string(),
                ok: result.ok,
                output: result.output.clone(),
                error: result.error.clone(),
                metadata: result.metadata.clone(),
            });
        }
        results
    }
}

fn extract_json_block(content: &str) -> Option<Value> {
    let re = Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("static regex");
    let block = re.captures(content)?.get(1)?.as_str();
    serde_json::from_str(block).ok()
}

fn extract_code_blocks(content: &str) -> Vec<String> {
    let re = Regex::new(r"(?s)```(?:python|py|python_exec)\s*\n(.*?)```").expect("static regex");
    re.captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .collect()
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
    use super::*;

    #[test]
    fn extracts_fenced_json_surrounded_by_prose() {
        let content = "Here is the result:\n```json\n{\"result\": 1, \"steps\": []}\n```\nThanks.";
        let value = extract_json_block(content).unwrap();
        assert_eq!(value["result"], 1);
    }

    #[test]
    fn extracts_python_blocks_in_document_order() {
        let content = "```python\nprint(1)\n```\nsome prose\n```py\nprint(2)\n```";
        let blocks = extract_code_blocks(content);
        assert_eq!(blocks, vec!["print(1)".to_string(), "print(2)".to_string()]);
    }

    #[test]
    fn truncate_bounds_to_char_count() {
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("hi", 5), "hi");
    }
}
