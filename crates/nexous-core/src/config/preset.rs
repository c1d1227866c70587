//! Preset file model: role, system prompt, tool whitelist and LLM policy.
//!
//! Presets are loaded once at Runner start and never mutated afterwards; the
//! in-memory `PresetCache` is a read-only, explicitly-owned map (see
//! `config::loader::PresetLoader`), not an ambient singleton.

use serde::{Deserialize, Serialize};

fn default_retry() -> u32 {
    3
}
fn default_retry_delay() -> f64 {
    1.0
}
fn default_timeout() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}

/// Primary + retry/fallback discipline for one preset's LLM calls.
///
/// Invariant: `primary` is always set; `fallback` may be empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMPolicy {
    pub primary: String,
    #[serde(default = "default_retry")]
    pub retry: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    #[serde(default)]
    pub fallback: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl LLMPolicy {
    /// Splits a `"<provider>/<model>"` spec into its two parts.
    pub fn split_spec(spec: &str) -> Option<(&str, &str)> {
        spec.split_once('/')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputPolicy {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub required_fields: Vec<String>,
}

impl OutputPolicy {
    pub fn wants_json(&self) -> bool {
        self.format.as_deref() == Some("json")
    }
}

/// Raw on-disk shape of a preset file; accepts either the preferred
/// `llm.policy` block or the legacy `llm.provider` + `llm.model` pair.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPresetFile {
    #[serde(default)]
    pub id: Option<String>,
    pub role: String,
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    pub llm: RawLlmBlock,
    #[serde(default)]
    pub output_policy: Option<OutputPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLlmBlock {
    #[serde(default)]
    pub policy: Option<LLMPolicy>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Loaded, validated preset, immutable for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetSpec {
    pub id: String,
    pub role: String,
    pub system_prompt: String,
    pub tools: Vec<String>,
    pub llm_policy: LLMPolicy,
    pub output_policy: Option<OutputPolicy>,
}
