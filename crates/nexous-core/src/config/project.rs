//! Project file model: the agent graph submitted for one run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::preset::OutputPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct RawProjectFile {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub execution: Option<RawExecutionBlock>,
    #[serde(default)]
    pub agents: Vec<RawAgentSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawExecutionBlock {
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAgentSpec {
    pub id: Option<String>,
    pub preset: Option<String>,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub inputs: HashMap<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub output_policy: Option<OutputPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    pub preset: String,
    pub purpose: String,
    pub inputs: HashMap<String, Value>,
    pub dependencies: Vec<String>,
    pub output_policy: Option<OutputPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub project_id: String,
    pub execution_mode: String,
    pub agents: Vec<AgentSpec>,
}
