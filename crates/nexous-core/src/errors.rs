//! Error types for the run engine.
//!
//! Every terminal failure carries an `ErrorKind` tag that is written verbatim
//! into a trace `ErrorRecord.type`. Recoverable LLM failures are represented
//! separately (see `llm::ProviderError`) and only surface here once a Router
//! has exhausted every provider.

use thiserror::Error;

/// Error-kind tags carried verbatim into `ErrorRecord.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    YamlParse,
    SchemaValidation,
    PresetNotFound,
    PresetLoad,
    DependencyCycle,
    DependencyNotFound,
    AgentCreation,
    AgentError,
    LlmAllFailed,
    ToolError,
}

impl ErrorKind {
    pub fn as_tag(&self) -> &'static str {
        match self {
            ErrorKind::YamlParse => "YAML_PARSE_ERROR",
            ErrorKind::SchemaValidation => "SCHEMA_VALIDATION_ERROR",
            ErrorKind::PresetNotFound => "PRESET_NOT_FOUND_ERROR",
            ErrorKind::PresetLoad => "PRESET_LOAD_ERROR",
            ErrorKind::DependencyCycle => "DEPENDENCY_CYCLE_ERROR",
            ErrorKind::DependencyNotFound => "DEPENDENCY_NOT_FOUND_ERROR",
            ErrorKind::AgentCreation => "AGENT_CREATION_ERROR",
            ErrorKind::AgentError => "AGENT_ERROR",
            ErrorKind::LlmAllFailed => "LLM_ALL_FAILED",
            ErrorKind::ToolError => "TOOL_ERROR",
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum NexousError {
    #[error("project file unreadable or invalid YAML: {0}")]
    YamlParse(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("preset '{0}' not found")]
    PresetNotFound(String),

    #[error("preset '{preset_id}' failed to load: {message}")]
    PresetLoad { preset_id: String, message: String },

    #[error("dependency cycle detected, participant: {0}")]
    DependencyCycle(String),

    #[error("agent '{agent_id}' depends on unknown agent '{target}'")]
    DependencyNotFound { agent_id: String, target: String },

    #[error("failed to create agent '{agent_id}': {message}")]
    AgentCreation { agent_id: String, message: String },

    #[error("agent '{agent_id}' execution failed: {message}")]
    AgentExecution { agent_id: String, message: String },

    #[error("all LLM providers failed after {attempts} attempt(s): {message}")]
    LlmAllProvidersFailed { attempts: usize, message: String },

    #[error("tool '{tool_name}' failed: {message}")]
    ToolError { tool_name: String, message: String },

    #[error("I/O error: {0}")]
    Io(String),
}

impl NexousError {
    /// Maps a terminal error to the trace-level `ErrorKind` tag it is recorded under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NexousError::YamlParse(_) => ErrorKind::YamlParse,
            NexousError::SchemaValidation(_) => ErrorKind::SchemaValidation,
            NexousError::PresetNotFound(_) => ErrorKind::PresetNotFound,
            NexousError::PresetLoad { .. } => ErrorKind::PresetLoad,
            NexousError::DependencyCycle(_) => ErrorKind::DependencyCycle,
            NexousError::DependencyNotFound { .. } => ErrorKind::DependencyNotFound,
            NexousError::AgentCreation { .. } => ErrorKind::AgentCreation,
            // Both a raw agent execution failure and a Router exhausting every
            // provider are recorded against the agent as AGENT_ERROR; the more
            // specific LLM_ALL_FAILED tag is used at the point the Router
            // itself gives up, before it is wrapped into an AgentExecution.
            NexousError::AgentExecution { .. } => ErrorKind::AgentError,
            NexousError::LlmAllProvidersFailed { .. } => ErrorKind::LlmAllFailed,
            NexousError::ToolError { .. } => ErrorKind::ToolError,
            NexousError::Io(_) => ErrorKind::YamlParse,
        }
    }
}

impl From<std::io::Error> for NexousError {
    fn from(err: std::io::Error) -> Self {
        NexousError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for NexousError {
    fn from(err: serde_yaml::Error) -> Self {
        NexousError::YamlParse(err.to_string())
    }
}
