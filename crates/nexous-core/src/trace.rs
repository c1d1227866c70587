//! Trace Recorder (C1): the single-writer, append-only log of one run.
//!
//! A `TraceRecorder` owns all timestamps and numeric aggregation for a run.
//! It performs no I/O until `end_run`, at which point it serialises the
//! accumulated `Trace` as pretty-printed JSON to the canonical path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ErrorKind, NexousError};

pub const TRACE_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepType {
    Input,
    Llm,
    Tool,
    Output,
}

impl StepType {
    fn tag(&self) -> &'static str {
        match self {
            StepType::Input => "INPUT",
            StepType::Llm => "LLM",
            StepType::Tool => "TOOL",
            StepType::Output => "OUTPUT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTrace {
    pub agent_id: String,
    pub preset_id: String,
    pub purpose: String,
    pub status: AgentStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub steps: Vec<StepRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub agent_id: String,
    pub step_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub recoverable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: String,
    pub kind: String,
    pub path: String,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Summary {
    pub total_agents: usize,
    pub completed_agents: usize,
    pub failed_agents: usize,
    pub total_llm_calls: usize,
    pub total_tool_calls: usize,
    pub total_tokens: u64,
    pub total_duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub schema_version: String,
    pub project_id: String,
    pub run_id: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub execution_mode: String,
    pub agents: Vec<AgentTrace>,
    pub errors: Vec<ErrorRecord>,
    pub artifacts: Vec<ArtifactRecord>,
    pub summary: Option<Summary>,
}

/// The synthetic step id used for errors raised before any agent starts.
pub const RUNNER_INIT_STEP: &str = "runner.init";

struct RecorderState {
    trace: Option<Trace>,
    /// Per-agent monotonic step ordinal, keyed by agent id.
    step_ordinals: HashMap<String, u64>,
    /// Index into `trace.agents` of the AgentTrace currently RUNNING, if any.
    running_agent: HashMap<String, usize>,
}

/// Single-writer append log for one run. Cheaply cloneable; all clones share
/// the same underlying state, matching the "single recorder instance per run"
/// contract in the specification.
#[derive(Clone)]
pub struct TraceRecorder {
    state: std::sync::Arc<Mutex<RecorderState>>,
    trace_root: PathBuf,
}

impl TraceRecorder {
    pub fn new(trace_root: impl Into<PathBuf>) -> Self {
        Self {
            state: std::sync::Arc::new(Mutex::new(RecorderState {
                trace: None,
                step_ordinals: HashMap::new(),
                running_agent: HashMap::new(),
            })),
            trace_root: trace_root.into(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecorderState> {
        self.state.lock().expect("trace recorder mutex poisoned")
    }

    pub fn start_run(&self, project_id: &str, run_id: &str, execution_mode: &str) -> Result<(), String> {
        let mut state = self.lock();
        if state.trace.is_some() {
            return Err(format!("start_run called twice for run '{run_id}'"));
        }
        state.trace = Some(Trace {
            schema_version: TRACE_SCHEMA_VERSION.to_string(),
            project_id: project_id.to_string(),
            run_id: run_id.to_string(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: 0,
            execution_mode: execution_mode.to_string(),
            agents: Vec::new(),
            errors: Vec::new(),
            artifacts: Vec::new(),
            summary: None,
        });
        debug!("trace started for run '{run_id}'");
        Ok(())
    }

    /// Creates a minimal RUNNING trace if one was never started, so that a
    /// failure before any agent executes still produces a valid `trace.json`.
    pub fn ensure_started(&self, project_id: &str, run_id: &str, execution_mode: &str) {
        let mut state = self.lock();
        if state.trace.is_none() {
            state.trace = Some(Trace {
                schema_version: TRACE_SCHEMA_VERSION.to_string(),
                project_id: project_id.to_string(),
                run_id: run_id.to_string(),
                status: RunStatus::Running,
                start_time: Utc::now(),
                end_time: None,
                duration_ms: 0,
                execution_mode: execution_mode.to_string(),
                agents: Vec::new(),
                errors: Vec::new(),
                artifacts: Vec::new(),
                summary: None,
            });
        }
    }

    pub fn start_agent(&self, agent_id: &str, preset_id: &str, purpose: &str) -> Result<(), String> {
        let mut state = self.lock();
        if state.running_agent.contains_key(agent_id) {
            return Err(format!("agent '{agent_id}' is already running in this trace"));
        }
        let trace = state.trace.as_mut().expect("start_run must precede start_agent");
        let index = trace.agents.len();
        trace.agents.push(AgentTrace {
            agent_id: agent_id.to_string(),
            preset_id: preset_id.to_string(),
            purpose: purpose.to_string(),
            status: AgentStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            steps: Vec::new(),
        });
        state.running_agent.insert(agent_id.to_string(), index);
        state.step_ordinals.insert(agent_id.to_string(), 0);
        Ok(())
    }

    pub fn log_step(
        &self,
        agent_id: &str,
        step_type: StepType,
        status: StepStatus,
        payload: Value,
        metadata: Option<Value>,
    ) -> String {
        let mut state = self.lock();
        let ordinal = {
            let counter = state.step_ordinals.entry(agent_id.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        let step_id = format!("{agent_id}.{ordinal}.{}", step_type.tag());
        let index = *state
            .running_agent
            .get(agent_id)
            .expect("log_step requires a running agent");
        let trace = state.trace.as_mut().expect("trace must be started");
        trace.agents[index].steps.push(StepRecord {
            step_id: step_id.clone(),
            step_type,
            status,
            timestamp: Utc::now(),
            payload,
            metadata: metadata.unwrap_or(Value::Null),
        });
        step_id
    }

    pub fn register_artifact(&self, id: &str, kind: &str, path: &str, created_by: &str) {
        let mut state = self.lock();
        let trace = state.trace.as_mut().expect("trace must be started");
        trace.artifacts.push(ArtifactRecord {
            id: id.to_string(),
            kind: kind.to_string(),
            path: path.to_string(),
            created_by: created_by.to_string(),
        });
    }

    pub fn log_error(&self, agent_id: &str, step_id: &str, kind: ErrorKind, message: &str, recoverable: bool) {
        let mut state = self.lock();
        let trace = state.trace.as_mut().expect("trace must be started");
        trace.errors.push(ErrorRecord {
            agent_id: agent_id.to_string(),
            step_id: step_id.to_string(),
            kind: kind.as_tag().to_string(),
            message: message.to_string(),
            recoverable,
        });
    }

    pub fn end_agent(&self, agent_id: &str, status: AgentStatus) {
        let mut state = self.lock();
        let index = state.running_agent.remove(agent_id);
        let trace = state.trace.as_mut().expect("trace must be started");
        if let Some(index) = index {
            trace.agents[index].status = status;
            trace.agents[index].end_time = Some(Utc::now());
        }
    }

    /// Computes the Summary, closes the Trace and writes it to
    /// `<trace-root>/<project-id>/<run-id>/trace.json`.
    pub fn end_run(&self, status: RunStatus) -> Result<PathBuf, NexousError> {
        let mut state = self.lock();
        let trace = state.trace.as_mut().expect("trace must be started before end_run");

        let end_time = Utc::now();
        let duration_ms = (end_time - trace.start_time).num_milliseconds();

        let mut summary = Summary {
            total_agents: trace.agents.len(),
            total_duration_ms: duration_ms,
            ..Default::default()
        };
        for agent in &trace.agents {
            match agent.status {
                AgentStatus::Completed => summary.completed_agents += 1,
                AgentStatus::Failed => summary.failed_agents += 1,
                _ => {}
            }
            for step in &agent.steps {
                match (step.step_type, step.status) {
                    (StepType::Llm, StepStatus::Ok) => {
                        summary.total_llm_calls += 1;
                        let tokens_input = step.metadata.get("tokens_input").and_then(Value::as_u64).unwrap_or(0);
                        let tokens_output = step.metadata.get("tokens_output").and_then(Value::as_u64).unwrap_or(0);
                        summary.total_tokens += tokens_input + tokens_output;
                    }
                    (StepType::Tool, _) => summary.total_tool_calls += 1,
                    _ => {}
                }
            }
        }

        trace.status = status;
        trace.end_time = Some(end_time);
        trace.duration_ms = duration_ms;
        trace.summary = Some(summary);

        let project_id = trace.project_id.clone();
        let run_id = trace.run_id.clone();
        let path = self.canonical_path(&project_id, &run_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(trace)
            .map_err(|e| NexousError::Io(format!("failed to serialise trace: {e}")))?;
        std::fs::write(&path, json)?;
        info!("trace written to {}", path.display());
        Ok(path)
    }

    pub fn canonical_path(&self, project_id: &str, run_id: &str) -> PathBuf {
        self.trace_root.join(project_id).join(run_id).join("trace.json")
    }

    /// Snapshot of the in-progress trace, mainly for tests.
    pub fn snapshot(&self) -> Trace {
        self.lock().trace.clone().expect("trace must be started")
    }
}

pub fn load_trace(path: impl AsRef<Path>) -> Result<Trace, NexousError> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| NexousError::YamlParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> TraceRecorder {
        TraceRecorder::new(tempfile::tempdir().unwrap().into_path())
    }

    #[test]
    fn start_run_twice_fails() {
        let recorder = recorder();
        recorder.start_run("proj", "run1", "sequential").unwrap();
        let err = recorder.start_run("proj", "run1", "sequential").unwrap_err();
        assert!(err.contains("twice"));
    }

    #[test]
    fn start_agent_duplicate_fails() {
        let recorder = recorder();
        recorder.start_run("proj", "run1", "sequential").unwrap();
        recorder.start_agent("a1", "planner", "plan").unwrap();
        let err = recorder.start_agent("a1", "planner", "plan").unwrap_err();
        assert!(err.contains("already running"));
    }

    #[test]
    fn log_step_assigns_monotonic_ordinals_per_agent() {
        let recorder = recorder();
        recorder.start_run("proj", "run1", "sequential").unwrap();
        recorder.start_agent("a1", "planner", "plan").unwrap();

        let id1 = recorder.log_step("a1", StepType::Input, StepStatus::Ok, json!({}), None);
        let id2 = recorder.log_step("a1", StepType::Llm, StepStatus::Ok, json!({}), None);
        assert_eq!(id1, "a1.1.INPUT");
        assert_eq!(id2, "a1.2.LLM");
    }

    #[test]
    fn end_run_computes_summary_matching_recorded_steps() {
        let recorder = recorder();
        recorder.start_run("proj", "run1", "sequential").unwrap();

        recorder.start_agent("a1", "planner", "plan").unwrap();
        recorder.log_step("a1", StepType::Input, StepStatus::Ok, json!({}), None);
        recorder.log_step(
            "a1",
            StepType::Llm,
            StepStatus::Ok,
            json!({}),
            Some(json!({"tokens_input": 10, "tokens_output": 5})),
        );
        recorder.log_step("a1", StepType::Tool, StepStatus::Ok, json!({}), None);
        recorder.log_step("a1", StepType::Output, StepStatus::Ok, json!({}), None);
        recorder.end_agent("a1", AgentStatus::Completed);

        recorder.start_agent("a2", "writer", "write").unwrap();
        recorder.log_step("a2", StepType::Input, StepStatus::Ok, json!({}), None);
        recorder.end_agent("a2", AgentStatus::Failed);

        let path = recorder.end_run(RunStatus::Failed).unwrap();
        let trace = load_trace(&path).unwrap();

        let summary = trace.summary.expect("summary must be set");
        assert_eq!(summary.total_agents, 2);
        assert_eq!(summary.completed_agents, 1);
        assert_eq!(summary.failed_agents, 1);
        assert_eq!(summary.total_llm_calls, 1);
        assert_eq!(summary.total_tool_calls, 1);
        assert_eq!(summary.total_tokens, 15);
        assert_eq!(trace.status, RunStatus::Failed);
    }

    #[test]
    fn canonical_path_has_project_run_and_filename() {
        let recorder = recorder();
        let path = recorder.canonical_path("proj-a", "run-b");
        assert!(path.ends_with("proj-a/run-b/trace.json"));
    }

    #[test]
    fn end_run_serialisation_round_trips() {
        let recorder = recorder();
        recorder.start_run("proj", "run1", "sequential").unwrap();
        recorder.start_agent("a1", "planner", "plan").unwrap();
        recorder.end_agent("a1", AgentStatus::Completed);
        let path = recorder.end_run(RunStatus::Completed).unwrap();

        let first = std::fs::read_to_string(&path).unwrap();
        let reloaded = load_trace(&path).unwrap();
        let second = serde_json::to_string_pretty(&reloaded).unwrap();

        let first_value: Value = serde_json::from_str(&first).unwrap();
        let second_value: Value = serde_json::from_str(&second).unwrap();
        assert_eq!(first_value, second_value);
    }

    #[test]
    fn ensure_started_is_noop_when_trace_already_started() {
        let recorder = recorder();
        recorder.start_run("proj", "run1", "sequential").unwrap();
        recorder.start_agent("a1", "planner", "plan").unwrap();
        recorder.ensure_started("proj", "run1", "sequential");
        assert_eq!(recorder.snapshot().agents.len(), 1);
    }

    #[test]
    fn log_error_does_not_change_agent_status() {
        let recorder = recorder();
        recorder.start_run("proj", "run1", "sequential").unwrap();
        recorder.start_agent("a1", "planner", "plan").unwrap();
        recorder.log_error("a1", RUNNER_INIT_STEP, ErrorKind::ToolError, "boom", false);
        assert_eq!(recorder.snapshot().agents[0].status, AgentStatus::Running);
        assert_eq!(recorder.snapshot().errors.len(), 1);
    }
}
