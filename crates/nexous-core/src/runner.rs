//! Runner (C7): end-to-end orchestration. The only component that performs
//! project-level I/O beyond the preset/project loaders it calls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info};
use serde_json::json;
use uuid::Uuid;

use crate::agent::{Agent, AgentContext, AgentResult};
use crate::config::loader::{PresetCache, PresetLoader, ProjectLoader};
use crate::config::project::ProjectSpec;
use crate::errors::{ErrorKind, NexousError};
use crate::llm::providers::ProviderRegistry;
use crate::resolver::resolve_order;
use crate::tools::ToolRegistry;
use crate::trace::{AgentStatus, RunStatus, StepStatus, StepType, TraceRecorder, RUNNER_INIT_STEP};

const RUNNER_AGENT_ID: &str = "runner";

pub struct RunOptions {
    pub run_id: Option<String>,
    pub use_llm: bool,
    pub dry_run: bool,
    pub trace_root: PathBuf,
    pub preset_dir: PathBuf,
    pub tool_base_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub trace_path: PathBuf,
}

pub struct Runner;

impl Runner {
    /// Drives one run of `project_path` to completion, writing exactly one
    /// `trace.json` regardless of where in the pipeline it fails.
    pub async fn run(project_path: &Path, options: RunOptions) -> Result<RunOutcome, NexousError> {
        let run_id = options.run_id.clone().unwrap_or_else(generate_run_id);
        let recorder = TraceRecorder::new(&options.trace_root);

        let (project, presets) = match Self::load(project_path, &options.preset_dir) {
            Ok(loaded) => loaded,
            Err(e) => {
                let fallback_project_id =
                    project_path.file_stem().and_then(|s| s.to_str()).unwrap_or("project").to_string();
                recorder.ensure_started(&fallback_project_id, &run_id, "sequential");
                recorder.log_error(RUNNER_AGENT_ID, RUNNER_INIT_STEP, e.kind(), &e.to_string(), false);
                recorder.end_run(RunStatus::Failed)?;
                error!("run '{run_id}' failed during load: {e}");
                return Err(e);
            }
        };

        recorder
            .start_run(&project.project_id, &run_id, &project.execution_mode)
            .map_err(|message| NexousError::AgentCreation { agent_id: RUNNER_AGENT_ID.to_string(), message })?;

        if options.dry_run {
            info!("dry-run: project '{}' and its presets validated successfully", project.project_id);
            let trace_path = recorder.end_run(RunStatus::Completed)?;
            return Ok(RunOutcome { run_id, status: RunStatus::Completed, trace_path });
        }

        let ordered_specs = match resolve_order(&project.agents) {
            Ok(order) => order,
            Err(e) => {
                recorder.log_error(RUNNER_AGENT_ID, RUNNER_INIT_STEP, e.kind(), &e.to_string(), false);
                recorder.end_run(RunStatus::Failed)?;
                error!("run '{run_id}' failed to resolve dependency order: {e}");
                return Err(e);
            }
        };

        let registry = Arc::new(ProviderRegistry::new());
        let tools = Arc::new(ToolRegistry::new(options.tool_base_dir.clone()));

        let mut agents = Vec::with_capacity(ordered_specs.len());
        for spec in ordered_specs {
            let preset = match presets.get(&spec.preset) {
                Ok(preset) => preset.clone(),
                Err(e) => {
                    recorder.log_error(&spec.id, RUNNER_INIT_STEP, e.kind(), &e.to_string(), false);
                    recorder.end_run(RunStatus::Failed)?;
                    error!("run '{run_id}' failed to instantiate agent '{}': {e}", spec.id);
                    return Err(e);
                }
            };
            agents.push(Agent::new(spec, preset, registry.clone(), recorder.clone(), tools.clone(), options.use_llm));
        }

        let mut previous_results: HashMap<String, AgentResult> = HashMap::new();

        for agent in &agents {
            let agent_id = agent.id().to_string();
            recorder
                .start_agent(&agent_id, agent.preset_id(), agent.purpose())
                .map_err(|message| NexousError::AgentCreation { agent_id: agent_id.clone(), message })?;

            let dependency_results_present: Vec<&str> = previous_results.keys().map(String::as_str).collect();
            recorder.log_step(
                &agent_id,
                StepType::Input,
                StepStatus::Ok,
                json!({ "input_keys": agent.input_keys(), "dependency_results_present": dependency_results_present }),
                None,
            );

            let ctx = AgentContext { project: &project, previous_results: &previous_results };
            match agent.execute(&ctx).await {
                Ok(result) => {
                    recorder.log_step(
                        &agent_id,
                        StepType::Output,
                        StepStatus::Ok,
                        json!({ "output_keys": ["status", "content", "validated_output", "tool_results"] }),
                        Some(json!({ "tool_call_count": result.tool_results.len() })),
                    );
                    recorder.end_agent(&agent_id, AgentStatus::Completed);
                    previous_results.insert(agent_id, result);
                }
                Err(e) => {
                    recorder.log_error(&agent_id, RUNNER_INIT_STEP, ErrorKind::AgentError, &e.to_string(), false);
                    recorder.end_agent(&agent_id, AgentStatus::Failed);
                    error!("agent '{agent_id}' failed: {e}");
                    let trace_path = recorder.end_run(RunStatus::Failed)?;
                    info!("run '{run_id}' finished with status FAILED, trace at {}", trace_path.display());
                    return Err(NexousError::AgentExecution { agent_id, message: e.to_string() });
                }
            }
        }

        let trace_path = recorder.end_run(RunStatus::Completed)?;
        info!("run '{run_id}' finished with status COMPLETED, trace at {}", trace_path.display());
        Ok(RunOutcome { run_id, status: RunStatus::Completed, trace_path })
    }

    /// Phase 1: parse the project file and load every preset it references.
    fn load(project_path: &Path, preset_dir: &Path) -> Result<(ProjectSpec, PresetCache), NexousError> {
        let project = ProjectLoader::load_file(project_path)?;
        let presets = PresetLoader::load_dir(preset_dir)?;
        for spec in &project.agents {
            presets.get(&spec.preset)?;
        }
        Ok((project, presets))
    }
}

/// `run_<YYYYMMDD_HHMMSS>_<6-hex-random>`, using wall-clock UTC.
pub fn generate_run_id() -> String {
    let now = chrono::Utc::now();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("run_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..6])
}

/// Truthy values ("true", "1", "yes", case-insensitive) force real LLM mode.
pub fn use_llm_from_env() -> bool {
    std::env::var("NEXOUS_USE_LLM")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_has_expected_shape() {
        let id = generate_run_id();
        assert!(id.starts_with("run_"));
        let parts: Vec<&str> = id.trim_start_matches("run_").split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 6);
    }

    #[test]
    fn use_llm_env_flag_is_case_insensitive() {
        std::env::set_var("NEXOUS_USE_LLM", "TRUE");
        assert!(use_llm_from_env());
        std::env::set_var("NEXOUS_USE_LLM", "0");
        assert!(!use_llm_from_env());
        std::env::remove_var("NEXOUS_USE_LLM");
        assert!(!use_llm_from_env());
    }
}
