//! Loaders for project and preset files.
//!
//! Ported from the original `PresetLoader`/project-loading logic: presets are
//! globbed from a directory once at Runner start into a read-only
//! `PresetCache`; a project file is parsed and schema-validated into a
//! `ProjectSpec`. Neither loader keeps any mutable global state — callers own
//! the returned structures.

use std::collections::HashMap;
use std::path::Path;

use log::{debug, warn};

use crate::config::preset::{LLMPolicy, PresetSpec, RawPresetFile};
use crate::config::project::{AgentSpec, ProjectSpec, RawProjectFile};
use crate::errors::NexousError;

/// Read-only, explicitly-owned cache of loaded presets, keyed by preset id.
#[derive(Debug, Clone, Default)]
pub struct PresetCache {
    presets: HashMap<String, PresetSpec>,
}

impl PresetCache {
    pub fn get(&self, id: &str) -> Result<&PresetSpec, NexousError> {
        self.presets.get(id).ok_or_else(|| NexousError::PresetNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

pub struct PresetLoader;

impl PresetLoader {
    /// Loads every `*.yaml` file directly under `dir` into a `PresetCache`.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<PresetCache, NexousError> {
        let dir = dir.as_ref();
        let mut presets = HashMap::new();
        let entries = std::fs::read_dir(dir)?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("preset")
                .to_string();
            let preset = Self::load_file(&path, &stem)?;
            debug!("loaded preset '{}' from {}", preset.id, path.display());
            presets.insert(preset.id.clone(), preset);
        }
        Ok(PresetCache { presets })
    }

    fn load_file(path: &Path, stem: &str) -> Result<PresetSpec, NexousError> {
        let content = std::fs::read_to_string(path)?;
        let raw: RawPresetFile = serde_yaml::from_str(&content)
            .map_err(|e| NexousError::PresetLoad { preset_id: stem.to_string(), message: e.to_string() })?;

        let id = raw.id.clone().unwrap_or_else(|| stem.to_string());

        if raw.role.trim().is_empty() {
            return Err(NexousError::PresetLoad { preset_id: id, message: "missing required field 'role'".to_string() });
        }
        if raw.system_prompt.trim().is_empty() {
            return Err(NexousError::PresetLoad { preset_id: id, message: "missing required field 'system_prompt'".to_string() });
        }

        let llm_policy = if let Some(policy) = raw.llm.policy {
            policy
        } else if let (Some(provider), Some(model)) = (raw.llm.provider.clone(), raw.llm.model.clone()) {
            // Legacy llm.provider + llm.model, promoted to a single-entry policy.
            LLMPolicy {
                primary: format!("{provider}/{model}"),
                retry: 3,
                retry_delay: 1.0,
                fallback: Vec::new(),
                timeout: 60,
                temperature: 0.7,
                max_tokens: 1024,
            }
        } else {
            return Err(NexousError::PresetLoad {
                preset_id: id,
                message: "llm config must set either 'policy.primary' or legacy 'provider'+'model'".to_string(),
            });
        };

        Ok(PresetSpec {
            id,
            role: raw.role,
            system_prompt: raw.system_prompt,
            tools: raw.tools,
            llm_policy,
            output_policy: raw.output_policy,
        })
    }
}

pub struct ProjectLoader;

impl ProjectLoader {
    pub fn load_file(path: impl AsRef<Path>) -> Result<ProjectSpec, NexousError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| NexousError::YamlParse(e.to_string()))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("project")
            .to_string();
        Self::load_str(&content, &stem)
    }

    pub fn load_str(content: &str, default_project_id: &str) -> Result<ProjectSpec, NexousError> {
        let raw: RawProjectFile = serde_yaml::from_str(content)?;

        if raw.agents.is_empty() {
            return Err(NexousError::SchemaValidation("project must declare at least one agent".to_string()));
        }

        let mut agents = Vec::with_capacity(raw.agents.len());
        for (index, raw_agent) in raw.agents.into_iter().enumerate() {
            let id = raw_agent.id.ok_or_else(|| {
                NexousError::SchemaValidation(format!("agents[{index}] missing required field 'id'"))
            })?;
            let preset = raw_agent.preset.ok_or_else(|| {
                NexousError::SchemaValidation(format!("agent '{id}' missing required field 'preset'"))
            })?;
            agents.push(AgentSpec {
                id,
                preset,
                purpose: raw_agent.purpose,
                inputs: raw_agent.inputs,
                dependencies: raw_agent.dependencies,
                output_policy: raw_agent.output_policy,
            });
        }

        let execution_mode = raw
            .execution
            .and_then(|e| e.mode)
            .unwrap_or_else(|| "sequential".to_string());
        if execution_mode != "sequential" {
            warn!("execution mode '{execution_mode}' is not sequential; only sequential execution is implemented");
        }

        Ok(ProjectSpec {
            project_id: raw.project_id.unwrap_or_else(|| default_project_id.to_string()),
            execution_mode,
            agents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_loader_rejects_empty_agent_list() {
        let err = ProjectLoader::load_str("project_id: p\nagents: []\n", "p").unwrap_err();
        assert!(matches!(err, NexousError::SchemaValidation(_)));
    }

    #[test]
    fn project_loader_rejects_agent_missing_id() {
        let yaml = "agents:\n  - preset: planner\n    purpose: plan\n";
        let err = ProjectLoader::load_str(yaml, "p").unwrap_err();
        assert!(matches!(err, NexousError::SchemaValidation(_)));
    }

    #[test]
    fn project_loader_defaults_project_id_to_file_stem() {
        let yaml = "agents:\n  - id: a1\n    preset: planner\n    purpose: plan\n";
        let spec = ProjectLoader::load_str(yaml, "my-project").unwrap();
        assert_eq!(spec.project_id, "my-project");
        assert_eq!(spec.execution_mode, "sequential");
        assert_eq!(spec.agents.len(), 1);
    }

    #[test]
    fn preset_loader_loads_policy_style_llm_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("planner.yaml"),
            "role: Planner\nsystem_prompt: be terse\nllm:\n  policy:\n    primary: openai/gpt-4o\n    retry: 2\n    retry_delay: 0.5\n    fallback: []\n    timeout: 30\n    temperature: 0.5\n    max_tokens: 512\n",
        )
        .unwrap();

        let cache = PresetLoader::load_dir(dir.path()).unwrap();
        let preset = cache.get("planner").unwrap();
        assert_eq!(preset.llm_policy.primary, "openai/gpt-4o");
        assert_eq!(preset.llm_policy.retry, 2);
    }

    #[test]
    fn preset_loader_promotes_legacy_provider_model_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("writer.yaml"),
            "role: Writer\nsystem_prompt: write things\nllm:\n  provider: anthropic\n  model: claude-3-5-sonnet-20241022\n",
        )
        .unwrap();

        let cache = PresetLoader::load_dir(dir.path()).unwrap();
        let preset = cache.get("writer").unwrap();
        assert_eq!(preset.llm_policy.primary, "anthropic/claude-3-5-sonnet-20241022");
        assert_eq!(preset.llm_policy.retry, 3);
        assert!(preset.llm_policy.fallback.is_empty());
    }

    #[test]
    fn preset_loader_rejects_missing_system_prompt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("bad.yaml"),
            "role: Planner\nllm:\n  provider: openai\n  model: gpt-4o\n",
        )
        .unwrap();

        let err = PresetLoader::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, NexousError::PresetLoad { .. }));
    }
}
