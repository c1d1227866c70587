//! Tool Registry & Tools (C5): a closed whitelist of three sandboxed
//! operations. Requests for any other name fail immediately.

pub mod file_read;
pub mod file_write;
pub mod python_exec;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// `{ok, output?, error?, metadata}`, matching the tool result contract in
/// the specification verbatim.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: Value,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>, tool_name: &str, latency_ms: u64, extra: Value) -> Self {
        let mut metadata = serde_json::json!({ "latency_ms": latency_ms, "tool_name": tool_name });
        if let (Some(meta_map), Some(extra_map)) = (metadata.as_object_mut(), extra.as_object()) {
            for (k, v) in extra_map {
                meta_map.insert(k.clone(), v.clone());
            }
        }
        Self { ok: true, output: Some(output.into()), error: None, metadata }
    }

    pub fn err(error: impl Into<String>, tool_name: &str, latency_ms: u64) -> Self {
        Self {
            ok: false,
            output: None,
            error: Some(error.into()),
            metadata: serde_json::json!({ "latency_ms": latency_ms, "tool_name": tool_name }),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, arguments: Value) -> ToolResult;
}

/// Closed whitelist: `python_exec`, `file_read`, `file_write`. A request for
/// any other name resolves to an `ok=false` `ToolResult` before any tool runs.
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(base_dir: impl Into<std::path::PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let mut tools: HashMap<&'static str, Arc<dyn Tool>> = HashMap::new();
        tools.insert("python_exec", Arc::new(python_exec::PythonExecTool::new()));
        tools.insert("file_read", Arc::new(file_read::FileReadTool::new(base_dir.clone())));
        tools.insert("file_write", Arc::new(file_write::FileWriteTool::new(base_dir)));
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Runs `tool_name`, or returns an `ok=false` result immediately if the
    /// name is outside the closed whitelist. A missing tool is itself a
    /// non-terminal result, consistent with the "tool errors never fail the
    /// agent" rule — the caller still records a TOOL StepRecord for it.
    pub async fn invoke(&self, tool_name: &str, arguments: Value) -> ToolResult {
        match self.tools.get(tool_name) {
            Some(tool) => tool.execute(arguments).await,
            None => ToolResult::err(format!("tool '{tool_name}' is not a recognised tool"), tool_name, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_all_three_whitelisted_tools() {
        let registry = ToolRegistry::new(std::env::temp_dir());
        assert!(registry.get("python_exec").is_some());
        assert!(registry.get("file_read").is_some());
        assert!(registry.get("file_write").is_some());
        assert!(registry.get("shell_exec").is_none());
    }

    #[tokio::test]
    async fn invoking_unknown_tool_returns_ok_false_without_panicking() {
        let registry = ToolRegistry::new(std::env::temp_dir());
        let result = registry.invoke("shell_exec", serde_json::json!({})).await;
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("not a recognised tool"));
    }
}
