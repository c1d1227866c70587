//! `python_exec`: runs code in a restricted Python global environment.
//!
//! The original executes code via CPython's own `exec()` with a curated
//! `__builtins__` mapping; this port embeds CPython through `pyo3` (the same
//! crate the pack's `iron-cage-sdk`/`swarms-rs` examples use to bridge into
//! Python) and reconstructs the same restricted-globals discipline: only an
//! explicit builtin enumeration and a closed module allow-list are reachable
//! from executed code.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{error, info};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyTuple};
use serde_json::{json, Value};

use super::{Tool, ToolResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const ALLOWED_BUILTINS: &[&str] = &[
    "int", "float", "str", "bool", "list", "dict", "set", "tuple", "print", "len", "range",
    "enumerate", "zip", "map", "filter", "sorted", "reversed", "sum", "min", "max", "abs",
    "round", "pow", "isinstance", "type", "hasattr", "getattr", "setattr", "Exception",
    "ValueError", "TypeError", "KeyError", "IndexError",
];

const ALLOWED_MODULES: &[&str] =
    &["math", "statistics", "random", "datetime", "json", "re", "collections", "itertools", "functools"];

pub struct PythonExecTool;

impl PythonExecTool {
    pub fn new() -> Self {
        Self
    }

    fn run_restricted(code: &str) -> Result<String, String> {
        Python::with_gil(|py| {
            let builtins = py.import_bound("builtins").map_err(|e| e.to_string())?;

            let restricted = PyDict::new_bound(py);
            for name in ALLOWED_BUILTINS {
                match builtins.getattr(*name) {
                    Ok(value) => {
                        restricted.set_item(*name, value).ok();
                    }
                    Err(_) => {}
                }
            }

            // Intercept `import` so only the enumerated modules load.
            let allow_list = PyTuple::new_bound(py, ALLOWED_MODULES.iter().copied());
            restricted.set_item("_nexous_allowed", allow_list).ok();
            restricted
                .set_item("_nexous_real_import", builtins.getattr("__import__").map_err(|e| e.to_string())?)
                .ok();
            py.run_bound(IMPORT_GUARD_SRC, Some(&restricted), None).map_err(|e| e.to_string())?;
            let safe_import = restricted.get_item("_nexous_safe_import").map_err(|e| e.to_string())?;
            restricted.set_item("__import__", safe_import).ok();

            let globals = PyDict::new_bound(py);
            globals.set_item("__builtins__", restricted).ok();
            globals.set_item("__name__", "__main__").ok();
            let locals = PyDict::new_bound(py);

            // Redirect stdout/stderr into StringIO for the duration of the call.
            let io = py.import_bound("io").map_err(|e| e.to_string())?;
            let sys = py.import_bound("sys").map_err(|e| e.to_string())?;
            let captured_out = io.call_method0("StringIO").map_err(|e| e.to_string())?;
            let captured_err = io.call_method0("StringIO").map_err(|e| e.to_string())?;
            let old_stdout = sys.getattr("stdout").map_err(|e| e.to_string())?;
            let old_stderr = sys.getattr("stderr").map_err(|e| e.to_string())?;
            sys.setattr("stdout", &captured_out).ok();
            sys.setattr("stderr", &captured_err).ok();

            let exec_result = py.run_bound(code, Some(&globals), Some(&locals));

            sys.setattr("stdout", old_stdout).ok();
            sys.setattr("stderr", old_stderr).ok();

            match exec_result {
                Ok(()) => {
                    let stdout: String = captured_out.call_method0("getvalue").and_then(|v| v.extract()).unwrap_or_default();
                    let stderr: String = captured_err.call_method0("getvalue").and_then(|v| v.extract()).unwrap_or_default();
                    let mut output = stdout.trim().to_string();
                    if !stderr.trim().is_empty() {
                        output.push_str(&format!("\n[stderr]\n{}", stderr.trim()));
                    }
                    if output.is_empty() {
                        output = "(no output)".to_string();
                    }
                    Ok(output)
                }
                Err(e) => {
                    let is_syntax_error = py
                        .import_bound("builtins")
                        .ok()
                        .and_then(|b| b.getattr("SyntaxError").ok())
                        .map(|syntax_error| e.is_instance_bound(py, &syntax_error))
                        .unwrap_or(false);
                    if is_syntax_error {
                        Err(format!("SyntaxError: {e}"))
                    } else {
                        let exc_type = e.get_type_bound(py).name().map(|n| n.to_string()).unwrap_or_else(|_| "Exception".to_string());
                        Err(format!("{exc_type}: {e}"))
                    }
                }
            }
        })
    }
}

const IMPORT_GUARD_SRC: &str = "def _nexous_safe_import(name, *args, **kwargs):\n    if name not in _nexous_allowed:\n        raise ImportError(f\"Module '{name}' not allowed\")\n    return _nexous_real_import(name, *args, **kwargs)\n";

#[async_trait]
impl Tool for PythonExecTool {
    fn name(&self) -> &'static str {
        "python_exec"
    }

    async fn execute(&self, arguments: Value) -> ToolResult {
        let code = arguments.get("code").and_then(Value::as_str).unwrap_or("").to_string();
        let start = Instant::now();

        let result = tokio::task::spawn_blocking(move || Self::run_restricted(&code));
        let outcome = match tokio::time::timeout(DEFAULT_TIMEOUT, result).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => Err(format!("tool panicked: {join_error}")),
            Err(_) => Err(format!("python_exec timed out after {}s", DEFAULT_TIMEOUT.as_secs())),
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                info!("[PythonExec] success | {latency_ms}ms");
                ToolResult::ok(output, "python_exec", latency_ms, json!({}))
            }
            Err(message) => {
                error!("[PythonExec] {message}");
                ToolResult::err(message, "python_exec", latency_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prints_to_captured_stdout() {
        let tool = PythonExecTool::new();
        let result = tool.execute(json!({ "code": "print(2 + 3)" })).await;
        assert!(result.ok);
        assert_eq!(result.output.unwrap().trim(), "5");
    }

    #[tokio::test]
    async fn disallowed_import_fails_without_crashing() {
        let tool = PythonExecTool::new();
        let result = tool.execute(json!({ "code": "import os\nprint(os.getcwd())" })).await;
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("not allowed"));
    }

    #[tokio::test]
    async fn syntax_error_is_reported_as_such() {
        let tool = PythonExecTool::new();
        let result = tool.execute(json!({ "code": "def (" })).await;
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("SyntaxError"));
    }
}
