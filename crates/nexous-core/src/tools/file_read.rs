//! `file_read`: reads a UTF-8 text file relative to the run's base directory.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use log::{error, info};
use serde_json::{json, Value};

use super::{Tool, ToolResult};

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub struct FileReadTool {
    base_dir: PathBuf,
}

impl FileReadTool {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn resolve_path(&self, requested: &str) -> PathBuf {
        let requested = Path::new(requested);
        if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.base_dir.join(requested)
        }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &'static str {
        "file_read"
    }

    async fn execute(&self, arguments: Value) -> ToolResult {
        let start = Instant::now();
        let Some(path_arg) = arguments.get("path").and_then(Value::as_str) else {
            return ToolResult::err("missing required argument 'path'", "file_read", 0);
        };
        let path = self.resolve_path(path_arg);
        let latency = |start: Instant| start.elapsed().as_millis() as u64;

        if !path.exists() {
            let message = format!("file not found: {}", path.display());
            error!("[FileRead] {message}");
            return ToolResult::err(message, "file_read", latency(start));
        }
        if path.is_dir() {
            let message = format!("path is a directory, not a file: {}", path.display());
            error!("[FileRead] {message}");
            return ToolResult::err(message, "file_read", latency(start));
        }

        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.len() > MAX_FILE_SIZE => {
                let message = format!(
                    "file too large: {} bytes (max {} bytes)",
                    metadata.len(),
                    MAX_FILE_SIZE
                );
                error!("[FileRead] {message}");
                return ToolResult::err(message, "file_read", latency(start));
            }
            Ok(_) => {}
            Err(e) => {
                let message = format!("failed to stat file: {e}");
                error!("[FileRead] {message}");
                return ToolResult::err(message, "file_read", latency(start));
            }
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(content) => {
                    let file_size = content.len() as u64;
                    let latency_ms = latency(start);
                    info!("[FileRead] {} | {file_size} bytes | {latency_ms}ms", path.display());
                    ToolResult::ok(content, "file_read", latency_ms, json!({ "file_size": file_size, "path": path_arg }))
                }
                Err(_) => {
                    let message = format!("file is not valid UTF-8: {}", path.display());
                    error!("[FileRead] {message}");
                    ToolResult::err(message, "file_read", latency(start))
                }
            },
            Err(e) => {
                let message = format!("failed to read file: {e}");
                error!("[FileRead] {message}");
                ToolResult::err(message, "file_read", latency(start))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi there").unwrap();
        let tool = FileReadTool::new(dir.path().to_path_buf());
        let result = tool.execute(json!({ "path": "hello.txt" })).await;
        assert!(result.ok);
        assert_eq!(result.output.unwrap(), "hi there");
    }

    #[tokio::test]
    async fn missing_file_is_non_terminal_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileReadTool::new(dir.path().to_path_buf());
        let result = tool.execute(json!({ "path": "nope.txt" })).await;
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, vec![b'a'; (MAX_FILE_SIZE + 1) as usize]).unwrap();
        let tool = FileReadTool::new(dir.path().to_path_buf());
        let result = tool.execute(json!({ "path": "big.txt" })).await;
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("too large"));
    }
}
