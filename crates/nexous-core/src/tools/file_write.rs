//! `file_write`: writes or appends UTF-8 text to a file relative to the
//! run's base directory, creating parent directories as needed.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use log::{error, info};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use super::{Tool, ToolResult};

pub struct FileWriteTool {
    base_dir: PathBuf,
}

impl FileWriteTool {
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
impl Tool for FileWriteTool {
    fn name(&self) -> &'static str {
        "file_write"
    }

    async fn execute(&self, arguments: Value) -> ToolResult {
        let start = Instant::now();
        let latency = |start: Instant| start.elapsed().as_millis() as u64;

        let Some(path_arg) = arguments.get("path").and_then(Value::as_str) else {
            return ToolResult::err("missing required argument 'path'", "file_write", 0);
        };
        let content = arguments.get("content").and_then(Value::as_str).unwrap_or("");
        let append = arguments.get("append").and_then(Value::as_bool).unwrap_or(false);

        let path = self.resolve_path(path_arg);

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                let message = format!("failed to create parent directory: {e}");
                error!("[FileWrite] {message}");
                return ToolResult::err(message, "file_write", latency(start));
            }
        }

        let open_result = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .await;

        let mut file = match open_result {
            Ok(file) => file,
            Err(e) => {
                let message = format!("failed to open file for writing: {e}");
                error!("[FileWrite] {message}");
                return ToolResult::err(message, "file_write", latency(start));
            }
        };

        if let Err(e) = file.write_all(content.as_bytes()).await {
            let message = format!("failed to write file: {e}");
            error!("[FileWrite] {message}");
            return ToolResult::err(message, "file_write", latency(start));
        }

        let bytes_written = content.len() as u64;
        let latency_ms = latency(start);
        info!(
            "[FileWrite] {} | {bytes_written} bytes | append={append} | {latency_ms}ms",
            path.display()
        );
        ToolResult::ok(
            format!("wrote {bytes_written} bytes to {path_arg}"),
            "file_write",
            latency_ms,
            json!({ "bytes_written": bytes_written, "path": path_arg, "append": append }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_new_file_with_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriteTool::new(dir.path().to_path_buf());
        let result = tool.execute(json!({ "path": "out/report.txt", "content": "done" })).await;
        assert!(result.ok);
        let written = std::fs::read_to_string(dir.path().join("out/report.txt")).unwrap();
        assert_eq!(written, "done");
    }

    #[tokio::test]
    async fn append_mode_does_not_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriteTool::new(dir.path().to_path_buf());
        tool.execute(json!({ "path": "log.txt", "content": "one\n" })).await;
        tool.execute(json!({ "path": "log.txt", "content": "two\n", "append": true })).await;
        let written = std::fs::read_to_string(dir.path().join("log.txt")).unwrap();
        assert_eq!(written, "one\ntwo\n");
    }
}
