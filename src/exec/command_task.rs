// src/exec/command_task.rs

//! Business function backed by an external shell command.
//!
//! The task envelope (`input`, `config`, ...) is written to the command's
//! stdin as JSON and its stdout is parsed as the JSON response. On a non-zero
//! exit, a stdout object of the form `{"name": ..., "message": ...}` becomes
//! the task error; otherwise the error is a `CommandError` carrying stderr.

use std::process::Stdio;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::context::InvocationContext;
use crate::engine::handler::{HandlerFuture, TaskHandler};
use crate::errors::TaskError;
use crate::message::NestedEvent;

pub const COMMAND_ERROR_NAME: &str = "CommandError";

#[derive(Debug, Clone)]
pub struct CommandTask {
    cmd: String,
}

impl CommandTask {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    async fn run(&self, event: NestedEvent) -> Result<Value, TaskError> {
        info!(cmd = %self.cmd, "starting task command");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            TaskError::new(
                COMMAND_ERROR_NAME,
                format!("spawning task command '{}': {e}", self.cmd),
            )
        })?;

        let input = serde_json::to_vec(&event)
            .map_err(|e| TaskError::new(COMMAND_ERROR_NAME, format!("encoding task input: {e}")))?;
        let stdin = child.stdin.take();
        // Feed stdin while stdout and stderr are drained, so a command that
        // writes before it finishes reading cannot fill both pipes.
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // The command may legitimately ignore its input and exit early.
                if let Err(e) = stdin.write_all(&input).await {
                    debug!(error = %e, "task command did not read its input");
                }
            }
        };

        let ((), output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| {
            TaskError::new(
                COMMAND_ERROR_NAME,
                format!("waiting for task command '{}': {e}", self.cmd),
            )
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output.status.code().unwrap_or(-1);

        info!(
            cmd = %self.cmd,
            exit_code = code,
            success = output.status.success(),
            "task command exited"
        );

        if output.status.success() {
            return parse_response(&stdout);
        }

        warn!(exit_code = code, stderr = %stderr.trim_end(), "task command failed");
        Err(failure_from_output(&stdout, &stderr, code))
    }
}

impl TaskHandler for CommandTask {
    fn handle(&self, event: NestedEvent, _context: InvocationContext) -> HandlerFuture<'_> {
        Box::pin(self.run(event))
    }
}

/// Empty stdout means "no response" and maps to `null`.
fn parse_response(stdout: &str) -> Result<Value, TaskError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(trimmed).map_err(|e| {
        TaskError::new(
            COMMAND_ERROR_NAME,
            format!("task command wrote invalid JSON to stdout: {e}"),
        )
    })
}

fn failure_from_output(stdout: &str, stderr: &str, code: i32) -> TaskError {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(stdout.trim()) {
        if let Some(Value::String(name)) = map.get("name") {
            let message = match map.get("message") {
                Some(Value::String(m)) => m.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            return TaskError::new(name.clone(), message);
        }
    }

    let stderr = stderr.trim_end();
    let message = if stderr.is_empty() {
        format!("task command exited with code {code}")
    } else {
        stderr.to_string()
    };
    TaskError::new(COMMAND_ERROR_NAME, message)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(input: Value) -> NestedEvent {
        NestedEvent::passthrough(input)
    }

    #[tokio::test]
    async fn stdout_json_becomes_the_response() {
        let task = CommandTask::new(r#"echo '{"result": 42}'"#);
        let out = task
            .handle(envelope(json!({})), InvocationContext::new())
            .await
            .unwrap();
        assert_eq!(out, json!({ "result": 42 }));
    }

    #[tokio::test]
    async fn envelope_is_written_to_stdin() {
        let task = CommandTask::new("cat");
        let out = task
            .handle(envelope(json!({ "a": 1 })), InvocationContext::new())
            .await
            .unwrap();
        assert_eq!(out["input"], json!({ "a": 1 }));
        assert_eq!(out["config"], Value::Null);
    }

    #[tokio::test]
    async fn large_envelope_passes_through_cat() {
        let big = "x".repeat(1 << 20);
        let task = CommandTask::new("cat");
        let out = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            task.handle(envelope(json!({ "big": big })), InvocationContext::new()),
        )
        .await
        .expect("command task stalled on a large envelope")
        .unwrap();
        assert_eq!(out["input"]["big"].as_str().unwrap().len(), 1 << 20);
    }

    #[tokio::test]
    async fn command_ignoring_its_input_still_succeeds() {
        let big = "y".repeat(1 << 20);
        let task = CommandTask::new(r#"echo '"done"'"#);
        let out = task
            .handle(envelope(json!({ "big": big })), InvocationContext::new())
            .await
            .unwrap();
        assert_eq!(out, json!("done"));
    }

    #[tokio::test]
    async fn structured_failure_keeps_name_and_message() {
        let task = CommandTask::new(
            r#"echo '{"name": "SomeWorkflowError", "message": "Oh snap"}'; exit 1"#,
        );
        let err = task
            .handle(envelope(json!({})), InvocationContext::new())
            .await
            .unwrap_err();
        assert_eq!(err, TaskError::new("SomeWorkflowError", "Oh snap"));
        assert!(err.is_workflow_error());
    }

    #[tokio::test]
    async fn unstructured_failure_reports_stderr() {
        let task = CommandTask::new("echo 'disk on fire' >&2; exit 3");
        let err = task
            .handle(envelope(json!({})), InvocationContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.name, COMMAND_ERROR_NAME);
        assert_eq!(err.message, "disk on fire");
    }

    #[tokio::test]
    async fn invalid_stdout_is_a_command_error() {
        let task = CommandTask::new("echo not-json");
        let err = task
            .handle(envelope(json!({})), InvocationContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.name, COMMAND_ERROR_NAME);
        assert!(err.message.contains("invalid JSON"));
    }

    #[test]
    fn silent_failure_mentions_exit_code() {
        let err = failure_from_output("", "", 7);
        assert_eq!(err.message, "task command exited with code 7");
    }
}
