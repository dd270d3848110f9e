// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! Every failure a caller can observe from a task invocation is one variant of
//! [`AdapterError`]. The variants mirror how the failure is handled:
//!
//! - `Spawn` / `StreamClosed`: the message adapter process could not be started
//!   or went away mid-exchange. Both are reported under the
//!   `CumulusMessageAdapterExecutionError` classification.
//! - `Protocol`: a response did not have the shape expected for its step.
//! - `Workflow`: the business function short-circuited on purpose; this is the
//!   only variant the runner may turn into a failure-shaped message.
//! - `Task`: any other business function failure.

use std::io;

use thiserror::Error;

/// Classification name reported for spawn failures and premature stream close.
pub const EXECUTION_ERROR_NAME: &str = "CumulusMessageAdapterExecutionError";

/// Substring that marks a business error as an intentional workflow outcome.
pub const WORKFLOW_ERROR_MARKER: &str = "WorkflowError";

/// Error returned by a business function.
///
/// `name` plays the role of the error's class; it decides whether the failure
/// is recovered as a workflow outcome or propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{name}: {message}")]
pub struct TaskError {
    pub name: String,
    pub message: String,
}

impl TaskError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Plain error with the generic `Error` name.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    pub fn is_workflow_error(&self) -> bool {
        self.name.contains(WORKFLOW_ERROR_MARKER)
    }
}

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("message adapter process failed to start ({program}): {source}\nSTDERR: {stderr}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
        stderr: String,
    },

    /// The adapter's stdout closed before a terminator line arrived.
    ///
    /// The payload is the adapter's captured stderr, verbatim.
    #[error("{0}")]
    StreamClosed(String),

    #[error("Invalid output received from {command}: {detail}")]
    Protocol { command: String, detail: String },

    #[error("{0}")]
    Workflow(TaskError),

    #[error("{0}")]
    Task(TaskError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AdapterError {
    pub fn protocol(command: impl Into<String>, detail: impl Into<String>) -> Self {
        AdapterError::Protocol {
            command: command.into(),
            detail: detail.into(),
        }
    }

    /// The name a caller sees for this failure.
    pub fn classification_name(&self) -> &str {
        match self {
            AdapterError::Spawn { .. } | AdapterError::StreamClosed(_) => EXECUTION_ERROR_NAME,
            AdapterError::Workflow(err) | AdapterError::Task(err) => &err.name,
            _ => "Error",
        }
    }

    pub fn is_execution_error(&self) -> bool {
        self.classification_name() == EXECUTION_ERROR_NAME
    }
}

impl From<TaskError> for AdapterError {
    fn from(err: TaskError) -> Self {
        if err.is_workflow_error() {
            AdapterError::Workflow(err)
        } else {
            AdapterError::Task(err)
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AdapterError>;
