// src/env.rs

//! Environment projection for downstream logging.
//!
//! Selected message and context fields are copied into named variables so
//! that loggers running in the same process can tag their output. The values
//! are computed into a [`CumulusEnvironment`] record first and then written
//! through an [`EnvSink`]; production uses [`ProcessEnv`], tests can use
//! [`RecordingEnv`] and inspect what would have been set.
//!
//! Writes through [`ProcessEnv`] and the crate's own environment reads share
//! one process-wide lock, so a projection is always observed whole.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use serde_json::Value;
use tracing::debug;

use crate::context::InvocationContext;
use crate::message::{self, GRANULE_LOG_LIMIT};

pub const EXECUTIONS: &str = "EXECUTIONS";
pub const SENDER: &str = "SENDER";
pub const TASKVERSION: &str = "TASKVERSION";
pub const STACKNAME: &str = "STACKNAME";
pub const GRANULES: &str = "GRANULES";
pub const PARENTARN: &str = "PARENTARN";
pub const ASYNCOPERATIONID: &str = "ASYNCOPERATIONID";

static ENV_LOCK: RwLock<()> = RwLock::new(());

/// Shared guard held while the crate reads the process environment.
pub(crate) fn read_guard() -> RwLockReadGuard<'static, ()> {
    ENV_LOCK.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `std::env::var` under [`read_guard`].
pub(crate) fn var(key: &str) -> Option<String> {
    let _guard = read_guard();
    std::env::var(key).ok()
}

/// Destination for projected variables.
pub trait EnvSink: Send + Sync {
    fn set_var(&self, key: &str, value: &str);

    /// Write a batch of variables. Sinks that can be observed concurrently
    /// override this to make the batch appear at once.
    fn set_vars(&self, vars: &[(&str, &str)]) {
        for (key, value) in vars {
            self.set_var(key, value);
        }
    }
}

/// Writes into the real process environment.
///
/// Mutating the environment is only sound while no other thread reads it
/// outside Rust's `std::env`. Code in this crate takes the same lock as these
/// writes; callers must not run foreign code that calls `getenv` concurrently
/// with a projection, or must use another [`EnvSink`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl ProcessEnv {
    fn write(pairs: &[(&str, &str)]) {
        let _guard = ENV_LOCK.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        for (key, value) in pairs {
            // SAFETY: `std::env` serializes this write against `std::env`
            // reads and child spawning, and every environment read in this
            // crate holds `ENV_LOCK`, which is held exclusively here. Foreign
            // `getenv` callers are excluded by the documented precondition on
            // `ProcessEnv` and `run_cumulus_task`.
            unsafe { std::env::set_var(key, value) }
        }
    }
}

impl EnvSink for ProcessEnv {
    fn set_var(&self, key: &str, value: &str) {
        Self::write(&[(key, value)]);
    }

    fn set_vars(&self, vars: &[(&str, &str)]) {
        Self::write(vars);
    }
}

/// In-memory sink; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct RecordingEnv {
    vars: Arc<Mutex<BTreeMap<String, String>>>,
}

impl RecordingEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.vars
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.vars
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl EnvSink for RecordingEnv {
    fn set_var(&self, key: &str, value: &str) {
        self.vars
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), value.to_string());
    }
}

/// Values projected from one message and context.
///
/// `None` means "not present in the source"; such fields are skipped when
/// applied so earlier values stay in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CumulusEnvironment {
    pub executions: Option<String>,
    pub sender: Option<String>,
    pub task_version: Option<String>,
    pub stack_name: Option<String>,
    /// JSON array of granule ids, capped at [`GRANULE_LOG_LIMIT`].
    pub granules: Option<String>,
    pub parent_arn: Option<String>,
    pub async_operation_id: Option<String>,
}

impl CumulusEnvironment {
    pub fn from_message(message: &Value, context: &InvocationContext) -> Self {
        let granules = message::message_granules(message, GRANULE_LOG_LIMIT);
        Self {
            executions: message::execution_name(message),
            sender: context.function_name.clone(),
            task_version: context.function_version.clone(),
            stack_name: message::stack_name(message),
            granules: serde_json::to_string(&granules).ok(),
            parent_arn: message::parent_arn(message),
            async_operation_id: message::async_operation_id(message),
        }
    }

    pub fn vars(&self) -> [(&'static str, Option<&str>); 7] {
        [
            (EXECUTIONS, self.executions.as_deref()),
            (SENDER, self.sender.as_deref()),
            (TASKVERSION, self.task_version.as_deref()),
            (STACKNAME, self.stack_name.as_deref()),
            (GRANULES, self.granules.as_deref()),
            (PARENTARN, self.parent_arn.as_deref()),
            (ASYNCOPERATIONID, self.async_operation_id.as_deref()),
        ]
    }

    /// Write every present field to `sink`.
    pub fn apply(&self, sink: &dyn EnvSink) {
        let present: Vec<(&str, &str)> = self
            .vars()
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect();
        sink.set_vars(&present);
        debug!(
            executions = ?self.executions,
            stack = ?self.stack_name,
            "projected message fields into environment"
        );
    }
}

/// Compute and apply the projection for `message`.
pub fn project(message: &Value, context: &InvocationContext, sink: &dyn EnvSink) -> CumulusEnvironment {
    let env = CumulusEnvironment::from_message(message, context);
    env.apply(sink);
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projects_fields_and_context() {
        let sink = RecordingEnv::new();
        let message = json!({
            "cumulus_meta": {
                "execution_name": "execution_value",
                "parentExecutionArn": "arn:parent",
                "asyncOperationId": "async-id-123"
            },
            "meta": { "stack": "cumulus-stack" },
            "payload": { "granules": [{ "granuleId": "g-1" }] }
        });
        let ctx = InvocationContext::new().with_function("sync-granule", "7");

        project(&message, &ctx, &sink);

        assert_eq!(sink.get(EXECUTIONS).as_deref(), Some("execution_value"));
        assert_eq!(sink.get(SENDER).as_deref(), Some("sync-granule"));
        assert_eq!(sink.get(TASKVERSION).as_deref(), Some("7"));
        assert_eq!(sink.get(STACKNAME).as_deref(), Some("cumulus-stack"));
        assert_eq!(sink.get(GRANULES).as_deref(), Some(r#"["g-1"]"#));
        assert_eq!(sink.get(PARENTARN).as_deref(), Some("arn:parent"));
        assert_eq!(sink.get(ASYNCOPERATIONID).as_deref(), Some("async-id-123"));
    }

    #[test]
    fn absent_fields_do_not_clear_previous_values() {
        let sink = RecordingEnv::new();
        let ctx = InvocationContext::new();

        project(&json!({ "meta": { "stack": "first" } }), &ctx, &sink);
        project(&json!({ "payload": null }), &ctx, &sink);

        assert_eq!(sink.get(STACKNAME).as_deref(), Some("first"));
        // Granules are always projected, possibly as an empty list.
        assert_eq!(sink.get(GRANULES).as_deref(), Some("[]"));
        assert_eq!(sink.get(SENDER), None);
    }

    #[test]
    fn second_projection_refines_the_first() {
        let sink = RecordingEnv::new();
        let ctx = InvocationContext::new();

        project(&json!({ "cumulus_meta": { "execution_name": "guess" } }), &ctx, &sink);
        project(&json!({ "cumulus_meta": { "execution_name": "resolved" }, "payload": {} }), &ctx, &sink);

        assert_eq!(sink.get(EXECUTIONS).as_deref(), Some("resolved"));
    }

    #[test]
    fn concurrent_process_projections_land_whole() {
        let workers: Vec<_> = (0..8)
            .map(|i| {
                std::thread::spawn(move || {
                    let record = CumulusEnvironment {
                        executions: Some(format!("exec-{i}")),
                        stack_name: Some(format!("stack-{i}")),
                        ..CumulusEnvironment::default()
                    };
                    for _ in 0..50 {
                        record.apply(&ProcessEnv);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let executions = var(EXECUTIONS).unwrap();
        let stack = var(STACKNAME).unwrap();
        assert_eq!(
            executions.trim_start_matches("exec-"),
            stack.trim_start_matches("stack-")
        );
    }
}
