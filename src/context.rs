// src/context.rs

//! Invocation context handed to the adapter and to the business function.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Context of one task invocation (the equivalent of a Lambda context).
///
/// Known fields are typed; anything else the caller supplies is kept in
/// `extra` and serialized alongside them, so the adapter sees the same JSON
/// object the caller provided.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_version: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// Point in time after which the invocation is killed by its host.
    #[serde(skip)]
    pub deadline: Option<Instant>,
}

impl InvocationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self.function_version = Some(version.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Time left before `deadline`, if one was set.
    pub fn remaining_time(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extra_fields_round_trip_through_json() {
        let ctx: InvocationContext =
            serde_json::from_value(json!({ "functionName": "sync", "b": 2 })).unwrap();

        assert_eq!(ctx.function_name.as_deref(), Some("sync"));
        assert_eq!(ctx.extra.get("b"), Some(&json!(2)));
        assert_eq!(
            serde_json::to_value(&ctx).unwrap(),
            json!({ "functionName": "sync", "b": 2 })
        );
    }

    #[test]
    fn remaining_time_is_none_without_deadline() {
        assert!(InvocationContext::new().remaining_time().is_none());

        let ctx = InvocationContext::new().with_deadline(Instant::now() + Duration::from_secs(60));
        let left = ctx.remaining_time().unwrap();
        assert!(left > Duration::from_secs(50));
    }
}
