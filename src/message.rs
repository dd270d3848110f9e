// src/message.rs

//! Pipeline message shapes and field lookups.
//!
//! The adapter answers each command with an untyped JSON value. Each step of
//! the exchange expects one particular shape, so every response goes through
//! a decoder here that either returns the typed shape or a protocol error
//! describing what came back.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::{AdapterError, Result};

/// Maximum number of granule ids copied into the environment.
pub const GRANULE_LOG_LIMIT: usize = 500;

/// Key under which the adapter wraps a message it was configured to receive.
const CMA_WRAPPER_KEY: &str = "cma";

/// A full pipeline message: an object carrying a `payload` key (which may be
/// `null`) and none of the task envelope keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FullMessage(Map<String, Value>);

impl FullMessage {
    pub fn decode(command: &str, value: Value) -> Result<Self> {
        let map = match value {
            Value::Object(map) => map,
            other => return Err(invalid(command, &other)),
        };
        let is_full = map.contains_key("payload")
            && !map.contains_key("input")
            && !map.contains_key("config");
        if !is_full {
            return Err(invalid(command, &Value::Object(map)));
        }
        Ok(Self(map))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// The task-scoped envelope handed to the business function.
///
/// `input` and `config` are mandatory (either may be JSON `null`);
/// `message_config` defaults to `null` when the adapter omits it. Any other
/// key the adapter adds (e.g. `cumulus_config`) is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedEvent {
    pub input: Value,
    pub config: Value,
    #[serde(rename = "messageConfig")]
    pub message_config: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NestedEvent {
    pub fn decode(command: &str, value: Value) -> Result<Self> {
        let mut map = match value {
            Value::Object(map) if map.contains_key("input") && map.contains_key("config") => map,
            other => return Err(invalid(command, &other)),
        };
        let input = map.remove("input").unwrap_or(Value::Null);
        let config = map.remove("config").unwrap_or(Value::Null);
        let message_config = map.remove("messageConfig").unwrap_or(Value::Null);
        Ok(Self {
            input,
            config,
            message_config,
            extra: map,
        })
    }

    /// Envelope used when the adapter is bypassed: the raw message becomes the
    /// input and there is no task configuration.
    pub fn passthrough(message: Value) -> Self {
        Self {
            input: message,
            config: Value::Null,
            message_config: Value::Null,
            extra: Map::new(),
        }
    }
}

/// Decode the `createNextEvent` response.
///
/// Anything is accepted except a task envelope, which means the exchange has
/// fallen out of step with the adapter.
pub fn decode_next_event(command: &str, value: Value) -> Result<Value> {
    if is_task_envelope(&value) {
        return Err(invalid(command, &value));
    }
    Ok(value)
}

fn is_task_envelope(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.contains_key("input") && map.contains_key("config"),
        _ => false,
    }
}

fn invalid(command: &str, value: &Value) -> AdapterError {
    AdapterError::protocol(command, value.to_string())
}

/// Whether `message` is already in the adapter's own wrapper shape.
pub fn is_cma_wrapped(message: &Value) -> bool {
    message.get(CMA_WRAPPER_KEY).is_some()
}

/// Result returned in place of an error when the business function raised a
/// workflow error: the original message with `payload` nulled and the error
/// name recorded under `exception`.
pub fn failure_message(original: &Value, exception: &str) -> Value {
    let mut map = match original {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    map.insert("payload".to_string(), Value::Null);
    map.insert("exception".to_string(), Value::String(exception.to_string()));
    Value::Object(map)
}

/// JavaScript-style truthiness, used for "first location that has a value".
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Look `path` up directly, then under the wrapped event.
fn lookup<'a>(message: &'a Value, path: &str) -> Option<&'a Value> {
    [format!("/{path}"), format!("/cma/event/{path}")]
        .iter()
        .filter_map(|pointer| message.pointer(pointer))
        .find(|v| is_truthy(v))
}

fn lookup_string(message: &Value, path: &str) -> Option<String> {
    match lookup(message, path)? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn execution_name(message: &Value) -> Option<String> {
    lookup_string(message, "cumulus_meta/execution_name")
}

pub fn stack_name(message: &Value) -> Option<String> {
    lookup_string(message, "meta/stack")
}

pub fn parent_arn(message: &Value) -> Option<String> {
    lookup_string(message, "cumulus_meta/parentExecutionArn")
}

pub fn async_operation_id(message: &Value) -> Option<String> {
    lookup_string(message, "cumulus_meta/asyncOperationId")
}

/// Granule ids of the message, first `limit` only, in message order.
///
/// Sources in order of precedence: `payload.granules`, `meta.input_granules`,
/// then the same two under `cma.event`. A granule without a `granuleId`
/// contributes `null`.
pub fn message_granules(message: &Value, limit: usize) -> Vec<Value> {
    let sources = [
        "/payload/granules",
        "/meta/input_granules",
        "/cma/event/payload/granules",
        "/cma/event/meta/input_granules",
    ];
    let granules = sources
        .iter()
        .filter_map(|pointer| message.pointer(pointer))
        .find(|v| is_truthy(v));

    match granules {
        Some(Value::Array(items)) => items
            .iter()
            .take(limit)
            .map(|g| g.get("granuleId").cloned().unwrap_or(Value::Null))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_message_accepts_null_payload() {
        let msg = FullMessage::decode("loadAndUpdateRemoteEvent", json!({ "payload": null, "meta": {} }));
        assert!(msg.is_ok());
    }

    #[test]
    fn full_message_rejects_missing_payload_and_envelopes() {
        let err = FullMessage::decode("loadAndUpdateRemoteEvent", json!({ "meta": {} })).unwrap_err();
        assert!(matches!(err, AdapterError::Protocol { .. }));
        assert!(err.to_string().contains("loadAndUpdateRemoteEvent"));

        let err = FullMessage::decode(
            "loadAndUpdateRemoteEvent",
            json!({ "payload": {}, "input": 1, "config": {} }),
        );
        assert!(err.is_err());

        assert!(FullMessage::decode("loadAndUpdateRemoteEvent", json!([1, 2])).is_err());
    }

    #[test]
    fn nested_event_keeps_extra_keys_and_defaults_message_config() {
        let nested = NestedEvent::decode(
            "loadNestedEvent",
            json!({ "input": { "a": 1 }, "config": null, "cumulus_config": { "x": 1 } }),
        )
        .unwrap();

        assert_eq!(nested.input, json!({ "a": 1 }));
        assert_eq!(nested.config, Value::Null);
        assert_eq!(nested.message_config, Value::Null);
        assert_eq!(nested.extra.get("cumulus_config"), Some(&json!({ "x": 1 })));
    }

    #[test]
    fn nested_event_requires_input_and_config() {
        let err = NestedEvent::decode("loadNestedEvent", json!({ "input": 1 })).unwrap_err();
        assert!(matches!(err, AdapterError::Protocol { .. }));
    }

    #[test]
    fn next_event_rejects_envelope_shape() {
        assert!(decode_next_event("createNextEvent", json!({ "input": 1, "config": 2 })).is_err());
        assert_eq!(
            decode_next_event("createNextEvent", json!({ "payload": 42 })).unwrap(),
            json!({ "payload": 42 })
        );
    }

    #[test]
    fn failure_message_nulls_payload_and_records_exception() {
        let original = json!({ "payload": { "a": 1 }, "meta": { "stack": "s" } });
        assert_eq!(
            failure_message(&original, "SomeWorkflowError"),
            json!({ "payload": null, "meta": { "stack": "s" }, "exception": "SomeWorkflowError" })
        );
    }

    #[test]
    fn accessors_fall_back_to_wrapped_event() {
        let msg = json!({
            "cma": { "event": {
                "cumulus_meta": {
                    "execution_name": "exec-1",
                    "parentExecutionArn": "arn:parent",
                    "asyncOperationId": "async-id-123"
                },
                "meta": { "stack": "cumulus-stack" }
            }}
        });

        assert!(is_cma_wrapped(&msg));
        assert_eq!(execution_name(&msg).as_deref(), Some("exec-1"));
        assert_eq!(stack_name(&msg).as_deref(), Some("cumulus-stack"));
        assert_eq!(parent_arn(&msg).as_deref(), Some("arn:parent"));
        assert_eq!(async_operation_id(&msg).as_deref(), Some("async-id-123"));
    }

    #[test]
    fn empty_string_falls_through_to_wrapped_value() {
        let msg = json!({
            "meta": { "stack": "" },
            "cma": { "event": { "meta": { "stack": "inner" } } }
        });
        assert_eq!(stack_name(&msg).as_deref(), Some("inner"));
        assert_eq!(execution_name(&msg), None);
    }

    #[test]
    fn granules_come_from_payload_then_meta() {
        let msg = json!({
            "payload": { "granules": [{ "granuleId": "g-1" }, { "granuleId": "g-2" }] },
            "meta": { "input_granules": [{ "granuleId": "other" }] }
        });
        assert_eq!(message_granules(&msg, GRANULE_LOG_LIMIT), vec![json!("g-1"), json!("g-2")]);

        let msg = json!({ "payload": {}, "meta": { "input_granules": [{ "granuleId": "m-1" }, {}] } });
        assert_eq!(message_granules(&msg, GRANULE_LOG_LIMIT), vec![json!("m-1"), Value::Null]);

        assert!(message_granules(&json!({ "payload": null }), GRANULE_LOG_LIMIT).is_empty());
    }

    #[test]
    fn granules_are_truncated_to_limit() {
        let granules: Vec<Value> = (0..5).map(|i| json!({ "granuleId": format!("granule-{i}") })).collect();
        let msg = json!({ "payload": { "granules": granules } });
        assert_eq!(
            message_granules(&msg, 3),
            vec![json!("granule-0"), json!("granule-1"), json!("granule-2")]
        );
    }
}
