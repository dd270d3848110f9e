//! Message fixtures shared by the integration tests.

use std::path::PathBuf;

use serde_json::Value;

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures/messages")
}

/// Load `tests/fixtures/messages/<name>.json`.
pub fn message(name: &str) -> Value {
    let path = fixtures_dir().join(format!("{name}.json"));
    let raw = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("reading fixture {}: {e}", path.display()));
    serde_json::from_str(&raw)
        .unwrap_or_else(|e| panic!("parsing fixture {}: {e}", path.display()))
}

/// Attach stub adapter directives to a message.
pub fn with_directives(mut message: Value, directives: Value) -> Value {
    if let Value::Object(map) = &mut message {
        map.insert("stub_adapter".to_string(), directives);
    }
    message
}
