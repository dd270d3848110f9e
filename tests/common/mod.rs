#![allow(dead_code)]

use std::path::Path;

use cma_bridge::config::AdapterConfig;
use cma_bridge_test_utils::builders::AdapterConfigBuilder;
use tempfile::TempDir;

pub use cma_bridge_test_utils::{fixtures, init_tracing, with_timeout};

/// Stage the stub adapter binary in a fresh adapter directory.
///
/// Keep the returned `TempDir` alive for as long as the config is used.
pub fn stub_adapter() -> (TempDir, AdapterConfig) {
    let exe = Path::new(env!("CARGO_BIN_EXE_stub-adapter"));
    let dir = cma_bridge_test_utils::stage_stub_adapter(exe).expect("staging stub adapter");
    let config = AdapterConfigBuilder::new()
        .stub_adapter(dir.path())
        .teardown_ms(2000, 20)
        .build();
    (dir, config)
}
