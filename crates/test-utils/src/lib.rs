pub mod builders;
pub mod fixtures;

use std::path::Path;
use std::sync::Once;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 10-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Lay out an adapter directory around `executable`: `<tmp>/cma_bin/cma`.
///
/// Pair with `use_binary = true` so the bundled-binary path is taken.
pub fn stage_stub_adapter(executable: &Path) -> Result<TempDir> {
    let dir = tempfile::tempdir().context("creating adapter dir")?;
    let bin_dir = dir.path().join("cma_bin");
    std::fs::create_dir_all(&bin_dir).context("creating cma_bin")?;
    std::fs::copy(executable, bin_dir.join("cma"))
        .with_context(|| format!("copying {} into adapter dir", executable.display()))?;
    Ok(dir)
}
