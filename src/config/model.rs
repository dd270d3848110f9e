// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default location of the message adapter, relative to the working directory.
pub const DEFAULT_ADAPTER_DIR: &str = "./cumulus-message-adapter";

/// Configuration as read from a TOML file.
///
/// ```toml
/// [adapter]
/// dir = "./cumulus-message-adapter"
/// use_binary = false
/// disabled = false
/// interpreter = "python"
///
/// [timeouts]
/// teardown_ms = 2000
/// teardown_poll_ms = 100
/// diagnostic_margin_ms = 500
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub adapter: AdapterSection,

    #[serde(default)]
    pub timeouts: TimeoutSection,
}

/// `[adapter]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdapterSection {
    /// Directory holding the message adapter (`__main__.py` and `cma_bin/cma`).
    #[serde(default = "default_adapter_dir")]
    pub dir: PathBuf,

    /// Always use the bundled `cma_bin/cma` binary, even if an interpreter is
    /// available on `PATH`.
    #[serde(default)]
    pub use_binary: bool,

    /// Skip the adapter entirely and call the business function directly.
    #[serde(default)]
    pub disabled: bool,

    /// Interpreter looked up on `PATH` to run the adapter directory.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
}

fn default_adapter_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ADAPTER_DIR)
}

fn default_interpreter() -> String {
    "python".to_string()
}

impl Default for AdapterSection {
    fn default() -> Self {
        Self {
            dir: default_adapter_dir(),
            use_binary: false,
            disabled: false,
            interpreter: default_interpreter(),
        }
    }
}

/// `[timeouts]` section. All values are milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutSection {
    /// Upper bound on waiting for the adapter to close after a failure.
    #[serde(default = "default_teardown_ms")]
    pub teardown_ms: u64,

    /// Polling increment while waiting for the adapter to close.
    #[serde(default = "default_teardown_poll_ms")]
    pub teardown_poll_ms: u64,

    /// How long before the invocation deadline the stderr dump fires.
    #[serde(default = "default_diagnostic_margin_ms")]
    pub diagnostic_margin_ms: u64,
}

fn default_teardown_ms() -> u64 {
    2000
}

fn default_teardown_poll_ms() -> u64 {
    100
}

fn default_diagnostic_margin_ms() -> u64 {
    500
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            teardown_ms: default_teardown_ms(),
            teardown_poll_ms: default_teardown_poll_ms(),
            diagnostic_margin_ms: default_diagnostic_margin_ms(),
        }
    }
}

impl TimeoutSection {
    pub fn teardown(&self) -> Duration {
        Duration::from_millis(self.teardown_ms)
    }

    pub fn teardown_poll(&self) -> Duration {
        Duration::from_millis(self.teardown_poll_ms)
    }

    pub fn diagnostic_margin(&self) -> Duration {
        Duration::from_millis(self.diagnostic_margin_ms)
    }
}

/// Validated configuration used by the rest of the crate.
///
/// Construct it through [`AdapterConfig::try_from`] (validation lives in
/// [`super::validate`]), [`AdapterConfig::from_env`], or `Default`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct AdapterConfig {
    pub adapter: AdapterSection,
    pub timeouts: TimeoutSection,
}

impl AdapterConfig {
    pub(crate) fn new_unchecked(adapter: AdapterSection, timeouts: TimeoutSection) -> Self {
        Self { adapter, timeouts }
    }

    /// Defaults with the environment overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides(crate::env::var);
        cfg
    }

    /// Apply the three environment switches understood by the adapter client.
    ///
    /// `lookup` stands in for `std::env::var` so callers can supply their own
    /// source. Boolean switches only turn on for the exact string `"true"`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_ADAPTER_DIR).filter(|d| !d.is_empty()) {
            self.adapter.dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup(ENV_USE_BINARY) {
            self.adapter.use_binary = flag == "true";
        }
        if let Some(flag) = lookup(ENV_DISABLED) {
            self.adapter.disabled = flag == "true";
        }
    }
}

pub const ENV_ADAPTER_DIR: &str = "CUMULUS_MESSAGE_ADAPTER_DIR";
pub const ENV_USE_BINARY: &str = "USE_CMA_BINARY";
pub const ENV_DISABLED: &str = "CUMULUS_MESSAGE_ADAPTER_DISABLED";
