#![allow(dead_code)]

use std::path::Path;

use cma_bridge::config::{AdapterConfig, AdapterSection, RawConfigFile, TimeoutSection};

/// Builder for `AdapterConfig` to simplify test setup.
pub struct AdapterConfigBuilder {
    config: RawConfigFile,
}

impl AdapterConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                adapter: AdapterSection::default(),
                timeouts: TimeoutSection::default(),
            },
        }
    }

    /// Use the bundled binary under `dir`, as laid out by
    /// [`crate::stage_stub_adapter`].
    pub fn stub_adapter(mut self, dir: &Path) -> Self {
        self.config.adapter.dir = dir.to_path_buf();
        self.config.adapter.use_binary = true;
        self
    }

    pub fn dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.adapter.dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn use_binary(mut self, val: bool) -> Self {
        self.config.adapter.use_binary = val;
        self
    }

    pub fn disabled(mut self, val: bool) -> Self {
        self.config.adapter.disabled = val;
        self
    }

    pub fn interpreter(mut self, name: &str) -> Self {
        self.config.adapter.interpreter = name.to_string();
        self
    }

    pub fn teardown_ms(mut self, teardown_ms: u64, poll_ms: u64) -> Self {
        self.config.timeouts.teardown_ms = teardown_ms;
        self.config.timeouts.teardown_poll_ms = poll_ms;
        self
    }

    pub fn build(self) -> AdapterConfig {
        AdapterConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for AdapterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
