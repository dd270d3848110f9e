// src/config/mod.rs

//! Configuration: TOML model, loading, validation and environment overrides.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_with_env};
pub use model::{
    AdapterConfig, AdapterSection, RawConfigFile, TimeoutSection, DEFAULT_ADAPTER_DIR,
    ENV_ADAPTER_DIR, ENV_DISABLED, ENV_USE_BINARY,
};
