// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{AdapterConfig, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks timing and path sanity.
///
/// Environment overrides are **not** applied here; call
/// [`AdapterConfig::apply_env_overrides`] afterwards if they should win.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<AdapterConfig> {
    let raw_config = load_from_path(&path)?;
    let config = AdapterConfig::try_from(raw_config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to defaults; then apply the
/// process environment overrides.
pub fn load_with_env(path: Option<&Path>) -> Result<AdapterConfig> {
    let mut config = match path {
        Some(p) if p.exists() => load_and_validate(p)?,
        _ => AdapterConfig::default(),
    };
    config.apply_env_overrides(crate::env::var);
    Ok(config)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("cma-bridge.toml")
}
