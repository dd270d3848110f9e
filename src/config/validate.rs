// src/config/validate.rs

use crate::config::model::{AdapterConfig, RawConfigFile};
use crate::errors::{AdapterError, Result};

impl TryFrom<RawConfigFile> for AdapterConfig {
    type Error = AdapterError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(AdapterConfig::new_unchecked(raw.adapter, raw.timeouts))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_adapter_section(cfg)?;
    validate_timeouts(cfg)?;
    Ok(())
}

fn validate_adapter_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.adapter.dir.as_os_str().is_empty() {
        return Err(AdapterError::Config(
            "[adapter].dir must not be empty".to_string(),
        ));
    }
    if cfg.adapter.interpreter.trim().is_empty() {
        return Err(AdapterError::Config(
            "[adapter].interpreter must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_timeouts(cfg: &RawConfigFile) -> Result<()> {
    let t = &cfg.timeouts;

    if t.teardown_poll_ms == 0 {
        return Err(AdapterError::Config(
            "[timeouts].teardown_poll_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if t.teardown_poll_ms > t.teardown_ms {
        return Err(AdapterError::Config(format!(
            "[timeouts].teardown_poll_ms ({}) must not exceed teardown_ms ({})",
            t.teardown_poll_ms, t.teardown_ms
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::TimeoutSection;

    #[test]
    fn defaults_are_valid() {
        let cfg = AdapterConfig::try_from(RawConfigFile::default()).unwrap();
        assert_eq!(cfg, AdapterConfig::default());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let raw = RawConfigFile {
            timeouts: TimeoutSection {
                teardown_poll_ms: 0,
                ..TimeoutSection::default()
            },
            ..RawConfigFile::default()
        };

        match AdapterConfig::try_from(raw) {
            Err(AdapterError::Config(msg)) => assert!(msg.contains("teardown_poll_ms")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn poll_interval_longer_than_teardown_is_rejected() {
        let raw = RawConfigFile {
            timeouts: TimeoutSection {
                teardown_ms: 50,
                teardown_poll_ms: 100,
                ..TimeoutSection::default()
            },
            ..RawConfigFile::default()
        };

        assert!(matches!(
            AdapterConfig::try_from(raw),
            Err(AdapterError::Config(_))
        ));
    }
}
