// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `cma-bridge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cma-bridge",
    version,
    about = "Run one pipeline task behind the Cumulus Message Adapter.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `cma-bridge.toml` in the current working directory. A missing
    /// file means built-in defaults plus environment overrides.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Pipeline message to process, as a JSON file. `-` reads stdin.
    #[arg(long, value_name = "PATH", default_value = "-")]
    pub event: String,

    /// Invocation context as a JSON file.
    #[arg(long, value_name = "PATH")]
    pub context: Option<PathBuf>,

    /// Schema locations forwarded to the adapter, as inline JSON.
    #[arg(long, value_name = "JSON")]
    pub schemas: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CMA_BRIDGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve config and adapter launch arguments, print them, but don't
    /// run anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Shell command acting as the business function.
    #[arg(last = true, value_name = "COMMAND", required_unless_present = "dry_run")]
    pub command: Vec<String>,
}

impl CliArgs {
    /// The `--config` path, or the default location when none was given.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_command_is_collected() {
        let args = CliArgs::try_parse_from([
            "cma-bridge",
            "--event",
            "msg.json",
            "--",
            "python3",
            "task.py",
        ])
        .unwrap();
        assert_eq!(args.event, "msg.json");
        assert_eq!(args.command_line(), "python3 task.py");
        assert!(!args.dry_run);
    }

    #[test]
    fn dry_run_needs_no_command() {
        let args = CliArgs::try_parse_from(["cma-bridge", "--dry-run"]).unwrap();
        assert!(args.dry_run);
        assert!(args.command.is_empty());
    }

    #[test]
    fn config_path_falls_back_to_default_location() {
        let args = CliArgs::try_parse_from(["cma-bridge", "--dry-run"]).unwrap();
        assert_eq!(args.config_path(), default_config_path());

        let args =
            CliArgs::try_parse_from(["cma-bridge", "--config", "/etc/cma.toml", "--dry-run"]).unwrap();
        assert_eq!(args.config_path(), PathBuf::from("/etc/cma.toml"));
    }

    #[test]
    fn command_is_required_otherwise() {
        assert!(CliArgs::try_parse_from(["cma-bridge"]).is_err());
    }
}
