// src/exec/spawn_args.rs

//! Decide how to start the message adapter.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::AdapterConfig;

/// Subcommand that puts the adapter into streaming mode.
pub const STREAM_COMMAND: &str = "stream";

/// Program and argument list used to spawn the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnArgs {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl fmt::Display for SpawnArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Resolve spawn arguments, probing `PATH` for the configured interpreter.
pub fn resolve(config: &AdapterConfig, command: &str) -> SpawnArgs {
    resolve_with(config, command, |name| {
        let _guard = crate::env::read_guard();
        which::which(name).ok()
    })
}

/// Resolve spawn arguments with a caller-supplied interpreter lookup.
///
/// - If an interpreter is found and binary mode is not forced:
///   `<interpreter> <adapter_dir> <command>`.
/// - Otherwise: `<adapter_dir>/cma_bin/cma <command>`.
///
/// Never fails; a missing executable surfaces when the process is spawned.
pub fn resolve_with<F>(config: &AdapterConfig, command: &str, lookup: F) -> SpawnArgs
where
    F: FnOnce(&str) -> Option<PathBuf>,
{
    let dir = &config.adapter.dir;

    let interpreter = if config.adapter.use_binary {
        None
    } else {
        lookup(&config.adapter.interpreter)
    };

    let spawn = match interpreter {
        Some(interpreter) => SpawnArgs {
            program: interpreter,
            args: vec![dir.as_os_str().to_os_string(), OsString::from(command)],
        },
        None => SpawnArgs {
            program: bundled_binary(dir),
            args: vec![OsString::from(command)],
        },
    };

    debug!(spawn = %spawn, "resolved message adapter spawn arguments");
    spawn
}

fn bundled_binary(dir: &Path) -> PathBuf {
    dir.join("cma_bin").join("cma")
}
