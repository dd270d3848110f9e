// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`spawn_args`] resolves how the message adapter is launched.
//! - [`supervisor`] owns the adapter child process: pipes, stderr capture,
//!   exit monitoring and termination.
//! - [`protocol`] frames commands and responses on the adapter's pipes.
//! - [`command_task`] runs a shell command as a business function.

pub mod command_task;
pub mod protocol;
pub mod spawn_args;
pub mod supervisor;

pub use command_task::CommandTask;
pub use protocol::{Command, FrameDecoder, FrameReader};
pub use spawn_args::SpawnArgs;
pub use supervisor::{AdapterProcess, ExitInfo, StderrBuffer};
