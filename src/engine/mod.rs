// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the [`TaskHandler`] seam for business functions
//! - the pure [`Stage`] machine of one invocation
//! - [`AdapterSession`], which serialises commands to one adapter process
//! - [`TaskRunner`], which drives the whole exchange, tears the adapter down
//!   on failure and recovers workflow errors
//!
//! The pure state machine lives in [`stage`]; the async/IO shell is
//! implemented in [`session`] and [`runner`].

pub mod handler;
pub mod runner;
pub mod session;
pub mod stage;

pub use handler::{handler_fn, FnHandler, HandlerFuture, TaskHandler};
pub use runner::{DiagnosticTimer, TaskRunner};
pub use session::AdapterSession;
pub use stage::{Stage, StageTracker};
