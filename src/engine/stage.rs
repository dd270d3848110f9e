// src/engine/stage.rs

//! Pure state machine for one task invocation.
//!
//! ```text
//! Idle -> AwaitingRemoteEvent -> AwaitingNestedEvent -> RunningTask
//!      -> AwaitingNextEvent -> Done
//! ```
//!
//! `ErrorExit` absorbs a failure from any non-terminal stage. The machine
//! holds no IO; the runner advances it and uses it to know which command is
//! due next.

use std::fmt;

use tracing::debug;

use crate::exec::protocol::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    AwaitingRemoteEvent,
    AwaitingNestedEvent,
    RunningTask,
    AwaitingNextEvent,
    Done,
    ErrorExit,
}

impl Stage {
    /// Successor on the happy path; `None` for terminal stages.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Idle => Some(Stage::AwaitingRemoteEvent),
            Stage::AwaitingRemoteEvent => Some(Stage::AwaitingNestedEvent),
            Stage::AwaitingNestedEvent => Some(Stage::RunningTask),
            Stage::RunningTask => Some(Stage::AwaitingNextEvent),
            Stage::AwaitingNextEvent => Some(Stage::Done),
            Stage::Done | Stage::ErrorExit => None,
        }
    }

    /// Command whose response is awaited in this stage.
    pub fn command(self) -> Option<Command> {
        match self {
            Stage::AwaitingRemoteEvent => Some(Command::LoadAndUpdateRemoteEvent),
            Stage::AwaitingNestedEvent => Some(Command::LoadNestedEvent),
            Stage::AwaitingNextEvent => Some(Command::CreateNextEvent),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::ErrorExit)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks the current stage of one invocation.
#[derive(Debug, Clone)]
pub struct StageTracker {
    stage: Stage,
    history: Vec<Stage>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            stage: Stage::Idle,
            history: vec![Stage::Idle],
        }
    }

    pub fn current(&self) -> Stage {
        self.stage
    }

    /// Every stage visited so far, in order.
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    /// Move along the happy path. Terminal stages stay where they are.
    pub fn advance(&mut self) -> Stage {
        if let Some(next) = self.stage.next() {
            self.enter(next);
        }
        self.stage
    }

    /// Enter `ErrorExit` unless already terminal.
    pub fn fail(&mut self) -> Stage {
        if !self.stage.is_terminal() {
            self.enter(Stage::ErrorExit);
        }
        self.stage
    }

    fn enter(&mut self, next: Stage) {
        debug!(from = %self.stage, to = %next, "task stage transition");
        self.stage = next;
        self.history.push(next);
    }
}
