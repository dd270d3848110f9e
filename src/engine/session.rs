// src/engine/session.rs

//! One adapter process plus the bookkeeping needed to talk to it.

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::TimeoutSection;
use crate::errors::{AdapterError, Result};
use crate::exec::protocol::{self, Command};
use crate::exec::supervisor::{AdapterProcess, StderrBuffer, STDERR_DRAIN_GRACE};

pub struct AdapterSession {
    process: AdapterProcess,
    timeouts: TimeoutSection,
    in_flight: Option<Command>,
}

impl AdapterSession {
    pub fn new(process: AdapterProcess, timeouts: TimeoutSection) -> Self {
        Self {
            process,
            timeouts,
            in_flight: None,
        }
    }

    pub fn process(&self) -> &AdapterProcess {
        &self.process
    }

    pub fn stderr(&self) -> &StderrBuffer {
        self.process.stderr()
    }

    /// Send `command` and wait for its response.
    ///
    /// Exactly one command may be outstanding; the next frame is only written
    /// after this response has been fully read and parsed.
    pub async fn exchange(&mut self, command: Command, payload: &Value) -> Result<Value> {
        if let Some(pending) = self.in_flight {
            return Err(AdapterError::protocol(
                command.as_str(),
                format!("cannot send while the {pending} response is outstanding"),
            ));
        }

        debug!(%command, "sending command to message adapter");
        match protocol::send_command(self.process.stdin()?, command, payload).await {
            Ok(()) => {}
            // A dead adapter shows up as a broken pipe here; its stdout will
            // be closed too, and the read below reports its stderr.
            Err(AdapterError::Io(err)) => {
                debug!(%command, error = %err, "writing command frame failed");
            }
            Err(other) => return Err(other),
        }
        self.in_flight = Some(command);

        let frame = self.process.frames().next_frame(command).await;
        if !matches!(frame, Err(AdapterError::Io(_))) {
            self.in_flight = None;
        }

        match frame? {
            Some(value) => {
                debug!(%command, "received message adapter response");
                Ok(value)
            }
            None => {
                let stderr = self.process.stderr().settled(STDERR_DRAIN_GRACE).await;
                Err(AdapterError::StreamClosed(stderr))
            }
        }
    }

    /// Normal end of an invocation: tell the adapter to exit and let it go.
    pub async fn finish(&mut self) {
        if let Err(err) = self.write_exit(true).await {
            debug!(error = %err, "could not send exit signal to message adapter");
        }
        self.process.close_stdin();
    }

    /// Failure path: exit signal, SIGTERM (escalating to a kill), then a
    /// bounded wait for the process to close. Problems are logged, never
    /// returned, so they cannot mask the original failure.
    pub async fn teardown(&mut self) {
        let leading_newline = self.in_flight.is_none();
        if let Err(err) = self.write_exit(leading_newline).await {
            debug!(error = %err, "could not send exit signal during teardown");
        }

        if let Err(err) = self.process.terminate().await {
            warn!(error = %err, "failed to terminate message adapter");
        }

        let closed = self
            .process
            .wait_closed(self.timeouts.teardown(), self.timeouts.teardown_poll())
            .await;
        if closed {
            debug!(exit = ?self.process.exit_info(), "message adapter closed after teardown");
        } else {
            warn!(
                pid = self.process.pid(),
                waited_ms = self.timeouts.teardown_ms,
                "message adapter still running after teardown wait"
            );
        }
    }

    async fn write_exit(&mut self, leading_newline: bool) -> Result<()> {
        protocol::send_exit(self.process.stdin()?, leading_newline).await
    }
}
