// src/exec/supervisor.rs

//! Message adapter process supervision.
//!
//! [`AdapterProcess::spawn`] starts exactly one adapter process with all three
//! standard streams piped and returns a handle that owns them:
//!
//! - stdin is written by the caller (one command frame at a time);
//! - stdout is exposed as a [`FrameReader`];
//! - stderr is drained in the background into a [`StderrBuffer`] that only
//!   ever grows, so diagnostics survive until the handle is dropped.
//!
//! A monitor task owns the `Child`. It records the exit code and signal once
//! the process closes, logs the captured stderr on a non-zero exit, and
//! delivers terminate and kill requests while the child is still unreaped.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use super::protocol::FrameReader;
use super::spawn_args::SpawnArgs;
use crate::errors::{AdapterError, Result};

/// How long to wait for stderr to reach EOF before reading it for a report.
pub const STDERR_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Exit code and terminating signal of the adapter process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Append-only capture of the adapter's stderr.
///
/// Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct StderrBuffer {
    text: Arc<Mutex<String>>,
    drained: watch::Receiver<bool>,
}

impl StderrBuffer {
    pub(crate) fn new() -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let buffer = Self {
            text: Arc::new(Mutex::new(String::new())),
            drained: rx,
        };
        (buffer, tx)
    }

    fn append(&self, chunk: &str) {
        self.text
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_str(chunk);
    }

    /// Everything captured so far.
    pub fn snapshot(&self) -> String {
        self.text
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Wait (bounded) until stderr hit EOF, then return the full capture.
    pub async fn settled(&self, grace: Duration) -> String {
        let mut drained = self.drained.clone();
        if timeout(grace, drained.wait_for(|done| *done)).await.is_err() {
            debug!("stderr still open after grace period; reporting partial capture");
        }
        self.snapshot()
    }
}

/// Stop requests handed to the monitor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopSignal {
    Terminate,
    Kill,
}

/// Handle to one running message adapter process.
pub struct AdapterProcess {
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    frames: FrameReader<BufReader<ChildStdout>>,
    stderr: StderrBuffer,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
    stop_tx: mpsc::Sender<StopSignal>,
    _monitor: JoinHandle<()>,
}

impl AdapterProcess {
    /// Start the adapter described by `spawn`.
    pub fn spawn(spawn: &SpawnArgs) -> Result<Self> {
        let program = spawn.program.display().to_string();

        let mut cmd = Command::new(&spawn.program);
        cmd.args(&spawn.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| AdapterError::Spawn {
            program: program.clone(),
            source,
            stderr: String::new(),
        })?;

        let pid = child.id();
        info!(pid, program = %program, "message adapter started");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe(&program, "stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe(&program, "stderr"))?;

        let (buffer, drained_tx) = StderrBuffer::new();
        spawn_stderr_reader(stderr, buffer.clone(), drained_tx);

        let (exit_tx, exit_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = mpsc::channel(4);
        let monitor = tokio::spawn(monitor_process(child, pid, stop_rx, exit_tx, buffer.clone()));

        Ok(Self {
            pid,
            stdin,
            frames: FrameReader::new(BufReader::new(stdout)),
            stderr: buffer,
            exit_rx,
            stop_tx,
            _monitor: monitor,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn stdin(&mut self) -> Result<&mut ChildStdin> {
        self.stdin.as_mut().ok_or_else(|| {
            AdapterError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "message adapter stdin already closed",
            ))
        })
    }

    pub fn frames(&mut self) -> &mut FrameReader<BufReader<ChildStdout>> {
        &mut self.frames
    }

    pub fn stderr(&self) -> &StderrBuffer {
        &self.stderr
    }

    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit_rx.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.exit_info().is_some()
    }

    /// Drop our end of stdin, signalling EOF to the adapter.
    pub fn close_stdin(&mut self) {
        self.stdin = None;
    }

    /// Ask the process to stop: SIGTERM first, forced kill if that cannot be
    /// delivered. A no-op once the process has closed.
    pub async fn terminate(&self) -> Result<()> {
        self.request_stop(StopSignal::Terminate).await
    }

    /// Forcibly kill the process.
    pub async fn kill(&self) -> Result<()> {
        self.request_stop(StopSignal::Kill).await
    }

    async fn request_stop(&self, signal: StopSignal) -> Result<()> {
        if self.is_closed() {
            debug!(pid = self.pid, ?signal, "adapter already closed; nothing to stop");
            return Ok(());
        }
        // The monitor may have observed the exit in the meantime; a closed
        // channel then just means there is nothing left to stop.
        if self.stop_tx.send(signal).await.is_err() {
            debug!(pid = self.pid, ?signal, "monitor already finished; stop skipped");
        }
        Ok(())
    }

    /// Poll for process close every `poll`, for at most `limit`.
    ///
    /// Returns whether the process closed in time.
    pub async fn wait_closed(&self, limit: Duration, poll: Duration) -> bool {
        let started = Instant::now();
        loop {
            if self.is_closed() {
                return true;
            }
            if started.elapsed() >= limit {
                return false;
            }
            sleep(poll).await;
        }
    }
}

fn missing_pipe(program: &str, stream: &str) -> AdapterError {
    AdapterError::Spawn {
        program: program.to_string(),
        source: io::Error::other(format!("{stream} pipe unavailable")),
        stderr: String::new(),
    }
}

fn spawn_stderr_reader(
    mut stderr: tokio::process::ChildStderr,
    buffer: StderrBuffer,
    drained_tx: watch::Sender<bool>,
) {
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        // Bytes of a UTF-8 sequence split across reads wait here.
        let mut pending: Vec<u8> = Vec::new();

        loop {
            match stderr.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    pending.extend_from_slice(&chunk[..n]);
                    let valid = match std::str::from_utf8(&pending) {
                        Ok(s) => s.len(),
                        Err(e) if e.error_len().is_none() => e.valid_up_to(),
                        Err(_) => pending.len(),
                    };
                    let text: Vec<u8> = pending.drain(..valid).collect();
                    buffer.append(&String::from_utf8_lossy(&text));
                }
                Err(err) => {
                    debug!(error = %err, "error reading adapter stderr");
                    break;
                }
            }
        }

        if !pending.is_empty() {
            buffer.append(&String::from_utf8_lossy(&pending));
        }
        let _ = drained_tx.send(true);
    });
}

async fn monitor_process(
    mut child: Child,
    pid: Option<u32>,
    mut stop_rx: mpsc::Receiver<StopSignal>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
    stderr: StderrBuffer,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(signal) = stop_rx.recv() => {
                deliver_stop(&mut child, signal);
            }
        }
    };

    let exit = match status {
        Ok(status) => ExitInfo::from(status),
        Err(err) => {
            warn!(pid, error = %err, "failed waiting for message adapter");
            ExitInfo::unknown()
        }
    };

    exit_tx.send_replace(Some(exit));

    info!(pid, exit_code = ?exit.code, signal = ?exit.signal, "message adapter exited");
    if !exit.success() {
        let captured = stderr.settled(STDERR_DRAIN_GRACE).await;
        warn!(pid, stderr = %captured, "message adapter failure");
    }
}

/// Signal `child` unless it has already been reaped. Returns whether a signal
/// was sent.
fn deliver_stop(child: &mut Child, signal: StopSignal) -> bool {
    // `id()` is `None` once the child has been reaped, and an unreaped pid
    // cannot be reused.
    let Some(pid) = child.id() else {
        debug!(?signal, "message adapter already reaped; stop skipped");
        return false;
    };

    if signal == StopSignal::Terminate {
        match send_terminate(pid) {
            Ok(()) => {
                debug!(pid, "sent terminate signal to message adapter");
                return true;
            }
            Err(err) => warn!(pid, error = %err, "terminate signal failed; forcing kill"),
        }
    }

    info!(pid, "killing message adapter");
    match child.start_kill() {
        Ok(()) => true,
        Err(err) => {
            warn!(pid, error = %err, "failed to kill message adapter");
            false
        }
    }
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid).map_err(|_| io::Error::other("pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions. Only the monitor
    // calls this, holding the `Child`, which it has not yet reaped.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "graceful termination is not available on this platform",
    ))
}
