// src/exec/protocol.rs

//! Line-framed command/response protocol spoken with the message adapter.
//!
//! Outgoing frame:
//!
//! ```text
//! <command>\n
//! <json payload>\n
//! <EOC>\n
//! ```
//!
//! Incoming responses arrive as one or more lines; the line ending in `<EOC>`
//! closes the frame. Lines are concatenated as-is (without separators), the
//! marker is stripped, and the result is parsed as one JSON value.
//!
//! Only one command is ever outstanding, so responses are matched to requests
//! purely by order.

use std::fmt;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tracing::trace;

use crate::errors::{AdapterError, Result};

/// End-of-command marker closing every frame in both directions.
pub const END_OF_COMMAND: &str = "<EOC>";

/// Control frame asking the adapter to exit.
pub const EXIT_SIGNAL: &str = "<EXIT>";

/// The three commands exchanged during one task invocation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    LoadAndUpdateRemoteEvent,
    LoadNestedEvent,
    CreateNextEvent,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::LoadAndUpdateRemoteEvent => "loadAndUpdateRemoteEvent",
            Command::LoadNestedEvent => "loadNestedEvent",
            Command::CreateNextEvent => "createNextEvent",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialize one command frame.
pub fn encode_frame(command: Command, payload: &Value) -> Result<String> {
    let json = serde_json::to_string(payload)?;
    Ok(format!("{command}\n{json}\n{END_OF_COMMAND}\n"))
}

/// Write one command frame and flush it.
pub async fn send_command<W>(writer: &mut W, command: Command, payload: &Value) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(command, payload)?;
    trace!(%command, bytes = frame.len(), "writing command frame");
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Write the exit control frame.
///
/// `leading_newline` separates the marker from whatever the adapter may have
/// read last when no command is mid-flight.
pub async fn send_exit<W>(writer: &mut W, leading_newline: bool) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = if leading_newline {
        format!("\n{EXIT_SIGNAL}\n")
    } else {
        format!("{EXIT_SIGNAL}\n")
    };
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Incremental frame assembly, independent of any IO.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its line ending).
    ///
    /// Returns the complete frame text once a line ending in the marker is
    /// seen; the decoder is then empty and ready for the next frame.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        match line.strip_suffix(END_OF_COMMAND) {
            Some(rest) => {
                self.buffer.push_str(rest);
                Some(std::mem::take(&mut self.buffer))
            }
            None => {
                self.buffer.push_str(line);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Reads response frames from the adapter's stdout.
///
/// Reading is pull-based: lines are only consumed while a response is being
/// awaited, so nothing belonging to the next response is read early.
pub struct FrameReader<R> {
    lines: Lines<R>,
    decoder: FrameDecoder,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            decoder: FrameDecoder::new(),
        }
    }

    /// Wait for the next complete response and parse it.
    ///
    /// Returns `Ok(None)` if the stream closes before a terminator line; any
    /// partial frame collected so far is discarded.
    pub async fn next_frame(&mut self, command: Command) -> Result<Option<Value>> {
        while let Some(line) = self.lines.next_line().await? {
            trace!(%command, line_len = line.len(), "adapter stdout line");
            if let Some(text) = self.decoder.push_line(&line) {
                let value = serde_json::from_str(&text).map_err(|e| {
                    AdapterError::protocol(command.as_str(), format!("response is not valid JSON ({e}): {text}"))
                })?;
                return Ok(Some(value));
            }
        }

        if !self.decoder.is_empty() {
            trace!(%command, "stream closed with a partial frame buffered");
        }
        self.decoder = FrameDecoder::new();
        Ok(None)
    }
}
