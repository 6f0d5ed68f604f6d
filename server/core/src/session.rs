//! Session Handles
//!
//! The boundary between a transport and the [`SessionRuntime`]. A transport
//! hands the runtime one [`SessionHandle`] per inbound connection: an input
//! channel, an output sink, and whatever it learned about the remote
//! terminal. The runtime never sees sockets.
//!
//! [`SessionRuntime`]: crate::runtime::SessionRuntime

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::program::{Input, ProgramError, RenderedFrame};

/// Identifier of a session, unique within its runtime
///
/// Allocated by the owning runtime, starting at 1, stable for the life of
/// the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Hands out increasing session IDs for one runtime
#[derive(Debug)]
pub(crate) struct SessionIds(AtomicU64);

impl SessionIds {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub(crate) fn next(&self) -> SessionId {
        SessionId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// What the remote side told us about its terminal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalInfo {
    /// `$TERM` of the remote terminal
    pub term: String,
    /// Columns
    pub cols: u16,
    /// Rows
    pub rows: u16,
}

/// Why a session ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// The user asked to quit
    Quit,
    /// The remote end closed the connection
    Disconnected,
    /// Writing a frame failed or timed out
    WriteFailed,
    /// The server is shutting down
    Shutdown,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quit => write!(f, "quit"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::Shutdown => write!(f, "server shutting down"),
        }
    }
}

/// Per-session failures
///
/// None of these ever escape the session they happened in.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The connection never negotiated an interactive terminal
    #[error("partty requires an active terminal")]
    NoTerminal,

    /// The runtime is shutting down and takes no new sessions
    #[error("server is shutting down")]
    ShuttingDown,

    /// The output side of the connection is gone
    #[error("output closed")]
    OutputClosed,

    /// Writing to the connection failed
    #[error("write failed: {0}")]
    Write(String),

    /// A write did not complete in time
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The program could not be constructed
    #[error(transparent)]
    Program(#[from] ProgramError),
}

/// Where a session's rendered frames go
///
/// Only [`send`](FrameSink::send) is required; the lifecycle hooks default to
/// doing nothing. The runtime calls `start` once before the first frame,
/// `finish` at most once after the last one, and never calls anything again
/// after a `send` has failed.
#[async_trait]
pub trait FrameSink: Send {
    /// Deliver one frame
    async fn send(&mut self, frame: RenderedFrame) -> Result<(), SessionError>;

    /// The session was accepted
    async fn start(&mut self, _id: SessionId, _tick_period: Duration) -> Result<(), SessionError> {
        Ok(())
    }

    /// The session ended cleanly and the output is still usable
    async fn finish(&mut self, _reason: EndReason) -> Result<(), SessionError> {
        Ok(())
    }

    /// The runtime declined to start a session on this connection
    async fn reject(&mut self, _error: &SessionError) -> Result<(), SessionError> {
        Ok(())
    }
}

#[async_trait]
impl FrameSink for mpsc::Sender<RenderedFrame> {
    async fn send(&mut self, frame: RenderedFrame) -> Result<(), SessionError> {
        mpsc::Sender::send(self, frame)
            .await
            .map_err(|_| SessionError::OutputClosed)
    }
}

/// Everything the runtime needs to drive one connection
pub struct SessionHandle {
    /// Remote address, for logging
    pub peer: String,
    /// Negotiated terminal, `None` if the client never asked for one
    pub terminal: Option<TerminalInfo>,
    /// Input from the remote user; closes when the connection does
    pub input: mpsc::Receiver<Input>,
    /// Output back to the remote user
    pub output: Box<dyn FrameSink>,
}

impl SessionHandle {
    /// Build a handle
    pub fn new(
        peer: impl Into<String>,
        terminal: Option<TerminalInfo>,
        input: mpsc::Receiver<Input>,
        output: impl FrameSink + 'static,
    ) -> Self {
        Self {
            peer: peer.into(),
            terminal,
            input,
            output: Box::new(output),
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("peer", &self.peer)
            .field("terminal", &self.terminal)
            .finish_non_exhaustive()
    }
}
