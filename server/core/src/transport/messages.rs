//! Wire messages
//!
//! [`ClientEvent`] flows from viewer to server, [`ServerMessage`] the other
//! way. Both are internally tagged JSON objects, e.g.
//! `{"type":"key","code":{"Char":"q"},"ctrl":false,"alt":false}`.

use serde::{Deserialize, Serialize};

use crate::catalog::Color;
use crate::program::{Input, KeyPress, RenderedFrame};
use crate::session::{SessionId, TerminalInfo};

/// Messages sent by a viewer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// First message on every connection
    Handshake {
        /// Protocol version the client speaks
        protocol_version: u32,
        /// The client's terminal, or `None` if it is not interactive
        terminal: Option<TerminalInfo>,
    },
    /// A key press
    Key(KeyPress),
    /// The viewer's terminal was resized
    Resize {
        /// Columns
        cols: u16,
        /// Rows
        rows: u16,
    },
    /// The viewer asks to stop (e.g. it caught SIGINT)
    Interrupt,
    /// The viewer is going away
    Disconnect,
}

impl ClientEvent {
    /// The session input this event carries, if any
    #[must_use]
    pub fn into_input(self) -> Option<Input> {
        match self {
            Self::Key(key) => Some(Input::Key(key)),
            Self::Resize { cols, rows } => Some(Input::Resize { cols, rows }),
            Self::Interrupt => Some(Input::Interrupt),
            Self::Handshake { .. } | Self::Disconnect => None,
        }
    }
}

/// Messages sent by the server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The session was accepted
    Welcome {
        /// Server-assigned session ID
        session_id: u64,
        /// Tick period in milliseconds
        tick_ms: u64,
    },
    /// One animation frame
    Frame {
        /// Catalog index of the frame
        index: usize,
        /// Frame text, uncolored
        text: String,
        /// Foreground color to draw it in
        fg: Color,
    },
    /// The session ended normally
    Goodbye {
        /// Why
        reason: String,
    },
    /// No session will be started on this connection
    Rejected {
        /// Why
        reason: String,
    },
}

impl ServerMessage {
    /// Welcome for a newly started session
    #[must_use]
    pub fn welcome(id: SessionId, tick_period: std::time::Duration) -> Self {
        Self::Welcome {
            session_id: id.as_u64(),
            tick_ms: u64::try_from(tick_period.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl From<&RenderedFrame> for ServerMessage {
    fn from(frame: &RenderedFrame) -> Self {
        Self::Frame {
            index: frame.index,
            text: frame.text.to_string(),
            fg: frame.fg(),
        }
    }
}
