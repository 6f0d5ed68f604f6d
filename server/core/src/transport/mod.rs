//! Network Transport
//!
//! Carries sessions over any byte stream (TCP in the daemon, in-memory pipes
//! in tests). Both directions use the same framing: length-prefixed JSON with
//! a CRC32 checksum, see [`frame`].
//!
//! # Connection flow
//!
//! ```text
//! client                                   server
//!   │ ── Handshake{version, terminal} ──►    │
//!   │ ◄── Welcome{session_id, tick_ms} ──    │   (or Rejected{reason})
//!   │ ◄── Frame ── Frame ── Frame ── ...     │
//!   │ ── Key / Resize / Interrupt ──►        │
//!   │ ◄── Goodbye{reason}                    │
//! ```
//!
//! A client that sends no terminal in its handshake is told why and
//! disconnected; it never gets a session.

pub mod connection;
pub mod frame;
pub mod messages;

use std::time::Duration;

use thiserror::Error;

use crate::session::SessionError;

pub use connection::{serve_connection, WireSink};
pub use frame::{encode, write_message, FrameDecoder, FramedReader};
pub use messages::{ClientEvent, ServerMessage};

/// Version of the wire protocol spoken by this build
pub const PROTOCOL_VERSION: u32 = 1;

/// Errors raised by the transport layer
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the connection
    #[error("connection closed")]
    ConnectionClosed,

    /// A message could not be encoded or decoded
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Frame checksum mismatch; the data was corrupted in transit
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum carried by the frame
        expected: u32,
        /// Checksum of the received payload
        actual: u32,
    },

    /// The client did not complete the handshake in time
    #[error("handshake not received within {0:?}")]
    HandshakeTimeout(Duration),

    /// The client speaks a protocol version we do not
    #[error("unsupported protocol version {0} (expected {PROTOCOL_VERSION})")]
    UnsupportedVersion(u32),

    /// A message arrived that is not valid at this point of the exchange
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// IO error from the underlying stream
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The session runtime declined or failed the session
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Transport settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    /// How long a new connection may take to send its handshake
    pub handshake_timeout: Duration,
    /// Buffered inputs per session before the reader applies backpressure
    pub input_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            input_capacity: 32,
        }
    }
}
