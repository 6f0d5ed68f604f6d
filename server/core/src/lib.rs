//! partty Core - Per-Session Terminal Animation Runtime
//!
//! Every client that connects gets its own dancing parrot. This crate holds
//! everything that is not a binary: the shared frame and color catalogs, the
//! per-session state machine, the runtime that drives one session task per
//! connection, the wire protocol, and configuration loading.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    partty-daemon (TCP listener)                   │
//! └───────────────┬──────────────────────────────────────────────────┘
//!                 │ one stream per connection
//! ┌───────────────┴──────────────────────────────────────────────────┐
//! │ transport::serve_connection                                      │
//! │   handshake ─► SessionHandle { input channel, WireSink }         │
//! └───────────────┬──────────────────────────────────────────────────┘
//!                 │
//! ┌───────────────┴──────────────────────────────────────────────────┐
//! │ SessionRuntime                                                    │
//! │   one task per session: select!(tick, input, shutdown)           │
//! │   ┌──────────────────┐   ┌──────────────────┐                    │
//! │   │ SessionProgram   │   │ SessionProgram   │   ...              │
//! │   └────────┬─────────┘   └────────┬─────────┘                    │
//! │            └──────────┬───────────┘                              │
//! │             Arc<FrameCatalog>, Arc<StylePalette>                 │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Overview
//!
//! - [`catalog`]: Frames, colors, styles, and the immutable collections of them
//! - [`program`]: The per-session state machine
//! - [`session`]: The boundary between a transport and the runtime
//! - [`runtime`]: Session multiplexer
//! - [`stats`]: Aggregate counters
//! - [`assets`]: Bundled frames and frame directories
//! - [`transport`]: Wire protocol and per-connection handling
//! - [`config`]: Layered configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assets;
pub mod catalog;
pub mod config;
pub mod program;
pub mod runtime;
pub mod session;
pub mod stats;
pub mod transport;

pub use assets::{builtin_catalog, builtin_frames, load_catalog, AssetError};
pub use catalog::{
    CatalogError, Color, Frame, FrameCatalog, Style, StylePalette, DEFAULT_COLORS,
};
pub use config::{
    default_config_path, load_config, load_config_from_path, load_required_config,
    ConfigError, ConfigOverrides, ConfigSource, PartyConfig, PartyToml,
};
pub use program::{
    Event, Input, KeyCode, KeyPress, ProgramError, ProgramState, RenderedFrame, SessionProgram,
    Update,
};
pub use runtime::{RuntimeConfig, SessionInfo, SessionReport, SessionRuntime, DEFAULT_FPS};
pub use session::{EndReason, FrameSink, SessionError, SessionHandle, SessionId, TerminalInfo};
pub use stats::{RuntimeStats, StatsSnapshot};
pub use transport::{
    serve_connection, ClientEvent, ServerMessage, TransportConfig, TransportError,
    PROTOCOL_VERSION,
};
