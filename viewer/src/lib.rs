//! partty Viewer
//!
//! Terminal client for a partty daemon. Connects over TCP, performs the
//! handshake with the local terminal's size, forwards keys and resizes,
//! and draws every frame the session sends until it says goodbye.

pub mod app;
pub mod keys;

pub use app::{frame_area, run, App, FrameView, Screen};
