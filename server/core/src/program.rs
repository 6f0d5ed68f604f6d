//! Session Program
//!
//! The per-connection state machine. A program owns the animation state of
//! exactly one session (frame index, style index, tick count) and advances it
//! in response to [`Event`]s delivered by the runtime.
//!
//! # State Machine
//!
//! ```text
//!              Tick: advance frame, redraw style
//!              other input: no-op
//!                 ┌──────────┐
//!                 ▼          │
//!   new() ──► Running ───────┘
//!                 │
//!                 │ quit input (q, ctrl+c, interrupt)
//!                 ▼
//!            Terminated   (every further event ignored)
//! ```
//!
//! The program never touches the clock or the network. The runtime owns the
//! timer and arms the next tick after each one is handled, for as long as
//! [`SessionProgram::next_tick`] keeps returning a period.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Color, FrameCatalog, Style, StylePalette};

/// Errors raised when constructing a program
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgramError {
    /// The tick period must be strictly positive
    #[error("tick period must be greater than zero")]
    InvalidTickPeriod,
}

// ============================================================================
// Input and events
// ============================================================================

/// Key identifier, independent of any terminal library
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    /// A printable character
    Char(char),
    /// Enter / Return
    Enter,
    /// Escape
    Esc,
    /// Backspace
    Backspace,
    /// Tab
    Tab,
    /// Arrow up
    Up,
    /// Arrow down
    Down,
    /// Arrow left
    Left,
    /// Arrow right
    Right,
    /// Function key F1..F24
    F(u8),
    /// Anything the client could not name
    Unknown,
}

/// A key press with its modifiers
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPress {
    /// Which key
    pub code: KeyCode,
    /// Control held
    #[serde(default)]
    pub ctrl: bool,
    /// Alt held
    #[serde(default)]
    pub alt: bool,
}

impl KeyPress {
    /// An unmodified key press
    #[must_use]
    pub fn plain(code: KeyCode) -> Self {
        Self {
            code,
            ctrl: false,
            alt: false,
        }
    }

    /// An unmodified character
    #[must_use]
    pub fn char(c: char) -> Self {
        Self::plain(KeyCode::Char(c))
    }

    /// Control plus a character
    #[must_use]
    pub fn ctrl(c: char) -> Self {
        Self {
            code: KeyCode::Char(c),
            ctrl: true,
            alt: false,
        }
    }

    /// Whether this key asks the program to quit (`q` or `ctrl+c`)
    #[must_use]
    pub fn is_quit(&self) -> bool {
        match self.code {
            KeyCode::Char('q') => !self.ctrl && !self.alt,
            KeyCode::Char('c') => self.ctrl && !self.alt,
            _ => false,
        }
    }
}

impl fmt::Display for KeyPress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            write!(f, "ctrl+")?;
        }
        if self.alt {
            write!(f, "alt+")?;
        }
        match &self.code {
            KeyCode::Char(' ') => write!(f, "space"),
            KeyCode::Char(c) => write!(f, "{c}"),
            KeyCode::Enter => write!(f, "enter"),
            KeyCode::Esc => write!(f, "esc"),
            KeyCode::Backspace => write!(f, "backspace"),
            KeyCode::Tab => write!(f, "tab"),
            KeyCode::Up => write!(f, "up"),
            KeyCode::Down => write!(f, "down"),
            KeyCode::Left => write!(f, "left"),
            KeyCode::Right => write!(f, "right"),
            KeyCode::F(n) => write!(f, "f{n}"),
            KeyCode::Unknown => write!(f, "unknown"),
        }
    }
}

/// Input delivered from the remote user
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// A key press
    Key(KeyPress),
    /// The remote terminal changed size
    Resize {
        /// Columns
        cols: u16,
        /// Rows
        rows: u16,
    },
    /// Out-of-band request to stop (remote interrupt, server shutdown)
    Interrupt,
}

impl Input {
    /// Whether this input ends the session
    #[must_use]
    pub fn is_quit(&self) -> bool {
        match self {
            Self::Key(key) => key.is_quit(),
            Self::Interrupt => true,
            Self::Resize { .. } => false,
        }
    }
}

/// Something the program reacts to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// The session clock fired
    Tick,
    /// The user sent input
    Input(Input),
}

// ============================================================================
// Program
// ============================================================================

/// Lifecycle state of a program
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramState {
    /// Animating
    Running,
    /// Stopped; no further events are processed
    Terminated,
}

/// A catalog frame composed with a palette style
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedFrame {
    /// Index of the frame in the catalog
    pub index: usize,
    /// Frame text
    pub text: Arc<str>,
    /// Style applied to the text
    pub style: Style,
}

impl RenderedFrame {
    /// Foreground color of the frame
    #[must_use]
    pub fn fg(&self) -> Color {
        self.style.fg
    }

    /// The frame text wrapped in ANSI color attributes
    #[must_use]
    pub fn to_ansi(&self) -> String {
        self.style.paint(&self.text)
    }
}

/// Result of handling one event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Update {
    /// State after the event
    pub state: ProgramState,
    /// New view to emit, if the event changed what is on screen
    pub frame: Option<RenderedFrame>,
}

/// One session's animation state machine
///
/// Generic over its random source so tests can inject a seeded generator.
pub struct SessionProgram<R = StdRng> {
    catalog: Arc<FrameCatalog>,
    palette: Arc<StylePalette>,
    tick_period: Duration,
    frame_index: usize,
    style_index: usize,
    ticks: u64,
    state: ProgramState,
    rng: R,
}

impl<R: Rng> SessionProgram<R> {
    /// Create a program in the `Running` state on frame 0
    ///
    /// The initial style is drawn from `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::InvalidTickPeriod`] if `tick_period` is zero.
    pub fn new(
        catalog: Arc<FrameCatalog>,
        palette: Arc<StylePalette>,
        tick_period: Duration,
        mut rng: R,
    ) -> Result<Self, ProgramError> {
        if tick_period.is_zero() {
            return Err(ProgramError::InvalidTickPeriod);
        }
        let style_index = rng.gen_range(0..palette.len());
        Ok(Self {
            catalog,
            palette,
            tick_period,
            frame_index: 0,
            style_index,
            ticks: 0,
            state: ProgramState::Running,
            rng,
        })
    }

    /// Apply one event
    pub fn handle(&mut self, event: Event) -> Update {
        if self.state == ProgramState::Terminated {
            return self.unchanged();
        }

        match event {
            Event::Tick => {
                self.frame_index = (self.frame_index + 1) % self.catalog.len();
                self.style_index = self.rng.gen_range(0..self.palette.len());
                self.ticks += 1;
                Update {
                    state: self.state,
                    frame: Some(self.view()),
                }
            }
            Event::Input(input) if input.is_quit() => {
                self.state = ProgramState::Terminated;
                self.unchanged()
            }
            Event::Input(_) => self.unchanged(),
        }
    }

    fn unchanged(&self) -> Update {
        Update {
            state: self.state,
            frame: None,
        }
    }
}

impl<R> SessionProgram<R> {
    /// Current frame composed with the current style
    ///
    /// Pure: repeated calls without an intervening event return equal frames.
    #[must_use]
    pub fn view(&self) -> RenderedFrame {
        RenderedFrame {
            index: self.frame_index,
            text: self.catalog.at(self.frame_index).shared_text(),
            style: *self.palette.at(self.style_index),
        }
    }

    /// Delay before the next tick, or `None` once terminated
    #[must_use]
    pub fn next_tick(&self) -> Option<Duration> {
        match self.state {
            ProgramState::Running => Some(self.tick_period),
            ProgramState::Terminated => None,
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ProgramState {
        self.state
    }

    /// Whether the program has stopped
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state == ProgramState::Terminated
    }

    /// Current frame index
    #[must_use]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Current style index
    #[must_use]
    pub fn style_index(&self) -> usize {
        self.style_index
    }

    /// Ticks handled so far
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Configured tick period
    #[must_use]
    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }
}

impl<R> fmt::Debug for SessionProgram<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionProgram")
            .field("frame_index", &self.frame_index)
            .field("style_index", &self.style_index)
            .field("ticks", &self.ticks)
            .field("state", &self.state)
            .field("tick_period", &self.tick_period)
            .finish_non_exhaustive()
    }
}
