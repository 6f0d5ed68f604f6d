//! Frame Catalog and Style Palette
//!
//! The two immutable collections every session reads from. Both are built
//! once at startup, wrapped in an `Arc`, and then shared by all session tasks
//! without any locking. Neither type exposes a way to mutate its contents
//! after construction.
//!
//! # Invariants
//!
//! - A catalog always holds at least one frame
//! - A palette always holds at least one style
//!
//! Empty collections are rejected at construction time with
//! [`CatalogError`], so a session can never observe an index that has
//! nothing behind it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building a catalog or palette
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// A frame catalog was built from zero frames
    #[error("frame catalog is empty")]
    EmptyCatalog,

    /// A style palette was built from zero styles
    #[error("style palette is empty")]
    EmptyPalette,

    /// A color string could not be parsed
    #[error("invalid color {0:?}: expected #RRGGBB")]
    InvalidColor(String),
}

// ============================================================================
// Frames
// ============================================================================

/// One pre-rendered animation step
///
/// The text is reference counted so rendering a view never copies the
/// frame body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame(Arc<str>);

impl Frame {
    /// Create a frame from its text
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// The raw frame text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.0
    }

    /// Shared handle to the frame text
    #[must_use]
    pub fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.0)
    }

    /// Number of text lines in the frame
    #[must_use]
    pub fn height(&self) -> usize {
        self.0.lines().count()
    }

    /// Widest line, in characters
    #[must_use]
    pub fn width(&self) -> usize {
        self.0.lines().map(|l| l.chars().count()).max().unwrap_or(0)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Immutable ordered sequence of animation frames
#[derive(Debug, Clone)]
pub struct FrameCatalog {
    frames: Vec<Frame>,
}

impl FrameCatalog {
    /// Build a catalog
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::EmptyCatalog`] if `frames` is empty.
    pub fn new(frames: Vec<Frame>) -> Result<Self, CatalogError> {
        if frames.is_empty() {
            return Err(CatalogError::EmptyCatalog);
        }
        Ok(Self { frames })
    }

    /// Frame at `index`, if in range
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// Frame at `index` modulo the catalog length
    ///
    /// Never fails, since the catalog is never empty.
    #[must_use]
    pub fn at(&self, index: usize) -> &Frame {
        &self.frames[index % self.frames.len()]
    }

    /// Number of frames (always at least one)
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false; kept for API symmetry with collections
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Iterate over the frames in order
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }
}

// ============================================================================
// Styles
// ============================================================================

/// 24-bit RGB color
///
/// Serialized as a `#RRGGBB` string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
}

impl Color {
    /// Create a color from its channels
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl FromStr for Color {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CatalogError::InvalidColor(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for Color {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Display attributes applied to a frame when it is rendered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    /// Foreground color
    pub fg: Color,
}

impl Style {
    /// A style with the given foreground color
    #[must_use]
    pub const fn foreground(fg: Color) -> Self {
        Self { fg }
    }

    /// Wrap `text` in this style's ANSI attributes
    ///
    /// Each line is wrapped on its own so that terminals which reset
    /// attributes at line boundaries still color every row.
    #[must_use]
    pub fn paint(&self, text: &str) -> String {
        let Color { r, g, b } = self.fg;
        let mut out = String::with_capacity(text.len() + 24 * text.lines().count());
        for (i, line) in text.lines().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("\x1b[38;2;{r};{g};{b}m{line}\x1b[0m"));
        }
        out
    }
}

/// The colors a session cycles through by default
pub const DEFAULT_COLORS: [Color; 7] = [
    Color::rgb(0xFF, 0x00, 0x00), // red
    Color::rgb(0xFF, 0xFF, 0x00), // yellow
    Color::rgb(0x00, 0xFF, 0x00), // green
    Color::rgb(0x02, 0x47, 0xFE), // blue
    Color::rgb(0xFF, 0x00, 0xFF), // magenta
    Color::rgb(0x00, 0xFF, 0xFF), // cyan
    Color::rgb(0xFF, 0xFF, 0xFF), // white
];

/// Immutable ordered set of styles
#[derive(Debug, Clone)]
pub struct StylePalette {
    styles: Vec<Style>,
}

impl StylePalette {
    /// Build a palette
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::EmptyPalette`] if `styles` is empty.
    pub fn new(styles: Vec<Style>) -> Result<Self, CatalogError> {
        if styles.is_empty() {
            return Err(CatalogError::EmptyPalette);
        }
        Ok(Self { styles })
    }

    /// Build a palette of foreground colors
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::EmptyPalette`] if `colors` is empty.
    pub fn from_colors(colors: impl IntoIterator<Item = Color>) -> Result<Self, CatalogError> {
        Self::new(colors.into_iter().map(Style::foreground).collect())
    }

    /// Style at `index`, if in range
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Style> {
        self.styles.get(index)
    }

    /// Style at `index` modulo the palette length
    #[must_use]
    pub fn at(&self, index: usize) -> &Style {
        &self.styles[index % self.styles.len()]
    }

    /// Number of styles (always at least one)
    #[must_use]
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    /// Always false; kept for API symmetry with collections
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

impl Default for StylePalette {
    fn default() -> Self {
        Self {
            styles: DEFAULT_COLORS.iter().copied().map(Style::foreground).collect(),
        }
    }
}
