//! Main Application
//!
//! The viewer is a thin display client:
//! - Terminal events are translated and sent to the server
//! - Server messages update [`App`]
//! - The screen is redrawn whenever a new frame arrives
//!
//! All animation state lives on the server. The viewer never advances a
//! frame on its own, so what it shows is exactly what the session emitted.

use std::io;

use anyhow::Context;
use crossterm::event::Event;
use futures::{Stream, StreamExt};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::style::Style as TuiStyle;
use ratatui::widgets::Paragraph;
use ratatui::Terminal;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use partty_core::transport::{write_message, FramedReader};
use partty_core::{ClientEvent, Color, ServerMessage, Style};

use crate::keys;

/// Shown until the first frame arrives
const WAITING: &str = "waiting for the party...";

/// Shown when the server goes away without saying goodbye
const CONNECTION_LOST: &str = "connection to the server was lost";

/// Clear screen and home the cursor
const CLEAR: &str = "\x1b[2J\x1b[H";

/// The frame currently on screen
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameView {
    /// Catalog index on the server
    pub index: usize,
    /// Frame text
    pub text: String,
    /// Foreground color
    pub fg: Color,
}

/// Viewer state
#[derive(Debug)]
pub struct App {
    running: bool,
    session_id: u64,
    tick_ms: u64,
    frame: Option<FrameView>,
    frames_seen: u64,
    goodbye: Option<String>,
}

impl App {
    /// State for a freshly welcomed session
    pub fn new(session_id: u64, tick_ms: u64) -> Self {
        Self {
            running: true,
            session_id,
            tick_ms,
            frame: None,
            frames_seen: 0,
            goodbye: None,
        }
    }

    /// Still waiting for frames?
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Session ID the server assigned
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Server tick period in milliseconds
    pub fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    /// Frame currently on screen
    pub fn frame(&self) -> Option<&FrameView> {
        self.frame.as_ref()
    }

    /// Frames received so far
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Why the session ended, once it has
    pub fn goodbye(&self) -> Option<&str> {
        self.goodbye.as_deref()
    }

    /// Apply a server message, returning whether the screen changed
    pub fn apply(&mut self, msg: ServerMessage) -> bool {
        match msg {
            ServerMessage::Frame { index, text, fg } => {
                self.frame = Some(FrameView { index, text, fg });
                self.frames_seen += 1;
                true
            }
            ServerMessage::Goodbye { reason } | ServerMessage::Rejected { reason } => {
                self.finish(reason);
                false
            }
            ServerMessage::Welcome { session_id, .. } => {
                tracing::warn!(session_id, "Ignoring repeated welcome");
                false
            }
        }
    }

    /// The server closed the stream
    pub fn connection_lost(&mut self) {
        if self.goodbye.is_none() {
            self.finish(CONNECTION_LOST.to_string());
        }
    }

    fn finish(&mut self, reason: String) {
        tracing::info!(
            session_id = self.session_id,
            frames = self.frames_seen,
            reason = %reason,
            "Session ended"
        );
        self.goodbye = Some(reason);
        self.running = false;
    }

    /// Draw the current frame centered in the terminal
    pub fn render(&self, f: &mut ratatui::Frame) {
        let area = f.area();
        match &self.frame {
            Some(view) => {
                let paragraph = Paragraph::new(view.text.as_str())
                    .style(TuiStyle::default().fg(tui_color(view.fg)));
                f.render_widget(paragraph, frame_area(area, &view.text));
            }
            None => f.render_widget(Paragraph::new(WAITING), frame_area(area, WAITING)),
        }
    }

    /// The current frame as raw ANSI, for `--plain`
    ///
    /// Raw mode does not translate `\n`, so lines end in `\r\n`.
    pub fn plain_text(&self) -> Option<String> {
        self.frame.as_ref().map(|view| {
            let painted = Style::foreground(view.fg).paint(&view.text);
            format!("{CLEAR}{}", painted.replace('\n', "\r\n"))
        })
    }
}

fn tui_color(color: Color) -> ratatui::style::Color {
    ratatui::style::Color::Rgb(color.r, color.g, color.b)
}

/// Center a block of text inside `area`, clipping it if it does not fit
pub fn frame_area(area: Rect, text: &str) -> Rect {
    let lines = text.lines().count();
    let longest = text.lines().map(|l| l.chars().count()).max().unwrap_or(0);

    let width = u16::try_from(longest).unwrap_or(u16::MAX).min(area.width);
    let height = u16::try_from(lines).unwrap_or(u16::MAX).min(area.height);

    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

/// Where frames are drawn
pub enum Screen {
    /// Alternate screen managed by ratatui
    Tui(Terminal<CrosstermBackend<io::Stdout>>),
    /// ANSI text written straight to a stream
    Plain(Box<dyn AsyncWrite + Unpin + Send>),
}

impl Screen {
    /// Redraw the current frame
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be written.
    pub async fn draw(&mut self, app: &App) -> anyhow::Result<()> {
        match self {
            Self::Tui(terminal) => {
                terminal.draw(|f| app.render(f)).context("Failed to draw frame")?;
            }
            Self::Plain(out) => {
                if let Some(text) = app.plain_text() {
                    out.write_all(text.as_bytes()).await?;
                    out.flush().await?;
                }
            }
        }
        Ok(())
    }
}

/// Drive the viewer until the session ends
///
/// `events` is the terminal event stream and `reader`/`writer` the two
/// halves of the server connection.
///
/// # Errors
///
/// Returns terminal, protocol, and IO errors. A server that simply hangs
/// up is not an error; [`App::goodbye`] then reports the lost connection.
pub async fn run<E, R, W>(
    app: &mut App,
    screen: &mut Screen,
    mut events: E,
    reader: &mut FramedReader<R>,
    writer: &mut W,
) -> anyhow::Result<()>
where
    E: Stream<Item = io::Result<Event>> + Unpin,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    screen.draw(app).await?;

    while app.is_running() {
        tokio::select! {
            maybe_event = events.next() => match maybe_event {
                Some(Ok(event)) => {
                    if let Some(client_event) = keys::client_event(&event) {
                        write_message(writer, &client_event).await?;
                    }
                    if matches!(event, Event::Resize(..)) {
                        screen.draw(app).await?;
                    }
                }
                Some(Err(e)) => return Err(e).context("Failed to read terminal events"),
                None => {
                    write_message(writer, &ClientEvent::Disconnect).await?;
                    app.finish("terminal closed".to_string());
                }
            },

            // FramedReader::next is cancel safe
            msg = reader.next::<ServerMessage>() => match msg? {
                Some(msg) => {
                    if app.apply(msg) {
                        screen.draw(app).await?;
                    }
                }
                None => app.connection_lost(),
            },
        }
    }

    Ok(())
}
