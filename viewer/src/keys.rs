//! Terminal events to protocol events
//!
//! The server only understands [`ClientEvent`]s, so every crossterm event the
//! viewer cares about is translated here. Key releases and repeats are
//! dropped; a held key should not flood the session.

use crossterm::event::{Event, KeyCode as TermKeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use partty_core::{ClientEvent, KeyCode, KeyPress};

/// Translate a crossterm key event
pub fn key_press(key: &KeyEvent) -> KeyPress {
    let code = match key.code {
        TermKeyCode::Char(c) => KeyCode::Char(c),
        TermKeyCode::Enter => KeyCode::Enter,
        TermKeyCode::Esc => KeyCode::Esc,
        TermKeyCode::Backspace => KeyCode::Backspace,
        TermKeyCode::Tab => KeyCode::Tab,
        TermKeyCode::Up => KeyCode::Up,
        TermKeyCode::Down => KeyCode::Down,
        TermKeyCode::Left => KeyCode::Left,
        TermKeyCode::Right => KeyCode::Right,
        TermKeyCode::F(n) => KeyCode::F(n),
        _ => KeyCode::Unknown,
    };

    KeyPress {
        code,
        ctrl: key.modifiers.contains(KeyModifiers::CONTROL),
        alt: key.modifiers.contains(KeyModifiers::ALT),
    }
}

/// The protocol event for a terminal event, if it should be forwarded
pub fn client_event(event: &Event) -> Option<ClientEvent> {
    match event {
        // Only handle Press events (not Release or Repeat)
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            Some(ClientEvent::Key(key_press(key)))
        }
        Event::Resize(cols, rows) => Some(ClientEvent::Resize {
            cols: *cols,
            rows: *rows,
        }),
        _ => None,
    }
}
