//! Command-line input state machine
//!
//! Keystrokes become discrete [`InputEvent`]s; a pure reducer folds them into
//! the edit buffer and reports what the caller must do next. Keeping the
//! reducer free of I/O makes the editing rules testable without a terminal.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// One discrete editing event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A printable character
    Char(char),
    /// Remove the last character
    Backspace,
    /// Empty the buffer
    Clear,
    /// Dispatch the buffer contents
    Submit,
}

/// What the caller must do after applying an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// Nothing changed
    Unchanged,
    /// The buffer changed; redraw the input row
    Redraw,
    /// Dispatch this command; the buffer is already empty
    Submit(String),
}

/// The editable command line
#[derive(Debug, Default)]
pub struct InputState {
    buffer: String,
}

impl InputState {
    /// Create an empty input line
    pub fn new() -> Self {
        Self::default()
    }

    /// Current buffer contents
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Apply one event and report the required follow-up
    pub fn apply(&mut self, event: InputEvent) -> InputAction {
        match event {
            InputEvent::Char(c) => {
                // Printable ASCII only; SCPI is an ASCII protocol and
                // control characters must never reach the buffer.
                if ('\x20'..='\x7e').contains(&c) {
                    self.buffer.push(c);
                    InputAction::Redraw
                } else {
                    InputAction::Unchanged
                }
            }
            InputEvent::Backspace => {
                if self.buffer.pop().is_some() {
                    InputAction::Redraw
                } else {
                    InputAction::Unchanged
                }
            }
            InputEvent::Clear => {
                if self.buffer.is_empty() {
                    InputAction::Unchanged
                } else {
                    self.buffer.clear();
                    InputAction::Redraw
                }
            }
            InputEvent::Submit => {
                if self.buffer.is_empty() {
                    InputAction::Unchanged
                } else {
                    InputAction::Submit(std::mem::take(&mut self.buffer))
                }
            }
        }
    }
}

/// Map a terminal key event to an input event
///
/// Returns `None` for keys the input line does not handle (releases,
/// navigation, chords other than the clear key).
pub fn map_key(key: &KeyEvent) -> Option<InputEvent> {
    if key.kind == KeyEventKind::Release {
        return None;
    }

    match (key.code, key.modifiers) {
        (KeyCode::Enter, _) => Some(InputEvent::Submit),
        (KeyCode::Backspace, _) => Some(InputEvent::Backspace),
        (KeyCode::Char('u'), KeyModifiers::CONTROL) => Some(InputEvent::Clear),
        (KeyCode::Char(c), KeyModifiers::NONE | KeyModifiers::SHIFT) => {
            Some(InputEvent::Char(c))
        }
        _ => None,
    }
}
