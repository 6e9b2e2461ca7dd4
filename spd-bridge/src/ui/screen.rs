//! Status panel render engine
//!
//! A fixed bordered layout: title, channel labels, channel values,
//! link/client status, telemetry status, last-update line, and the live
//! command input. All escape-sequence emission lives here, keyed by row, so
//! every mutation path declares *which* row changed and the engine decides
//! how much to repaint:
//!
//! - full redraw on activation and on resize
//! - single-row repaint for everything else, with the cursor re-pinned to
//!   the input position afterwards
//!
//! When stdout is not an interactive terminal, or the window is too small,
//! the panel stays [`RenderMode::Inactive`] and callers fall back to plain
//! sequential output.

use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use crossterm::cursor::MoveTo;
use crossterm::terminal::{
    self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{cursor, queue};
use spd_protocol::MeasField;
use time::macros::format_description;
use time::OffsetDateTime;

/// Minimum terminal width for the panel
const MIN_WIDTH: u16 = 52;
/// Rows the panel occupies, borders included
pub const PANEL_HEIGHT: u16 = 8;

/// Logical rows of the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    /// Top border with the program name
    Title,
    /// Channel column headers
    Labels,
    /// Channel measurement values
    Values,
    /// Link and connected-client status
    Link,
    /// Telemetry sink status
    Telemetry,
    /// Last-update timestamp and ephemeral reply text
    Updated,
    /// Live command input
    Input,
}

impl Row {
    fn y(self) -> u16 {
        match self {
            Row::Title => 0,
            Row::Labels => 1,
            Row::Values => 2,
            Row::Link => 3,
            Row::Telemetry => 4,
            Row::Updated => 5,
            Row::Input => 6,
        }
    }
}

/// Everything the panel shows
#[derive(Debug)]
pub struct DisplayState {
    values: BTreeMap<MeasField, f64>,
    last_update: Option<String>,
    /// Connected client, when one is attached
    pub peer: Option<String>,
    /// Transport description (from the instrument handle)
    pub transport: String,
    /// Telemetry sink description
    pub telemetry: String,
    /// Samples flushed so far
    pub samples: u64,
    /// Ephemeral status text (local reply, error report)
    pub ephemeral: Option<String>,
}

impl DisplayState {
    /// Create an initial display state
    pub fn new(transport: String, telemetry: String) -> Self {
        Self {
            values: BTreeMap::new(),
            last_update: None,
            peer: None,
            transport,
            telemetry,
            samples: 0,
            ephemeral: None,
        }
    }

    /// Store a correlated measurement and stamp the update time
    pub fn record_measurement(&mut self, field: MeasField, value: f64) {
        self.values.insert(field, value);
        self.last_update = Some(now_hms());
    }

    /// Last stored value for a field
    pub fn value(&self, field: MeasField) -> Option<f64> {
        self.values.get(&field).copied()
    }
}

fn now_hms() -> String {
    let fmt = format_description!("[hour]:[minute]:[second]");
    OffsetDateTime::now_utc()
        .format(&fmt)
        .unwrap_or_else(|_| "--:--:--".to_string())
}

/// Whether the panel owns the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Plain sequential output; no cursor control
    Inactive,
    /// Bordered panel with partial redraws
    Active,
}

/// The panel renderer
pub struct StatusScreen {
    mode: RenderMode,
    width: u16,
}

impl StatusScreen {
    /// Create an inactive renderer
    pub fn new() -> Self {
        Self {
            mode: RenderMode::Inactive,
            width: 0,
        }
    }

    /// Current render mode
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Try to take over the terminal
    ///
    /// Succeeds only when stdout is an interactive terminal of sufficient
    /// size; otherwise the renderer stays inactive and reports `false`.
    pub fn activate(&mut self) -> io::Result<bool> {
        if !io::stdout().is_terminal() {
            return Ok(false);
        }
        let (width, height) = terminal::size()?;
        if width < MIN_WIDTH || height < PANEL_HEIGHT {
            return Ok(false);
        }

        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        queue!(stdout, EnterAlternateScreen, Clear(ClearType::All))?;
        stdout.flush()?;

        self.width = width;
        self.mode = RenderMode::Active;
        Ok(true)
    }

    /// Restore the terminal to its pre-activation configuration
    ///
    /// Safe to call repeatedly; the `Drop` impl calls it too so the terminal
    /// comes back even on abnormal exit paths.
    pub fn deactivate(&mut self) -> io::Result<()> {
        if self.mode != RenderMode::Active {
            return Ok(());
        }
        self.mode = RenderMode::Inactive;

        let mut stdout = io::stdout();
        queue!(stdout, cursor::Show, LeaveAlternateScreen)?;
        stdout.flush()?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    /// Repaint every row
    pub fn full_redraw(&mut self, state: &DisplayState, input: &str) -> io::Result<()> {
        if self.mode != RenderMode::Active {
            return Ok(());
        }

        let mut stdout = io::stdout();
        queue!(stdout, Clear(ClearType::All))?;
        for row in [
            Row::Title,
            Row::Labels,
            Row::Values,
            Row::Link,
            Row::Telemetry,
            Row::Updated,
            Row::Input,
        ] {
            self.queue_row(&mut stdout, row, state, input)?;
        }
        // Bottom border only exists on full repaints
        let bottom = format!("└{}┘", "─".repeat(self.width as usize - 2));
        queue!(stdout, MoveTo(0, PANEL_HEIGHT - 1))?;
        write!(stdout, "{bottom}")?;

        self.pin_cursor(&mut stdout, input)?;
        stdout.flush()
    }

    /// Repaint one row and re-pin the cursor to the input position
    pub fn redraw_row(&mut self, row: Row, state: &DisplayState, input: &str) -> io::Result<()> {
        if self.mode != RenderMode::Active {
            return Ok(());
        }

        let mut stdout = io::stdout();
        self.queue_row(&mut stdout, row, state, input)?;
        self.pin_cursor(&mut stdout, input)?;
        stdout.flush()
    }

    /// Handle a terminal resize notification
    ///
    /// A window still big enough gets a full repaint at the new width; one
    /// that shrank below the minimum drops the panel back to plain output.
    pub fn resize(
        &mut self,
        width: u16,
        height: u16,
        state: &DisplayState,
        input: &str,
    ) -> io::Result<()> {
        if self.mode != RenderMode::Active {
            return Ok(());
        }
        if width < MIN_WIDTH || height < PANEL_HEIGHT {
            return self.deactivate();
        }
        self.width = width;
        self.full_redraw(state, input)
    }

    fn queue_row(
        &self,
        stdout: &mut io::Stdout,
        row: Row,
        state: &DisplayState,
        input: &str,
    ) -> io::Result<()> {
        let text = self.row_text(row, state, input);
        queue!(stdout, MoveTo(0, row.y()), Clear(ClearType::CurrentLine))?;
        write!(stdout, "{text}")?;
        Ok(())
    }

    fn pin_cursor(&self, stdout: &mut io::Stdout, input: &str) -> io::Result<()> {
        // "│ > " prefix puts the first input char at column 4
        let col = (4 + input.len() as u16).min(self.width.saturating_sub(3));
        queue!(stdout, MoveTo(col, Row::Input.y()), cursor::Show)?;
        Ok(())
    }

    fn row_text(&self, row: Row, state: &DisplayState, input: &str) -> String {
        let width = self.width as usize;
        match row {
            Row::Title => {
                let name = " spd-bridge ";
                let dashes = width.saturating_sub(name.len() + 3);
                format!("┌─{}{}┐", name, "─".repeat(dashes))
            }
            Row::Labels => frame(labels_text(), width),
            Row::Values => frame(values_text(state), width),
            Row::Link => frame(link_text(state), width),
            Row::Telemetry => frame(telemetry_text(state), width),
            Row::Updated => frame(updated_text(state), width),
            Row::Input => frame(format!("> {input}"), width),
        }
    }
}

impl Default for StatusScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StatusScreen {
    fn drop(&mut self) {
        let _ = self.deactivate();
    }
}

/// Fit content between side borders, truncating or padding to width
fn frame(content: String, width: usize) -> String {
    let inner = width.saturating_sub(4);
    let clipped: String = content.chars().take(inner).collect();
    format!("│ {clipped:<inner$} │")
}

fn labels_text() -> String {
    MeasField::ALL
        .iter()
        .map(|f| format!("{:^11}", f.label()))
        .collect()
}

fn values_text(state: &DisplayState) -> String {
    MeasField::ALL
        .iter()
        .map(|f| match state.value(*f) {
            Some(v) => format!("{v:^11.3}"),
            None => format!("{:^11}", "---"),
        })
        .collect()
}

fn link_text(state: &DisplayState) -> String {
    let client = state.peer.as_deref().unwrap_or("none");
    format!("link {}   client {}", state.transport, client)
}

fn telemetry_text(state: &DisplayState) -> String {
    format!("telemetry {} ({} samples)", state.telemetry, state.samples)
}

fn updated_text(state: &DisplayState) -> String {
    let updated = state.last_update.as_deref().unwrap_or("--:--:--");
    match &state.ephemeral {
        Some(text) => format!("updated {updated}   {text}"),
        None => format!("updated {updated}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> DisplayState {
        DisplayState::new("serial /dev/ttyUSB0".into(), "disabled".into())
    }

    #[test]
    fn values_show_placeholders_until_measured() {
        let mut s = state();
        assert!(values_text(&s).contains("---"));

        s.record_measurement(MeasField::Ch1Voltage, 12.0);
        let text = values_text(&s);
        assert!(text.contains("12.000"));
        assert!(s.last_update.is_some());
    }

    #[test]
    fn frame_truncates_and_pads_to_width() {
        let short = frame("abc".to_string(), 20);
        assert_eq!(short.chars().count(), 20);
        assert!(short.starts_with("│ abc"));
        assert!(short.ends_with(" │"));

        let long = frame("x".repeat(100), 20);
        assert_eq!(long.chars().count(), 20);
    }

    #[test]
    fn updated_row_carries_ephemeral_text() {
        let mut s = state();
        assert_eq!(updated_text(&s), "updated --:--:--");
        s.ephemeral = Some("> 12.000".to_string());
        assert!(updated_text(&s).contains("> 12.000"));
    }

    #[test]
    fn link_row_tracks_client() {
        let mut s = state();
        assert!(link_text(&s).contains("client none"));
        s.peer = Some("127.0.0.1:50000".to_string());
        assert!(link_text(&s).contains("127.0.0.1:50000"));
    }
}
