use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

use ratatui::style::{Color, Style};

use crate::error::{Error, Result};
use crate::layout::{self, FrameLayout, Row, Tone};
use crate::state::{self, DashboardState};
use crate::terminal::{TerminalBackend, TerminalSession};

pub const FAILED_COLOR: Color = Color::Rgb(190, 0, 0);
pub const ACTIVE_COLOR: Color = Color::Rgb(190, 190, 0);
pub const SUMMARY_COLOR: Color = Color::Rgb(190, 190, 190);

pub fn style_for(tone: Tone) -> Style {
    let base = Style::default();
    match tone {
        Tone::FailedHeader => base.fg(FAILED_COLOR),
        Tone::ActiveHeader => base.fg(ACTIVE_COLOR),
        Tone::Summary => base.fg(SUMMARY_COLOR),
        Tone::Log => base,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drawn {
    Frame,
    /// No failed or building job; the previous frame stays up.
    Nothing,
    /// The terminal was already handed back.
    Finalized,
}

/// Draws one frame from the current registry.
///
/// The registry is copied under the state lock and the lock is released before
/// any terminal I/O. A backend error finalizes the terminal, is recorded on the
/// state, and is returned. A panic while painting finalizes the terminal and
/// then keeps unwinding.
pub fn render_frame(session: &TerminalSession, state: &Mutex<DashboardState>) -> Result<Drawn> {
    let (width, height) = match session.with_backend(|b| b.size()) {
        None => return Ok(Drawn::Finalized),
        Some(Ok(size)) => size,
        Some(Err(e)) => return Err(fail(session, state, e)),
    };

    let jobs = state::lock(state).registry.classify();
    let Some(layout) = layout::compute(width as usize, height as usize, &jobs) else {
        return Ok(Drawn::Nothing);
    };

    let painted = session.with_backend(|b| {
        panic::catch_unwind(AssertUnwindSafe(|| {
            paint(b, &layout);
            b.show()
        }))
    });
    match painted {
        None => Ok(Drawn::Finalized),
        Some(Ok(Ok(()))) => {
            tracing::trace!(rows = layout.rows.len(), "frame drawn");
            Ok(Drawn::Frame)
        }
        Some(Ok(Err(e))) => Err(fail(session, state, e)),
        Some(Err(payload)) => {
            let _ = fail(session, state, Error::render("dashboard render panicked"));
            panic::resume_unwind(payload)
        }
    }
}

/// Forces a full repaint, with the same failure handling as [`render_frame`].
pub fn resync(session: &TerminalSession, state: &Mutex<DashboardState>) -> Result<()> {
    match session.with_backend(|b| b.sync()) {
        None | Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(fail(session, state, e)),
    }
}

fn fail(session: &TerminalSession, state: &Mutex<DashboardState>, err: Error) -> Error {
    if let Err(e) = session.finalize() {
        tracing::warn!("terminal teardown after render failure failed: {e}");
    }
    tracing::error!("dashboard render failed: {err}");
    state::lock(state).record_failure(err.clone());
    err
}

/// Writes every row of the frame, blank rows included, each padded to full width.
pub fn paint(backend: &mut dyn TerminalBackend, layout: &FrameLayout) {
    let mut slots: Vec<Option<&Row>> = vec![None; layout.height];
    for row in &layout.rows {
        if let Some(slot) = slots.get_mut(row.y) {
            *slot = Some(row);
        }
    }
    if let Some(slot) = slots.get_mut(layout.summary.y) {
        *slot = Some(&layout.summary);
    }

    for (y, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(row) => write_row(backend, y, &row.text, style_for(row.tone), layout.width),
            None => write_row(backend, y, "", Style::default(), layout.width),
        }
    }
}

fn write_row(backend: &mut dyn TerminalBackend, y: usize, text: &str, style: Style, width: usize) {
    let Ok(y) = u16::try_from(y) else {
        return;
    };
    let mut chars = text.chars();
    for x in 0..width {
        let ch = chars.next().unwrap_or(' ');
        backend.set_cell(x as u16, y, ch, style);
    }
}
