//! The character-grid terminal the dashboard paints into, and the event
//! source it listens on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ratatui::style::Style;

use crate::error::Result;

pub mod tty;
pub mod memory;

pub use self::tty::{CrosstermEvents, RatatuiBackend, open_crossterm};
pub use self::memory::{ChannelEvents, MemoryBackend, MemoryScreen};

/// A cell grid that is filled with `set_cell` and pushed to the screen with `show`.
pub trait TerminalBackend: Send {
    /// Current `(width, height)` in cells.
    fn size(&mut self) -> Result<(u16, u16)>;
    /// Writes into the pending frame. Cells outside the grid are ignored.
    fn set_cell(&mut self, x: u16, y: u16, ch: char, style: Style);
    fn show(&mut self) -> Result<()>;
    /// Repaints the whole screen, discarding whatever the backend assumed was on it.
    fn sync(&mut self) -> Result<()>;
    /// Hands the terminal back to the surrounding process.
    fn finalize(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Ctrl+C.
    Interrupt,
    Escape,
    /// Ctrl+D.
    Exit,
    Char(char),
    Other,
}

impl Key {
    /// Keys that cancel the whole run.
    pub fn is_interrupt(self) -> bool {
        matches!(self, Key::Interrupt | Key::Escape | Key::Exit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermEvent {
    Resize { width: u16, height: u16 },
    Key(Key),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polled {
    Event(TermEvent),
    /// Nothing arrived within the timeout.
    Idle,
    /// The source shut down; no more events will come.
    Closed,
}

pub trait EventSource: Send {
    fn next_event(&mut self, timeout: Duration) -> Polled;
}

/// Exclusive owner of the dashboard's backend.
///
/// Once `finalize` has run the backend is gone: `with_backend` returns `None`
/// and further `finalize` calls are no-ops. Dropping the session finalizes it.
pub struct TerminalSession {
    backend: Mutex<Option<Box<dyn TerminalBackend>>>,
    finalized: AtomicBool,
}

impl TerminalSession {
    pub fn new(backend: Box<dyn TerminalBackend>) -> Self {
        Self {
            backend: Mutex::new(Some(backend)),
            finalized: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn TerminalBackend>>> {
        // A panic mid-frame poisons the lock; the backend is still ours to tear down.
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_backend<R>(&self, f: impl FnOnce(&mut dyn TerminalBackend) -> R) -> Option<R> {
        let mut guard = self.lock();
        let backend = guard.as_mut()?;
        Some(f(&mut **backend))
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    pub fn finalize(&self) -> Result<()> {
        let taken = self.lock().take();
        self.finalized.store(true, Ordering::SeqCst);
        match taken {
            Some(mut backend) => {
                tracing::debug!("finalizing terminal");
                backend.finalize()
            }
            None => Ok(()),
        }
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            tracing::warn!("terminal teardown failed: {e}");
        }
    }
}
