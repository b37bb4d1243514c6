//! An in-process terminal for headless runs and tests.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ratatui::style::Style;

use super::{EventSource, Polled, TermEvent, TerminalBackend};
use crate::error::{Error, Result};

type Grid = Vec<Vec<(char, Style)>>;

fn blank_grid(width: u16, height: u16) -> Grid {
    vec![vec![(' ', Style::default()); width as usize]; height as usize]
}

#[derive(Default)]
struct ScreenState {
    width: u16,
    height: u16,
    pending: Grid,
    shown: Grid,
    shows: usize,
    syncs: usize,
    finalizes: usize,
    fail_show: Option<String>,
    panic_on_draw: bool,
}

/// Inspection handle for a [`MemoryBackend`]'s screen.
#[derive(Clone, Default)]
pub struct MemoryScreen {
    state: Arc<Mutex<ScreenState>>,
}

impl MemoryScreen {
    fn lock(&self) -> MutexGuard<'_, ScreenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Text of row `y` as last shown, trailing spaces included.
    pub fn row(&self, y: usize) -> String {
        self.lock()
            .shown
            .get(y)
            .map(|row| row.iter().map(|(c, _)| *c).collect())
            .unwrap_or_default()
    }

    pub fn rows(&self) -> Vec<String> {
        let height = self.lock().shown.len();
        (0..height).map(|y| self.row(y)).collect()
    }

    pub fn style_at(&self, x: usize, y: usize) -> Option<Style> {
        self.lock().shown.get(y)?.get(x).map(|(_, s)| *s)
    }

    /// Changes the reported size; the next frame is drawn at the new size.
    pub fn resize(&self, width: u16, height: u16) {
        let mut s = self.lock();
        s.width = width;
        s.height = height;
        s.pending = blank_grid(width, height);
        s.shown = blank_grid(width, height);
    }

    /// Makes every later `show` fail with `msg`.
    pub fn fail_show(&self, msg: &str) {
        self.lock().fail_show = Some(msg.to_string());
    }

    /// Makes every later `set_cell` panic.
    pub fn panic_on_draw(&self) {
        self.lock().panic_on_draw = true;
    }

    pub fn show_count(&self) -> usize {
        self.lock().shows
    }

    pub fn sync_count(&self) -> usize {
        self.lock().syncs
    }

    pub fn finalize_count(&self) -> usize {
        self.lock().finalizes
    }
}

pub struct MemoryBackend {
    screen: MemoryScreen,
}

impl MemoryBackend {
    pub fn new(width: u16, height: u16) -> (Self, MemoryScreen) {
        let screen = MemoryScreen::default();
        screen.resize(width, height);
        (
            Self {
                screen: screen.clone(),
            },
            screen,
        )
    }
}

impl TerminalBackend for MemoryBackend {
    fn size(&mut self) -> Result<(u16, u16)> {
        let s = self.screen.lock();
        Ok((s.width, s.height))
    }

    fn set_cell(&mut self, x: u16, y: u16, ch: char, style: Style) {
        let mut s = self.screen.lock();
        if s.panic_on_draw {
            drop(s);
            panic!("memory backend asked to panic while drawing");
        }
        if let Some(cell) = s
            .pending
            .get_mut(y as usize)
            .and_then(|row| row.get_mut(x as usize))
        {
            *cell = (ch, style);
        }
    }

    fn show(&mut self) -> Result<()> {
        let mut s = self.screen.lock();
        if let Some(msg) = s.fail_show.clone() {
            return Err(Error::render(msg));
        }
        s.shown = s.pending.clone();
        s.shows += 1;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.screen.lock().syncs += 1;
        self.show()
    }

    fn finalize(&mut self) -> Result<()> {
        self.screen.lock().finalizes += 1;
        Ok(())
    }
}

/// Events fed from a channel. Dropping every sender closes the source.
pub struct ChannelEvents {
    rx: Receiver<TermEvent>,
}

impl ChannelEvents {
    pub fn new() -> (Self, Sender<TermEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { rx }, tx)
    }
}

impl EventSource for ChannelEvents {
    fn next_event(&mut self, timeout: Duration) -> Polled {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => Polled::Event(ev),
            Err(RecvTimeoutError::Timeout) => Polled::Idle,
            Err(RecvTimeoutError::Disconnected) => Polled::Closed,
        }
    }
}
