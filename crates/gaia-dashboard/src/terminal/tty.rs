use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;

use super::{EventSource, Key, Polled, TermEvent, TerminalBackend};
use crate::error::{Error, Result};

type Teardown = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// Dashboard frames drawn through a ratatui `Terminal`.
///
/// Cells land in a private buffer; `show` copies that buffer into a ratatui
/// frame so ratatui only sends the cells that changed.
pub struct RatatuiBackend<B: Backend> {
    terminal: Terminal<B>,
    frame: Buffer,
    teardown: Option<Teardown>,
}

impl<B: Backend> RatatuiBackend<B> {
    pub fn new(backend: B) -> Result<Self> {
        let terminal = Terminal::new(backend).map_err(|e| Error::init(e.to_string()))?;
        Ok(Self {
            terminal,
            frame: Buffer::empty(Rect::default()),
            teardown: None,
        })
    }

    /// Runs `f` after the cursor is restored during `finalize`.
    pub fn on_finalize(mut self, f: impl FnOnce() -> io::Result<()> + Send + 'static) -> Self {
        self.teardown = Some(Box::new(f));
        self
    }

    pub fn terminal(&self) -> &Terminal<B> {
        &self.terminal
    }
}

impl<B: Backend + Send> TerminalBackend for RatatuiBackend<B> {
    fn size(&mut self) -> Result<(u16, u16)> {
        let size = self
            .terminal
            .size()
            .map_err(|e| Error::render(format!("terminal size query failed: {e}")))?;
        let area = Rect::new(0, 0, size.width, size.height);
        if self.frame.area != area {
            self.frame = Buffer::empty(area);
        }
        Ok((size.width, size.height))
    }

    fn set_cell(&mut self, x: u16, y: u16, ch: char, style: Style) {
        if let Some(cell) = self.frame.cell_mut((x, y)) {
            cell.set_char(ch).set_style(style);
        }
    }

    fn show(&mut self) -> Result<()> {
        let frame = &self.frame;
        self.terminal
            .draw(|f| {
                let area = f.area().intersection(frame.area);
                let buf = f.buffer_mut();
                for y in area.top()..area.bottom() {
                    for x in area.left()..area.right() {
                        buf[(x, y)] = frame[(x, y)].clone();
                    }
                }
            })
            .map_err(|e| Error::render(format!("frame flush failed: {e}")))?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.terminal
            .clear()
            .map_err(|e| Error::render(format!("terminal clear failed: {e}")))?;
        self.show()
    }

    fn finalize(&mut self) -> Result<()> {
        let cursor = self
            .terminal
            .show_cursor()
            .map_err(|e| Error::render(format!("cursor restore failed: {e}")));
        if let Some(teardown) = self.teardown.take() {
            teardown()?;
        }
        cursor
    }
}

/// Puts stdout into raw mode on the alternate screen.
///
/// On failure everything that was already switched on is switched back off.
pub fn open_crossterm() -> Result<(RatatuiBackend<CrosstermBackend<Stdout>>, CrosstermEvents)> {
    enable_raw_mode().map_err(|e| Error::init(format!("raw mode unavailable: {e}")))?;
    let mut stdout = io::stdout();
    if let Err(e) = execute!(stdout, EnterAlternateScreen, Hide) {
        disable_raw_mode().ok();
        return Err(Error::init(format!("alternate screen unavailable: {e}")));
    }

    let mut backend = match RatatuiBackend::new(CrosstermBackend::new(stdout)) {
        Ok(b) => b.on_finalize(restore_stdout),
        Err(e) => {
            restore_stdout().ok();
            return Err(e);
        }
    };
    if let Err(e) = backend.terminal.clear() {
        backend.finalize().ok();
        return Err(Error::init(format!("terminal clear failed: {e}")));
    }
    Ok((backend, CrosstermEvents))
}

fn restore_stdout() -> io::Result<()> {
    let raw = disable_raw_mode();
    execute!(io::stdout(), LeaveAlternateScreen, Show)?;
    raw
}

/// Keyboard and resize events read from the process terminal.
pub struct CrosstermEvents;

impl EventSource for CrosstermEvents {
    fn next_event(&mut self, timeout: Duration) -> Polled {
        match event::poll(timeout) {
            Ok(false) => return Polled::Idle,
            Ok(true) => {}
            Err(_) => return Polled::Closed,
        }
        match event::read() {
            Ok(Event::Resize(width, height)) => Polled::Event(TermEvent::Resize { width, height }),
            Ok(Event::Key(k)) if k.kind == KeyEventKind::Press => {
                Polled::Event(TermEvent::Key(map_key(k)))
            }
            Ok(_) => Polled::Idle,
            Err(_) => Polled::Closed,
        }
    }
}

fn map_key(k: KeyEvent) -> Key {
    let ctrl = k.modifiers.contains(KeyModifiers::CONTROL);
    match k.code {
        KeyCode::Char('c') if ctrl => Key::Interrupt,
        KeyCode::Char('d') if ctrl => Key::Exit,
        KeyCode::Esc => Key::Escape,
        KeyCode::Char(c) => Key::Char(c),
        _ => Key::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use ratatui::style::Color;

    #[test]
    fn shown_cells_reach_the_ratatui_buffer() {
        let mut backend = RatatuiBackend::new(TestBackend::new(6, 2)).unwrap();
        assert_eq!(backend.size().unwrap(), (6, 2));
        let red = Style::default().fg(Color::Rgb(190, 0, 0));
        for (x, ch) in "ok".chars().enumerate() {
            backend.set_cell(x as u16, 1, ch, red);
        }
        // Out of range writes are dropped.
        backend.set_cell(40, 40, 'x', red);
        backend.show().unwrap();

        let buf = backend.terminal().backend().buffer();
        assert_eq!(buf[(0, 1)].symbol(), "o");
        assert_eq!(buf[(1, 1)].symbol(), "k");
        assert_eq!(buf[(0, 1)].fg, Color::Rgb(190, 0, 0));
        assert_eq!(buf[(0, 0)].symbol(), " ");
    }

    #[test]
    fn sync_repaints_current_frame() {
        let mut backend = RatatuiBackend::new(TestBackend::new(3, 1)).unwrap();
        backend.size().unwrap();
        backend.set_cell(0, 0, 'z', Style::default());
        backend.sync().unwrap();
        assert_eq!(backend.terminal().backend().buffer()[(0, 0)].symbol(), "z");
    }

    #[test]
    fn ctrl_keys_map_to_cancel_keys() {
        let ctrl = |c| KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL);
        assert_eq!(map_key(ctrl('c')), Key::Interrupt);
        assert_eq!(map_key(ctrl('d')), Key::Exit);
        assert_eq!(map_key(KeyEvent::from(KeyCode::Esc)), Key::Escape);
        assert_eq!(map_key(KeyEvent::from(KeyCode::Char('c'))), Key::Char('c'));
        assert_eq!(map_key(KeyEvent::from(KeyCode::Enter)), Key::Other);
    }
}
