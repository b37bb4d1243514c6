use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use gaia_dashboard::Dashboard;
use gaia_dashboard::Result;
use gaia_dashboard::config::DashboardConfig;
use gaia_dashboard::terminal::{ChannelEvents, TerminalBackend};
use ratatui::style::Style;

/// Draws through the process stdout, like the crossterm backend does.
struct StdoutBackend {
    shows: Arc<AtomicUsize>,
}

impl TerminalBackend for StdoutBackend {
    fn size(&mut self) -> Result<(u16, u16)> {
        Ok((20, 4))
    }

    fn set_cell(&mut self, _x: u16, _y: u16, _ch: char, _style: Style) {}

    fn show(&mut self) -> Result<()> {
        self.shows.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(200));
        let mut out = io::stdout().lock();
        out.write_all(b"")?;
        out.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.show()
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

#[test]
fn close_while_a_frame_is_being_flushed() {
    let shows = Arc::new(AtomicUsize::new(0));
    let backend = StdoutBackend {
        shows: Arc::clone(&shows),
    };
    let (events, _tx) = ChannelEvents::new();
    let cfg = DashboardConfig {
        redraw_interval_ms: 10,
        input_poll_ms: 10,
        ..DashboardConfig::default()
    };
    let dashboard = Dashboard::open_with(Box::new(backend), Box::new(events), cfg).unwrap();
    dashboard.start_job("api", "img/api");
    dashboard.mark_succeeded("api");
    dashboard.start_job("web", "img/web");

    let deadline = Instant::now() + Duration::from_secs(5);
    while shows.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "redraw thread never drew");
        thread::sleep(Duration::from_millis(5));
    }

    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = done_tx.send(dashboard.close().map(|s| s.is_some()));
    });
    match done_rx.recv_timeout(Duration::from_secs(5)) {
        Ok(result) => assert!(result.unwrap()),
        Err(_) => {
            // The harness reports through stdout too; exit rather than hang it.
            eprintln!("close() did not return while the redraw thread held a frame");
            std::process::exit(101);
        }
    }
}
