use std::fmt::Display;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::DashboardConfig;
use crate::error::{Error, Result};
use crate::registry::{Ingest, JobRegistry, Transition};
use crate::render::{self, Drawn};
use crate::state::{self, DashboardState};
use crate::summary::{Summary, expected_log_path};
use crate::terminal::{
    EventSource, Polled, TermEvent, TerminalBackend, TerminalSession, open_crossterm,
};

struct Shared {
    state: Mutex<DashboardState>,
    session: TerminalSession,
}

/// Live view of concurrently running build jobs.
///
/// All methods take `&self` and may be called from any thread. A redraw thread
/// repaints every `redraw_interval_ms`, and an input thread repaints on resize
/// and runs the cancel listeners when the user presses Ctrl+C, Esc or Ctrl+D.
pub struct Dashboard {
    shared: Arc<Shared>,
    config: DashboardConfig,
    stop_redraw: Option<Sender<()>>,
    redraw: Option<JoinHandle<()>>,
    input: Option<JoinHandle<()>>,
}

impl Dashboard {
    /// Takes over the process terminal.
    pub fn open(config: DashboardConfig) -> Result<Self> {
        let (backend, events) = open_crossterm()?;
        Self::open_with(Box::new(backend), Box::new(events), config)
    }

    pub fn open_with(
        backend: Box<dyn TerminalBackend>,
        events: Box<dyn EventSource>,
        config: DashboardConfig,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(DashboardState::new(JobRegistry::new(config.log_lines))),
            session: TerminalSession::new(backend),
        });
        let mut dashboard = Self {
            shared,
            config,
            stop_redraw: None,
            redraw: None,
            input: None,
        };

        let (stop_tx, stop_rx) = mpsc::channel();
        let shared = Arc::clone(&dashboard.shared);
        let interval = dashboard.config.redraw_interval();
        dashboard.redraw = Some(spawn("dashboard-redraw", move || {
            redraw_loop(&shared, &stop_rx, interval)
        })?);
        dashboard.stop_redraw = Some(stop_tx);

        let shared = Arc::clone(&dashboard.shared);
        let poll = dashboard.config.input_poll();
        dashboard.input = Some(spawn("dashboard-input", move || {
            input_loop(&shared, events, poll)
        })?);

        tracing::debug!(
            interval_ms = dashboard.config.redraw_interval_ms,
            "dashboard opened"
        );
        Ok(dashboard)
    }

    /// Registers a job, replacing any job already using `key`.
    pub fn start_job(&self, key: &str, label: &str) {
        let replaced = state::lock(&self.shared.state).registry.start(key, label);
        if replaced {
            tracing::warn!(key, "job started twice; previous state discarded");
        }
    }

    /// Adds one line of output to `key`'s recent log.
    ///
    /// # Panics
    ///
    /// Panics if `key` was never passed to [`Dashboard::start_job`].
    pub fn append_log(&self, key: &str, line: &str) {
        let ingest = state::lock(&self.shared.state).registry.append_log(key, line);
        if ingest == Ingest::UnknownJob {
            panic!("log line for unknown job '{key}'");
        }
    }

    pub fn mark_pushing(&self, key: &str) {
        if !state::lock(&self.shared.state).registry.mark_pushing(key) {
            tracing::debug!(key, "mark_pushing for unknown job ignored");
        }
    }

    pub fn mark_succeeded(&self, key: &str) {
        let outcome = state::lock(&self.shared.state).registry.mark_succeeded(key);
        report_transition(key, "succeeded", outcome);
    }

    pub fn mark_failed(&self, key: &str, err: impl Display) {
        let message = err.to_string();
        let outcome = state::lock(&self.shared.state)
            .registry
            .mark_failed(key, &message);
        report_transition(key, "failed", outcome);
    }

    /// Runs `listener` on the input thread when the user cancels.
    ///
    /// Listeners must return promptly: `close` waits for the input thread. A
    /// listener registered after cancellation runs immediately on the caller's thread.
    pub fn register_cancel_listener(&self, listener: impl FnOnce() + Send + 'static) {
        let mut state = state::lock(&self.shared.state);
        if state.cancelled() {
            drop(state);
            listener();
            return;
        }
        state.add_listener(Box::new(listener));
    }

    pub fn cancelled(&self) -> bool {
        state::lock(&self.shared.state).cancelled()
    }

    pub fn expected_log_path(&self, key: &str) -> PathBuf {
        expected_log_path(&self.config.logs_dir(), key)
    }

    /// Stops both threads, restores the terminal and prints the summary to stdout.
    ///
    /// Returns the printed summary, or `None` when the user cancelled. A render
    /// failure recorded while the dashboard was up is returned as the error.
    pub fn close(self) -> Result<Option<Summary>> {
        // The backend draws through stdout, so stdout is only locked once both
        // threads have been joined.
        let summary = self.finish()?;
        if let Some(summary) = &summary {
            write_summary(&mut io::stdout().lock(), summary)?;
        }
        Ok(summary)
    }

    pub fn close_into(self, out: &mut dyn Write) -> Result<Option<Summary>> {
        let summary = self.finish()?;
        if let Some(summary) = &summary {
            write_summary(out, summary)?;
        }
        Ok(summary)
    }

    /// The fatal render failure, if one has happened.
    ///
    /// The terminal is already restored by the time this returns `Some`; callers
    /// should stop starting new work.
    pub fn failure(&self) -> Option<Error> {
        state::lock(&self.shared.state).failure().cloned()
    }

    fn finish(mut self) -> Result<Option<Summary>> {
        let teardown = self.shutdown();

        let state = state::lock(&self.shared.state);
        if let Some(err) = state.failure() {
            return Err(err.clone());
        }
        teardown?;
        if state.cancelled() {
            tracing::info!("dashboard cancelled; summary suppressed");
            return Ok(None);
        }
        let summary = Summary::from_registry(&state.registry);
        drop(state);

        if let Summary::Failed { keys } = &summary {
            for key in keys {
                let log = self.expected_log_path(key);
                tracing::info!(key = %key, log = %log.display(), "job did not succeed");
            }
        }
        Ok(Some(summary))
    }

    fn shutdown(&mut self) -> Result<()> {
        // Dropping the sender wakes the redraw thread out of its wait.
        drop(self.stop_redraw.take());
        if let Some(handle) = self.redraw.take()
            && handle.join().is_err()
        {
            tracing::warn!("redraw thread panicked");
        }
        let finalized = self.shared.session.finalize();
        if let Some(handle) = self.input.take()
            && handle.join().is_err()
        {
            tracing::warn!("input thread panicked");
        }
        finalized
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("dashboard teardown failed: {e}");
        }
    }
}

fn spawn(name: &str, f: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| Error::init(format!("failed to start {name} thread: {e}")))
}

fn write_summary(out: &mut dyn Write, summary: &Summary) -> Result<()> {
    write!(out, "{summary}")?;
    out.flush()?;
    Ok(())
}

fn report_transition(key: &str, wanted: &str, outcome: Transition) {
    match outcome {
        Transition::Applied => tracing::debug!(key, status = wanted, "job finished"),
        Transition::Rejected(current) => tracing::warn!(
            key,
            ?current,
            wanted,
            "job already finished; status change rejected"
        ),
        Transition::UnknownJob => tracing::debug!(key, "status change for unknown job ignored"),
    }
}

fn redraw_loop(shared: &Shared, stop: &Receiver<()>, interval: Duration) {
    loop {
        match render::render_frame(&shared.session, &shared.state) {
            Ok(Drawn::Finalized) | Err(_) => return,
            Ok(_) => {}
        }
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn input_loop(shared: &Shared, mut events: Box<dyn EventSource>, poll: Duration) {
    while !shared.session.is_finalized() {
        match events.next_event(poll) {
            Polled::Idle => {}
            Polled::Closed => return,
            Polled::Event(TermEvent::Resize { width, height }) => {
                tracing::debug!(width, height, "terminal resized");
                if render::render_frame(&shared.session, &shared.state).is_err()
                    || render::resync(&shared.session, &shared.state).is_err()
                {
                    return;
                }
            }
            Polled::Event(TermEvent::Key(key)) if key.is_interrupt() => {
                run_cancel(shared);
                return;
            }
            Polled::Event(TermEvent::Key(_)) => {}
        }
    }
}

fn run_cancel(shared: &Shared) {
    tracing::info!("dashboard cancelled by user");
    loop {
        // Listeners may register while earlier ones run; keep draining until
        // the flag is set with none left behind.
        let listeners = {
            let mut state = state::lock(&shared.state);
            let listeners = state.take_listeners();
            if listeners.is_empty() {
                state.set_cancelled();
                return;
            }
            listeners
        };
        tracing::debug!(count = listeners.len(), "running cancel listeners");
        for listener in listeners {
            listener();
        }
    }
}
