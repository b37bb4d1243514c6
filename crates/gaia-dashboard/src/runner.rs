//! Drives the dashboard from shell commands so it can be exercised by hand.

use std::collections::{BTreeSet, VecDeque};
use std::io::{BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;
use std::time::Duration;

use crate::config::JobSpec;
use crate::dashboard::Dashboard;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub succeeded: usize,
    pub failed: usize,
    /// Jobs never started because the user cancelled first.
    pub skipped: usize,
}

#[derive(Default)]
struct Children {
    cancel: AtomicBool,
    // Process group ids of running commands.
    pgroups: Mutex<BTreeSet<u32>>,
}

impl Children {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn cancel_all(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        let pgids: Vec<u32> = self
            .pgroups
            .lock()
            .map(|g| g.iter().copied().collect())
            .unwrap_or_default();
        for pgid in pgids {
            kill_pgroup(pgid);
        }
    }

    /// Records a running group. Returns false when a cancel has already been
    /// issued, in which case `cancel_all` may have missed this group.
    fn track(&self, pgid: u32) -> bool {
        let mut g = self.pgroups.lock().unwrap_or_else(PoisonError::into_inner);
        g.insert(pgid);
        // Checked under the lock: a cancel that copied the set before this
        // insert has already stored the flag.
        !self.cancel.load(Ordering::SeqCst)
    }

    fn untrack(&self, pgid: u32) {
        if let Ok(mut g) = self.pgroups.lock() {
            g.remove(&pgid);
        }
    }
}

/// Runs `jobs` with at most `max_parallel` at a time, reporting into `dashboard`.
///
/// Cancelling from the dashboard terminates running commands and leaves queued
/// jobs unstarted. Queued jobs are also left unstarted once the dashboard has
/// failed to draw, since nothing would show their progress.
pub fn run_jobs(dashboard: &Dashboard, jobs: &[JobSpec], max_parallel: usize) -> RunOutcome {
    let children = Arc::new(Children::default());
    {
        let children = Arc::clone(&children);
        dashboard.register_cancel_listener(move || children.cancel_all());
    }

    let queue = Mutex::new(jobs.iter().collect::<VecDeque<_>>());
    let outcome = Mutex::new(RunOutcome::default());
    let workers = max_parallel.clamp(1, jobs.len().max(1));

    thread::scope(|s| {
        for _ in 0..workers {
            s.spawn(|| {
                loop {
                    let Some(job) = queue.lock().ok().and_then(|mut q| q.pop_front()) else {
                        return;
                    };
                    if children.cancelled() || dashboard.failure().is_some() {
                        if let Ok(mut o) = outcome.lock() {
                            o.skipped += 1;
                        }
                        continue;
                    }
                    let ok = run_job(dashboard, job, &children);
                    if let Ok(mut o) = outcome.lock() {
                        if ok {
                            o.succeeded += 1;
                        } else {
                            o.failed += 1;
                        }
                    }
                }
            });
        }
    });

    outcome.into_inner().unwrap_or_default()
}

fn run_job(dashboard: &Dashboard, job: &JobSpec, children: &Children) -> bool {
    let key = job.key.as_str();
    dashboard.start_job(key, job.label());
    tracing::debug!(key, "job started");

    let mut result = run_shell(dashboard, key, &job.command, children);
    if result.is_ok()
        && let Some(push) = job.push.as_deref()
    {
        dashboard.mark_pushing(key);
        result = run_shell(dashboard, key, push, children);
    }

    match result {
        Ok(()) => {
            dashboard.mark_succeeded(key);
            true
        }
        Err(e) => {
            dashboard.mark_failed(key, &e);
            false
        }
    }
}

fn run_shell(dashboard: &Dashboard, key: &str, script: &str, children: &Children) -> Result<()> {
    if children.cancelled() {
        return Err(Error::msg("cancelled"));
    }
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);

    // Own process group, so cancelling reaches everything the script started.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::msg(format!("spawn failed: {e}")))?;
    let pgid = child.id();
    if !children.track(pgid) {
        kill_pgroup(pgid);
    }

    let (tx, rx) = mpsc::channel::<String>();
    if let Some(out) = child.stdout.take() {
        let tx = tx.clone();
        thread::spawn(move || read_lines(out, tx));
    }
    if let Some(err) = child.stderr.take() {
        let tx = tx.clone();
        thread::spawn(move || read_lines(err, tx));
    }
    drop(tx);

    for line in rx {
        dashboard.append_log(key, &line);
    }

    let status = child.wait();
    children.untrack(pgid);
    let status = status.map_err(|e| Error::msg(format!("wait failed: {e}")))?;
    if children.cancelled() {
        return Err(Error::msg("cancelled"));
    }
    if !status.success() {
        return Err(Error::msg(format!("command failed: {status}")));
    }
    Ok(())
}

fn read_lines<R: Read>(reader: R, tx: mpsc::Sender<String>) {
    const MAX_PENDING_BYTES: usize = 16 * 1024;
    let mut r = BufReader::new(reader);
    let mut buf = [0u8; 8192];
    let mut pending = Vec::with_capacity(256);

    let flush = |pending: &mut Vec<u8>| {
        if !pending.is_empty() {
            let _ = tx.send(String::from_utf8_lossy(pending).into_owned());
            pending.clear();
        }
    };
    loop {
        let n = match r.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &b in &buf[..n] {
            if b == b'\n' || b == b'\r' {
                flush(&mut pending);
            } else {
                pending.push(b);
                if pending.len() >= MAX_PENDING_BYTES {
                    flush(&mut pending);
                }
            }
        }
    }
    flush(&mut pending);
}

fn kill_pgroup(pgid: u32) {
    #[cfg(unix)]
    {
        // Negative pid addresses the whole group.
        let _ = unsafe { libc::kill(-(pgid as i32), libc::SIGTERM) };
    }
    #[cfg(not(unix))]
    {
        let _ = pgid;
    }
}

/// Simulated jobs for trying the dashboard without real builds.
///
/// The first `fail` jobs fail part way through; the rest push and succeed.
/// Jobs interrupted by a cancel count as failed.
pub fn run_demo(dashboard: &Dashboard, jobs: usize, fail: usize, step: Duration) -> RunOutcome {
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        dashboard.register_cancel_listener(move || cancel.store(true, Ordering::Relaxed));
    }

    let outcome = Mutex::new(RunOutcome::default());
    thread::scope(|s| {
        for i in 0..jobs {
            let cancel = &cancel;
            let outcome = &outcome;
            s.spawn(move || {
                let key = format!("service-{i:02}");
                dashboard.start_job(&key, &format!("registry.local/{key}:dev"));
                let steps = 8 + (i * 5) % 13;
                for n in 1..=steps {
                    if cancel.load(Ordering::Relaxed) {
                        dashboard.mark_failed(&key, "cancelled");
                        if let Ok(mut o) = outcome.lock() {
                            o.failed += 1;
                        }
                        return;
                    }
                    dashboard.append_log(&key, &format!("Step {n}/{steps} : RUN make layer-{n}"));
                    thread::sleep(step);
                    if i < fail && n == steps / 2 {
                        dashboard.mark_failed(&key, "make: *** [layer] Error 2");
                        if let Ok(mut o) = outcome.lock() {
                            o.failed += 1;
                        }
                        return;
                    }
                }
                dashboard.mark_pushing(&key);
                dashboard.append_log(&key, "pushing layers");
                thread::sleep(step * 3);
                let cancelled = cancel.load(Ordering::Relaxed);
                if cancelled {
                    dashboard.mark_failed(&key, "cancelled");
                } else {
                    dashboard.mark_succeeded(&key);
                }
                if let Ok(mut o) = outcome.lock() {
                    if cancelled {
                        o.failed += 1;
                    } else {
                        o.succeeded += 1;
                    }
                }
            });
        }
    });
    outcome.into_inner().unwrap_or_default()
}
