#![cfg(unix)]

use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use gaia_dashboard::Dashboard;
use gaia_dashboard::config::{self, DashboardConfig};
use gaia_dashboard::runner::{RunOutcome, run_demo, run_jobs};
use gaia_dashboard::terminal::{ChannelEvents, Key, MemoryBackend, MemoryScreen, TermEvent};

fn open() -> (Dashboard, MemoryScreen, Sender<TermEvent>) {
    let (backend, screen) = MemoryBackend::new(80, 24);
    let (events, tx) = ChannelEvents::new();
    let cfg = DashboardConfig {
        redraw_interval_ms: 10,
        input_poll_ms: 10,
        ..DashboardConfig::default()
    };
    let dashboard =
        Dashboard::open_with(Box::new(backend), Box::new(events), cfg).expect("open dashboard");
    (dashboard, screen, tx)
}

#[test]
fn commands_report_output_and_status() {
    let file = config::parse(
        r#"
[[jobs]]
key = "api"
label = "registry.local/api:dev"
command = "echo building api; echo warn >&2"
push = "echo pushed"

[[jobs]]
key = "broken"
command = "echo compiling; exit 3"
"#,
    )
    .unwrap();

    let (dashboard, screen, _tx) = open();
    let outcome = run_jobs(&dashboard, &file.jobs, 2);
    assert_eq!(
        outcome,
        RunOutcome {
            succeeded: 1,
            failed: 1,
            skipped: 0
        }
    );

    // The failed job stays on screen with its error line.
    let deadline = Instant::now() + Duration::from_secs(5);
    while !screen.row(0).starts_with("[failed] broken") {
        assert!(Instant::now() < deadline, "failed job never drawn");
        thread::sleep(Duration::from_millis(5));
    }
    let rows = screen.rows();
    assert_eq!(rows[1].trim_end(), "compiling");
    assert!(
        rows[2].starts_with("Error! command failed: exit status: 3"),
        "{}",
        rows[2]
    );

    let mut out = Vec::new();
    dashboard.close_into(&mut out).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "Failed to build the following jobs: broken\nSee the logs folder for details.\n"
    );
}

#[test]
fn cancel_stops_running_and_queued_jobs() {
    let file = config::parse(
        r#"
[[jobs]]
key = "slow"
command = "echo started; sleep 30"

[[jobs]]
key = "queued"
command = "echo never"
"#,
    )
    .unwrap();

    let (dashboard, _screen, tx) = open();
    let started = Instant::now();
    let outcome = thread::scope(|s| {
        let runner = s.spawn(|| run_jobs(&dashboard, &file.jobs, 1));
        thread::sleep(Duration::from_millis(200));
        tx.send(TermEvent::Key(Key::Interrupt)).unwrap();
        runner.join().unwrap()
    });

    assert!(started.elapsed() < Duration::from_secs(20));
    assert_eq!(outcome.succeeded, 0);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.skipped, 1);
    assert!(dashboard.cancelled());

    let mut out = Vec::new();
    assert!(dashboard.close_into(&mut out).unwrap().is_none());
    assert!(out.is_empty());
}

#[test]
fn cancelled_demo_jobs_count_as_failed() {
    let (dashboard, _screen, tx) = open();
    let outcome = thread::scope(|s| {
        let runner = s.spawn(|| run_demo(&dashboard, 2, 0, Duration::from_millis(50)));
        thread::sleep(Duration::from_millis(100));
        tx.send(TermEvent::Key(Key::Interrupt)).unwrap();
        runner.join().unwrap()
    });
    assert_eq!(
        outcome,
        RunOutcome {
            succeeded: 0,
            failed: 2,
            skipped: 0
        }
    );
}

#[test]
fn queued_jobs_are_skipped_after_render_failure() {
    let file = config::parse(
        r#"
[[jobs]]
key = "api"
command = "echo api"

[[jobs]]
key = "web"
command = "echo web"
"#,
    )
    .unwrap();

    let (dashboard, screen, _tx) = open();
    screen.fail_show("tty closed");
    dashboard.start_job("warmup", "warmup");
    let deadline = Instant::now() + Duration::from_secs(5);
    while dashboard.failure().is_none() {
        assert!(Instant::now() < deadline, "render failure never recorded");
        thread::sleep(Duration::from_millis(5));
    }

    let outcome = run_jobs(&dashboard, &file.jobs, 1);
    assert_eq!(outcome.skipped, 2);
    assert_eq!(outcome.succeeded + outcome.failed, 0);
    assert!(dashboard.close_into(&mut Vec::new()).is_err());
}
