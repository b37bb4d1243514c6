use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};

use gaia_dashboard::Result;
use gaia_dashboard::config::DashboardConfig;
use gaia_dashboard::runner::{self, RunOutcome};
use gaia_dashboard::Dashboard;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Write diagnostics to this file (or a timestamped file in this directory)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the shell commands listed in a jobs TOML under the dashboard
    Run {
        /// Path to a jobs TOML
        jobs: PathBuf,
        /// Max number of jobs to run concurrently (0 = use CPU count)
        #[arg(long, default_value_t = 0)]
        max_parallel: usize,
    },
    /// Show the dashboard with simulated jobs
    Demo {
        #[arg(long, default_value_t = 6)]
        jobs: usize,
        /// How many of the jobs fail
        #[arg(long, default_value_t = 1)]
        fail: usize,
        /// Delay between simulated log lines, in milliseconds
        #[arg(long, default_value_t = 300)]
        step_ms: u64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(target) = args.log_file.as_deref() {
        gaia_dashboard::logging::init(target)?;
    }

    let outcome = match args.cmd {
        Command::Run { jobs, max_parallel } => cmd_run(&jobs, max_parallel)?,
        Command::Demo {
            jobs,
            fail,
            step_ms,
        } => cmd_demo(jobs, fail, Duration::from_millis(step_ms))?,
    };

    if outcome.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_run(path: &Path, max_parallel: usize) -> Result<RunOutcome> {
    let file = gaia_dashboard::config::load(path)?;

    let max_parallel = if max_parallel == 0 {
        num_cpus::get().max(1)
    } else {
        max_parallel
    };

    let dashboard = Dashboard::open(file.dashboard)?;
    let outcome = runner::run_jobs(&dashboard, &file.jobs, max_parallel);
    dashboard.close()?;
    tracing::info!(?outcome, "run finished");
    Ok(outcome)
}

fn cmd_demo(jobs: usize, fail: usize, step: Duration) -> Result<RunOutcome> {
    let dashboard = Dashboard::open(DashboardConfig::default())?;
    let outcome = runner::run_demo(&dashboard, jobs, fail, step);
    dashboard.close()?;
    Ok(outcome)
}
