use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::registry::DEFAULT_LOG_LINES;

fn default_redraw_interval_ms() -> u64 {
    150
}

fn default_input_poll_ms() -> u64 {
    100
}

fn default_log_lines() -> usize {
    DEFAULT_LOG_LINES
}

fn default_logs_dir() -> String {
    "logs".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    #[serde(default = "default_redraw_interval_ms")]
    pub redraw_interval_ms: u64,
    // Upper bound on how long close() waits for the input thread to notice shutdown.
    #[serde(default = "default_input_poll_ms")]
    pub input_poll_ms: u64,
    /// Lines kept per job.
    #[serde(default = "default_log_lines")]
    pub log_lines: usize,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            redraw_interval_ms: default_redraw_interval_ms(),
            input_poll_ms: default_input_poll_ms(),
            log_lines: default_log_lines(),
            logs_dir: default_logs_dir(),
        }
    }
}

impl DashboardConfig {
    pub fn redraw_interval(&self) -> Duration {
        Duration::from_millis(self.redraw_interval_ms.max(1))
    }

    pub fn input_poll(&self) -> Duration {
        Duration::from_millis(self.input_poll_ms.max(1))
    }

    pub fn logs_dir(&self) -> PathBuf {
        PathBuf::from(&self.logs_dir)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    pub key: String,
    /// Shown in headers and the success summary; defaults to the key.
    #[serde(default)]
    pub label: Option<String>,
    pub command: String,
    /// Runs after `command` succeeds, with the job shown as pushing.
    #[serde(default)]
    pub push: Option<String>,
}

impl JobSpec {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobsFile {
    pub dashboard: DashboardConfig,
    pub jobs: Vec<JobSpec>,
}

pub fn load(path: &Path) -> Result<JobsFile> {
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
    parse(&raw).map_err(|e| Error::config(format!("{}: {e}", path.display())))
}

pub fn parse(raw: &str) -> Result<JobsFile> {
    let file: JobsFile = toml::from_str(raw)?;
    validate(&file)?;
    Ok(file)
}

fn validate(file: &JobsFile) -> Result<()> {
    let mut seen = BTreeSet::new();
    for job in &file.jobs {
        let key = job.key.trim();
        if key.is_empty() {
            return Err(Error::config("job with empty key"));
        }
        if !seen.insert(key) {
            return Err(Error::config(format!("duplicate job key '{key}'")));
        }
        if job.command.trim().is_empty() {
            return Err(Error::config(format!("job '{key}' has an empty command")));
        }
        if job.push.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(Error::config(format!("job '{key}' has an empty push command")));
        }
    }
    Ok(())
}
