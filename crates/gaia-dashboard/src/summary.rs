use std::fmt;
use std::path::{Path, PathBuf};

use crate::registry::{JobRegistry, JobStatus};

/// The single line printed when the dashboard closes without being cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Summary {
    /// Keys of every job that did not succeed, unfinished jobs included.
    Failed { keys: Vec<String> },
    Succeeded { labels: Vec<String> },
}

impl Summary {
    pub fn from_registry(registry: &JobRegistry) -> Self {
        let keys = registry
            .iter()
            .filter(|job| job.status() != JobStatus::Succeeded)
            .map(|job| job.key().to_string())
            .collect::<Vec<_>>();
        if !keys.is_empty() {
            return Summary::Failed { keys };
        }
        Summary::Succeeded {
            labels: registry.iter().map(|job| job.label().to_string()).collect(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Summary::Succeeded { .. })
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Summary::Failed { keys } => write!(
                f,
                "Failed to build the following jobs: {}\nSee the logs folder for details.\n",
                keys.join(", ")
            ),
            Summary::Succeeded { labels } => {
                writeln!(f, "Successfully built: {}", labels.join(" "))
            }
        }
    }
}

/// Where the log writer is expected to have put `key`'s full output.
pub fn expected_log_path(logs_dir: &Path, key: &str) -> PathBuf {
    logs_dir.join(format!("{key}.log"))
}
