use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

pub const LOG_ENV: &str = "GAIA_DASH_LOG";

/// Sends diagnostics to a file; the terminal belongs to the dashboard.
///
/// `target` may name a file or an existing directory, in which case a
/// timestamped file is created inside it. The level comes from `GAIA_DASH_LOG`
/// and defaults to `info`. Returns the path written to.
pub fn init(target: &Path) -> Result<PathBuf> {
    let path = if target.is_dir() {
        target.join(format!(
            "gaia-dash-{}.log",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        ))
    } else {
        target.to_path_buf()
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(&path)
        .map_err(|e| Error::msg(format!("failed to create log file {}: {e}", path.display())))?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_thread_names(true)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| Error::msg(format!("logging already initialized: {e}")))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    // The subscriber is process-global, so this is the only test that installs it.
    #[test]
    fn directory_target_gets_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = init(dir.path()).unwrap();

        assert_eq!(path.parent(), Some(dir.path()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("gaia-dash-"), "{name}");
        assert!(name.ends_with(".log"), "{name}");
        // gaia-dash-YYYYmmdd-HHMMSS.log
        assert_eq!(name.len(), "gaia-dash-".len() + 15 + ".log".len());

        tracing::info!("logging smoke line");
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("logging smoke line"), "{written}");

        assert!(init(dir.path()).is_err());
    }
}
