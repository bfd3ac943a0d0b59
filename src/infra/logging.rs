use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "NIXAI_TUI_LOG";

#[derive(Debug, Error)]
pub enum InitLoggingError {
    #[error("failed to open log file {}: {source}", .path.display())]
    OpenLogFile {
        path: std::path::PathBuf,
        source: io::Error,
    },
}

/// Installs the global subscriber. The terminal belongs to the UI, so logs
/// go to `log_file` when one is given and are discarded otherwise.
pub fn init_logging(log_file: Option<&Path>) -> Result<(), InitLoggingError> {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| InitLoggingError::OpenLogFile {
                    path: path.to_path_buf(),
                    source,
                })?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
        }
    }

    Ok(())
}
