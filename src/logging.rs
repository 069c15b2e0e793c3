//! Logging configuration for the Athena datasource.
//!
//! Logs go to stderr by default because stdout carries the JSON response.
//! A log file can be requested instead, e.g. when the runner is driven by a
//! host that captures stderr.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes logging to stderr.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Initializes logging to `path`, falling back to stderr if the file cannot
/// be created.
pub fn init_file_logging(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging();
            return;
        }
    }

    let log_file = match File::create(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file: {e}");
            init_stderr_logging();
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .init();
}

/// Returns the default log file path.
///
/// Uses the XDG state directory on Linux
/// (`~/.local/state/athena-datasource/athena-datasource.log`), or falls back
/// to the config directory on other platforms.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir
            .join("athena-datasource")
            .join("athena-datasource.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir
            .join("athena-datasource")
            .join("athena-datasource.log");
    }

    std::env::temp_dir().join("athena-datasource.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path_is_absolute() {
        assert!(default_log_path().is_absolute());
    }

    #[test]
    fn test_log_path_file_name() {
        assert!(default_log_path().ends_with("athena-datasource.log"));
    }
}
