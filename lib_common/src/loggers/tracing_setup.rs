//! # Tracing Setup
//!
//! Installs the global `tracing` subscriber: an ANSI console layer for the
//! operator terminal and a JSON layer written to a daily rolling file.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes logging for the process.
///
/// `RUST_LOG` takes precedence over `log_level` when it is set. The returned
/// guard flushes the file writer on drop and must be held for the lifetime of
/// the program.
///
/// # Arguments
/// * `log_dir` - Directory receiving `<file_prefix>.YYYY-MM-DD` files. Created if missing.
/// * `file_prefix` - Base name of the rolling files.
/// * `log_level` - Fallback filter directive (e.g. "info", "station_sync=debug").
pub fn setup_logging(
    log_dir: &Path,
    file_prefix: &str,
    log_level: &str,
) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = rolling::daily(log_dir, file_prefix);
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_appender)
        .json();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    tracing::info!(level = log_level, dir = %log_dir.display(), "logging initialized");
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_log_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("logs");
        // A second init in the same test binary would fail; only the directory matters here.
        let _ = setup_logging(&dir, "station_monitor", "debug");
        assert!(dir.is_dir());
    }
}
