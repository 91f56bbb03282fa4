use anyhow::{Context, Result};
use lib_common::loggers::{setup_logging as init_tracing, WorkerGuard};
use std::fs;
use std::path::Path;

const LOG_FILE_PREFIX: &str = "station_monitor";

/// Rolling files kept besides the one being written today.
const KEEP_LOG_FILES: usize = 7;

pub fn setup_logging(log_dir: &Path, log_level: &str) -> Result<WorkerGuard> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    }

    cleanup_old_logs(log_dir, KEEP_LOG_FILES)?;

    init_tracing(log_dir, LOG_FILE_PREFIX, log_level).context("initializing logging")
}

/// Deletes all but the `keep` newest rolling files of this binary.
fn cleanup_old_logs(log_dir: &Path, keep: usize) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX))
        .filter_map(|e| {
            let modified = e.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, e.path()))
        })
        .collect();

    // Newest first
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, path) in entries.iter().skip(keep) {
        if let Err(e) = fs::remove_file(path) {
            eprintln!("Failed to delete old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn keeps_only_newest_files() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        for day in 0..5u64 {
            let path = dir.path().join(format!("{}.2026-01-0{}", LOG_FILE_PREFIX, day + 1));
            let file = fs::File::create(&path).unwrap();
            file.set_modified(now - Duration::from_secs(86_400 * (5 - day))).unwrap();
        }
        fs::write(dir.path().join("other.log"), "keep me").unwrap();

        cleanup_old_logs(dir.path(), 2).unwrap();

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                "other.log".to_string(),
                format!("{}.2026-01-04", LOG_FILE_PREFIX),
                format!("{}.2026-01-05", LOG_FILE_PREFIX),
            ]
        );
    }
}
