//! Console and daily-rolling file logging.
//!
//! Both binaries log through the same setup, each under its own file prefix
//! (`raster-batch.log.YYYY-MM-DD`, `raster-unit.log.YYYY-MM-DD`). Files older
//! than the retention window are removed when logging starts.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, Utc};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::utils::fs;
use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "raster_batch=info,process_utils=info";

/// Log retention period in days.
pub const LOG_RETENTION_DAYS: i64 = 7;

/// Timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Install the global subscriber: console plus `<log_dir>/<prefix>.log.<date>`.
///
/// `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`]. Keep the returned guard alive
/// until exit so the background file writer flushes.
pub fn init_logging(log_dir: &Path, prefix: &str) -> Result<WorkerGuard> {
    fs::ensure_dir_all_with_op("creating log directory", log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, format!("{prefix}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_thread_names(true)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to set global default subscriber: {e}")))?;

    if let Err(e) = cleanup_old_logs(log_dir, prefix, LOG_RETENTION_DAYS) {
        warn!(error = %e, "Failed to cleanup old logs");
    }

    Ok(guard)
}

/// Date stamp of a rolled log file named `<prefix>.log.YYYY-MM-DD`.
fn rolled_log_date(path: &Path, prefix: &str) -> Option<NaiveDate> {
    let stamp = path
        .file_name()?
        .to_str()?
        .strip_prefix(prefix)?
        .strip_prefix(".log.")?;
    NaiveDate::parse_from_str(stamp, "%Y-%m-%d").ok()
}

/// Delete rolled `prefix` logs dated more than `retention_days` ago.
///
/// Returns how many files were removed. Files that fail to delete are logged
/// and skipped.
pub fn cleanup_old_logs(
    log_dir: &Path,
    prefix: &str,
    retention_days: i64,
) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();

    let expired: Vec<PathBuf> = std::fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| rolled_log_date(path, prefix).is_some_and(|date| date < cutoff))
        .collect();

    let mut removed = 0;
    for path in &expired {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            continue;
        }
        debug!(path = %path.display(), "Deleted old log file");
        removed += 1;
    }

    if removed > 0 {
        info!(count = removed, retention_days, "Cleaned up old log files");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("raster_batch=info"));
    }

    #[test]
    fn test_cleanup_removes_only_expired_logs() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        let today = Local::now().format("%Y-%m-%d").to_string();

        std::fs::write(dir.join("raster-batch.log.2001-01-01"), "old").unwrap();
        std::fs::write(dir.join(format!("raster-batch.log.{today}")), "new").unwrap();
        std::fs::write(dir.join("raster-unit.log.2001-01-01"), "other prefix").unwrap();
        std::fs::write(dir.join("raster-batch.log.garbage"), "unparseable").unwrap();

        let removed = cleanup_old_logs(dir, "raster-batch", LOG_RETENTION_DAYS).unwrap();

        assert_eq!(removed, 1);
        assert!(!dir.join("raster-batch.log.2001-01-01").exists());
        assert!(dir.join(format!("raster-batch.log.{today}")).exists());
        assert!(dir.join("raster-unit.log.2001-01-01").exists());
        assert!(dir.join("raster-batch.log.garbage").exists());
    }
}
