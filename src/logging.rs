//! Log output for the updater.
//!
//! Console output goes to stderr. When enabled, records are also written to
//! daily files `updater.log.YYYY-MM-DD` in the logs directory, which is pruned
//! of files older than [`MAX_LOG_AGE_DAYS`] or beyond [`MAX_LOG_FILES`] each
//! time logging starts.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;
use crate::error::{Result, UpdateError};

/// Maximum age (in days) of log files to keep.
pub const MAX_LOG_AGE_DAYS: u64 = 7;

/// Maximum number of log files to keep.
pub const MAX_LOG_FILES: usize = 10;

/// Prefix of log file names.
pub const LOG_FILE_PREFIX: &str = "updater.log";

/// Directory log files are written to.
pub fn log_dir(config: &LoggingConfig) -> PathBuf {
    config
        .directory
        .clone()
        .unwrap_or_else(crate::gaello_dirs::logs_dir)
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.filter`. Keep the returned guard
/// alive for as long as file output should be flushed.
///
/// # Errors
///
/// Returns [`UpdateError::Config`] if a global subscriber is already set, or
/// an I/O error if the log directory cannot be created.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let (file_layer, guard) = if config.file {
        let dir = log_dir(config);
        fs::create_dir_all(&dir)?;
        prune_old_logs(&dir);
        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| UpdateError::Config(format!("cannot initialise logging: {e}")))?;

    Ok(guard)
}

/// Remove log files older than [`MAX_LOG_AGE_DAYS`] or beyond [`MAX_LOG_FILES`].
fn prune_old_logs(log_dir: &Path) {
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(MAX_LOG_AGE_DAYS * 86_400))
        .unwrap_or(UNIX_EPOCH);
    prune_old_logs_with_cutoff(log_dir, cutoff, MAX_LOG_FILES);
}

fn prune_old_logs_with_cutoff(log_dir: &Path, cutoff: SystemTime, max_files: usize) {
    let mut entries: Vec<(PathBuf, SystemTime)> = match fs::read_dir(log_dir) {
        Ok(dir) => dir
            .flatten()
            .filter_map(|e| {
                let path = e.path();
                let name = path.file_name()?.to_str()?;
                if !name.starts_with(LOG_FILE_PREFIX) {
                    return None;
                }
                let mtime = path.metadata().ok()?.modified().ok()?;
                Some((path, mtime))
            })
            .collect(),
        Err(_) => return,
    };

    // Newest first.
    entries.sort_by(|a, b| b.1.cmp(&a.1));

    for (i, (path, mtime)) in entries.iter().enumerate() {
        if *mtime < cutoff || i >= max_files {
            let _ = fs::remove_file(path);
        }
    }
}
