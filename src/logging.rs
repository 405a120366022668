//! File-based logging for device-side callers.
//!
//! Logs go to timestamped files under `<root>/logs/`, with old files
//! swept on init according to a retention period.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Default log retention in hours.
pub const DEFAULT_LOG_RETENTION_HOURS: u32 = 72;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error) or "off".
    pub level: String,
    /// Log retention period in hours.
    pub retention_hours: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            retention_hours: DEFAULT_LOG_RETENTION_HOURS,
        }
    }
}

/// Returns the log directory under the given registry root.
#[must_use]
pub fn log_directory(root: &Path) -> PathBuf {
    root.join("logs")
}

/// Deletes log files in `log_dir` older than `retention_hours`.
/// Returns the number of files removed.
pub fn cleanup_old_logs(log_dir: &Path, retention_hours: u32) -> io::Result<u32> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let retention = Duration::from_secs(u64::from(retention_hours) * 3600);
    let now = SystemTime::now();
    let mut deleted = 0;

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            if let Ok(age) = now.duration_since(modified) {
                if age > retention && fs::remove_file(&path).is_ok() {
                    deleted += 1;
                }
            }
        }
    }

    Ok(deleted)
}

/// Initializes file logging under the given registry root.
///
/// `RUST_LOG` overrides the configured level when set. A no-op when
/// the level is "off".
pub fn init(root: &Path, config: &LogConfig) -> io::Result<()> {
    if config.level == "off" {
        return Ok(());
    }

    let log_dir = log_directory(root);
    fs::create_dir_all(&log_dir)?;

    let deleted = cleanup_old_logs(&log_dir, config.retention_hours)?;

    let filename = format!("netloc_{}.log", chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let log_path = log_dir.join(filename);
    let log_file = File::create(&log_path)?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let file_layer = fmt::layer()
        .with_writer(log_file.with_max_level(tracing::Level::TRACE))
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    tracing::info!(path = %log_path.display(), level = %config.level, "logging initialized");
    if deleted > 0 {
        tracing::info!(deleted, "removed expired log files");
    }

    Ok(())
}
