//! Tracing subscriber setup.
//!
//! Console output goes to stderr with local RFC 3339 timestamps. When a log
//! directory is configured, a daily-rolling file (no ANSI colors) is written
//! as well; keep the returned guard alive until shutdown so buffered lines
//! are flushed.
//!
//! The filter defaults to [`DEFAULT_FILTER`] and is overridden by `RUST_LOG`.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "trackwise=info";

/// Where and how much to log.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Fallback filter directive when `RUST_LOG` is unset.
    pub filter: String,
    /// Directory for the rolling log file; console only when `None`.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            directory: None,
            file_prefix: "trackwise.log".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Console plus a daily file under the platform data directory.
    pub fn with_default_directory() -> Self {
        Self {
            directory: dirs::data_local_dir().map(|d| d.join("trackwise").join("logs")),
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.filter))
    }
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, TryInitError> {
    let console = fmt::layer()
        .with_timer(LocalTime::rfc_3339())
        .with_writer(std::io::stderr)
        .with_filter(config.env_filter());

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer()
                .with_timer(LocalTime::rfc_3339())
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(config.env_filter());

            tracing_subscriber::registry()
                .with(console)
                .with(file)
                .try_init()?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(console).try_init()?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_console_only() {
        let config = LoggingConfig::default();
        assert_eq!(config.filter, DEFAULT_FILTER);
        assert!(config.directory.is_none());
    }

    #[test]
    fn test_second_init_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = LoggingConfig {
            directory: Some(temp.path().to_path_buf()),
            ..LoggingConfig::default()
        };

        // Another test binary thread may have installed one first
        let first = init(&config);
        if first.is_ok() {
            assert!(init(&LoggingConfig::default()).is_err());
        }
    }
}
