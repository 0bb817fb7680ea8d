//! Tracing subscriber setup.
//!
//! `HARDPY_LOG` takes precedence over the configured level. Console output
//! goes to stderr so command output on stdout stays clean; the optional log
//! file always receives JSON lines.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};

pub const LOG_ENV: &str = "HARDPY_LOG";

/// Pick the filter directive: a non-empty env value wins over `level`.
pub fn filter_directive(level: &str, env: Option<String>) -> String {
    match env {
        Some(directive) if !directive.trim().is_empty() => directive.trim().to_string(),
        _ => level.to_string(),
    }
}

pub fn build_filter(level: &str) -> Result<EnvFilter> {
    let directive = filter_directive(level, std::env::var(LOG_ENV).ok());
    EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter '{}'", directive))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process, or buffered
/// file output is lost. Calling this again after a subscriber is installed
/// is a no-op.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(&config.level)?;

    let (file_layer, guard) = match config.log_file() {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let name = path
                .file_name()
                .with_context(|| format!("Log file has no file name: {}", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_env_directive_wins() {
        assert_eq!(filter_directive("info", None), "info");
        assert_eq!(filter_directive("info", Some("  ".into())), "info");
        assert_eq!(
            filter_directive("info", Some("hardpy=debug".into())),
            "hardpy=debug"
        );
    }

    #[test]
    fn test_init_logging_with_file_twice() {
        let dir = tempdir().unwrap();
        let config = LoggingConfig {
            level: "debug".into(),
            format: LogFormat::Json,
            file: dir.path().join("logs/run.log").display().to_string(),
        };
        let guard = init_logging(&config).unwrap();
        assert!(guard.is_some());
        assert!(dir.path().join("logs").is_dir());

        // Second install is silently ignored.
        let guard = init_logging(&LoggingConfig::default()).unwrap();
        assert!(guard.is_none());
    }
}
