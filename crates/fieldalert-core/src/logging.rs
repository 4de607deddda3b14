//! Logging infrastructure for FieldAlert.
//!
//! Structured logging on the `tracing` ecosystem: JSON lines to a daily
//! rolling file plus a compact human-readable stream on stderr.
//!
//! ## Example
//!
//! ```no_run
//! use fieldalert_core::logging;
//!
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! tracing::info!("engine started");
//! tracing::debug!(kind = "sos", queued = 2, "merged poll result");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{AlertError, Result};

/// Guard that must be held to ensure log flushing on shutdown.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Directive used when `RUST_LOG` is unset. Covers every `fieldalert*` target.
fn default_directive(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("fieldalert={level}")
}

/// Initialize the FieldAlert logging system.
///
/// The file under `log_dir` (default `~/.fieldalert/logs/`) receives every
/// event as a flat JSON line, so alert events can be grepped by `kind` and
/// `event`. Stderr only shows warnings unless `verbose`, because stdout is
/// where the console dialogs are drawn.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };
    std::fs::create_dir_all(&log_dir).map_err(|e| AlertError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "fieldalert.log"));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .json()
        .flatten_event(true);

    let stderr_floor = if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact()
        .with_filter(stderr_floor);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize minimal console-only logging for tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Base directory for FieldAlert state: `~/.fieldalert/`
pub fn default_base_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| AlertError::Internal {
        message: "HOME environment variable not set".into(),
    })?;

    Ok(PathBuf::from(home).join(".fieldalert"))
}

/// Get the default log directory path: `~/.fieldalert/logs/`
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(default_base_dir()?.join("logs"))
}

/// Log an alert lifecycle event on the `fieldalert::alert` target.
///
/// ```ignore
/// log_alert_event!(AlertKind::Sos, "dialog_shown", file = %item.file());
/// ```
#[macro_export]
macro_rules! log_alert_event {
    ($kind:expr, $event:expr) => {
        tracing::info!(
            target: "fieldalert::alert",
            kind = %$kind,
            event = $event,
            "alert event"
        )
    };
    ($kind:expr, $event:expr, $($field:tt)*) => {
        tracing::info!(
            target: "fieldalert::alert",
            kind = %$kind,
            event = $event,
            $($field)*,
            "alert event"
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_dir() {
        // SAFETY: We are in a test context and this is the only test modifying HOME
        unsafe { std::env::set_var("HOME", "/tmp/test-home") };
        let dir = default_log_dir().unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/test-home/.fieldalert/logs"));
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "fieldalert=info");
        assert_eq!(default_directive(true), "fieldalert=debug");
    }

    #[test]
    fn test_init_test_logging() {
        init_test_logging();
        crate::log_alert_event!(crate::types::AlertKind::Sos, "test", queued = 1);
    }
}
