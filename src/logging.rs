//! Log sink set-up.
//!
//! Every line is `[YYYY-MM-DD HH:MM:SS] <message>`, written either to stderr
//! or appended to a log file through a non-blocking writer.

use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

use crate::error::LoggingError;

/// Environment variable holding the log filter, e.g. `debug` or `reshelve=trace`.
pub const LOG_FILTER_ENV: &str = "RESHELVE_LOG";

const DEFAULT_FILTER: &str = "info";

/// Local wall-clock timestamp in square brackets.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketedLocalTime;

impl FormatTime for BracketedLocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "[{}]", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Installs the global subscriber.
///
/// With `log_file` set, lines are appended to that file and the returned
/// guard must be kept alive until exit so buffered lines are flushed.
/// Without it, lines go to stderr.
///
/// # Errors
///
/// Returns an error if the log file's directory cannot be created or the
/// file cannot be opened for appending.
pub fn init_logger(log_file: Option<&Path>) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = env::var(LOG_FILTER_ENV).unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    let filter_layer = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_layer)
        .with_timer(BracketedLocalTime)
        .with_level(false)
        .with_target(false);

    let Some(log_file) = log_file else {
        // A subscriber may already be installed, e.g. when called twice in tests.
        let _ = builder.with_writer(io::stderr).with_ansi(false).try_init();
        return Ok(None);
    };

    let directory = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory).map_err(|source| LoggingError::CreateDir {
        path: directory.to_path_buf(),
        source,
    })?;
    let file_name = log_file
        .file_name()
        .ok_or_else(|| LoggingError::NoFileName {
            path: log_file.to_path_buf(),
        })?;

    // No rotation: one file, appended to.
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(directory)
        .map_err(|source| LoggingError::Open {
            path: log_file.to_path_buf(),
            source,
        })?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let _ = builder.with_writer(non_blocking).with_ansi(false).try_init();
    Ok(Some(guard))
}
