use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{AppError, Result};

/// Build the event filter: `RUST_LOG` wins over the configured level.
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| AppError::Config(format!("invalid log level {level:?}: {e}"))),
    }
}

/// Install the global subscriber. Call once near the start of `main`.
///
/// With `file` set, events go through a non-blocking appender to that file;
/// keep the returned guard alive until exit so buffered lines are flushed.
pub fn init(level: &str, file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(level)?;
    let registry = tracing_subscriber::registry().with(filter);

    match file {
        Some(path) => {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            let file_name = path
                .file_name()
                .ok_or_else(|| AppError::Config(format!("invalid log file {}", path.display())))?;
            std::fs::create_dir_all(dir)?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .try_init()
                .map_err(|e| AppError::InternalState(format!("logging already initialised: {e}")))?;
            Ok(Some(guard))
        }
        None => {
            registry
                .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
                .try_init()
                .map_err(|e| AppError::InternalState(format!("logging already initialised: {e}")))?;
            Ok(None)
        }
    }
}
