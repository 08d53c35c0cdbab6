//! Logging infrastructure using tracing + tracing-subscriber
//!
//! Console output with an `EnvFilter` (per-module levels via RUST_LOG)
//! and an optional daily-rotated log file.

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingSettings;
use crate::error::{Error, Result};

/// Guards that must be held for the lifetime of the application so
/// buffered log entries are flushed on exit.
pub struct LogGuards {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the logging system from settings plus CLI verbosity.
///
/// Returns guards that must be kept alive for the duration of the
/// program.
pub fn init_logging(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Result<LogGuards> {
    let level = determine_level(settings, verbose, quiet);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.to_string().to_lowercase()))
        .map_err(|e| Error::config_validation(format!("invalid log filter: {}", e)))?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_filter(fmt_level_filter(level));

    let (file_layer, file_guard) = if let Some(ref log_file) = settings.file {
        let directory = log_file.parent().unwrap_or_else(|| std::path::Path::new("."));
        let file_name = log_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "modlink.log".to_string());
        let appender = rolling::daily(directory, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_filter(fmt_level_filter(level));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::debug!(level = %level, file = ?settings.file, "Logging initialized");

    Ok(LogGuards {
        _file_guard: file_guard,
    })
}

/// Minimal console-only setup for light subcommands.
pub fn init_simple(level: Level) -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::config_validation(format!("logging already initialized: {}", e)))?;
    Ok(())
}

fn determine_level(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => settings
            .level
            .parse()
            .unwrap_or(Level::INFO),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn fmt_level_filter(level: Level) -> tracing_subscriber::filter::LevelFilter {
    tracing_subscriber::filter::LevelFilter::from_level(level)
}
