//! Logging: `tracing` + `tracing-subscriber`, composing an `EnvFilter` layer
//! with a JSON or pretty-printed stdout formatter (§1A), plus an optional
//! `tracing-appender` daily-rotating JSON file layer when `config.log_dir`
//! is set. Sensitive-field redaction in log output is an explicit non-goal
//! here (§1).

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Installed once at process startup and held for the process lifetime.
/// Dropping it flushes and stops the non-blocking file-output worker thread,
/// so the caller must keep the returned value bound (not `let _ = ...`) for
/// as long as logging is needed.
pub struct LoggerGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the global `tracing` subscriber from `config.log_level` /
/// `config.log_format`, plus a daily-rotating JSON file layer under
/// `config.log_dir` when configured. Call exactly once, before constructing
/// the Store, Governor, or any provider client.
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn init(config: &Config) -> Result<LoggerGuard> {
    let default_level: tracing::level_filters::LevelFilter = config.log_level.parse().unwrap_or(tracing::level_filters::LevelFilter::INFO);
    let filter = EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy();

    let (file_layer, file_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "vidforge.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().json().with_target(true).with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let init_result = if config.log_format == "pretty" {
        let stdout_layer = tracing_subscriber::fmt::layer().pretty().with_target(true);
        tracing_subscriber::registry().with(filter).with(stdout_layer).with(file_layer).try_init()
    } else {
        let stdout_layer = tracing_subscriber::fmt::layer().json().with_target(true).with_current_span(true).with_span_list(true);
        tracing_subscriber::registry().with(filter).with(stdout_layer).with(file_layer).try_init()
    };

    init_result.context("failed to install tracing subscriber")?;
    Ok(LoggerGuard { _file_guard: file_guard })
}
