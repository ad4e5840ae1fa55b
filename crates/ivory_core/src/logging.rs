//! Structured logging setup with console and file output.
//!
//! Provides:
//! - Daily rotating log files when a log directory is configured
//! - Build-type conditional default levels
//! - Console-only fallback when file logging fails
//! - Environment variable override via IVORY_LOG or RUST_LOG

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::config::AppSettings;

/// Logging configuration.
pub struct LogConfig {
    /// Directory for log files (console only when unset)
    pub log_dir: Option<PathBuf>,
    /// Whether running in a PTY (affects output formatting)
    pub is_pty: bool,
    /// Configured level or filter directive
    pub log_filter: Option<String>,
}

impl LogConfig {
    /// Create a new logging configuration.
    pub fn new(log_dir: Option<PathBuf>) -> Self {
        Self { log_dir, is_pty: atty::is(atty::Stream::Stdout), log_filter: None }
    }

    /// Build from the `app` config section.
    pub fn from_settings(settings: &AppSettings) -> Self {
        let config = Self::new(settings.log_dir.clone());
        if settings.log_level.is_empty() {
            config
        } else {
            config.with_filter(&settings.log_level)
        }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }
}

/// Guard that must be held for the lifetime of the application.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

/// Initialize logging with the given configuration.
///
/// If file logging initialization fails, falls back to console-only.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    let Some(log_dir) = config.log_dir.as_ref() else {
        return init_stdout_logging(config.log_filter.as_deref(), config.is_pty);
    };

    match init_file_logging(log_dir, config.log_filter.as_deref(), config.is_pty) {
        Ok(guard) => LoggingGuard { _worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {}. Using console only.", e);
            init_stdout_logging(config.log_filter.as_deref(), config.is_pty)
        }
    }
}

/// Initialize stdout-only logging.
fn init_stdout_logging(filter: Option<&str>, ansi: bool) -> LoggingGuard {
    let env_filter = build_env_filter(filter);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(ansi)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    LoggingGuard { _worker_guard: None }
}

/// Initialize file + console logging.
fn init_file_logging(
    log_dir: &Path,
    filter: Option<&str>,
    ansi: bool,
) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("ivory")
        .filename_suffix("log")
        .build(log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Console keeps to INFO and above; the file gets everything the filter allows
    let stdout = std::io::stdout.with_max_level(tracing::Level::INFO);
    let combined = stdout.and(non_blocking);

    tracing_subscriber::fmt()
        .with_writer(combined)
        .with_env_filter(build_env_filter(filter))
        .with_ansi(ansi)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    Ok(guard)
}

/// Build the environment filter.
fn build_env_filter(configured: Option<&str>) -> EnvFilter {
    // Priority: IVORY_LOG > RUST_LOG > configured level > default
    EnvFilter::try_from_env("IVORY_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .ok()
        .or_else(|| configured.and_then(configured_filter))
        .unwrap_or_else(|| EnvFilter::new(default_log_filter()))
}

/// Expand a bare level into a directive that keeps driver noise down.
fn configured_filter(level: &str) -> Option<EnvFilter> {
    let level = level.trim().to_ascii_lowercase();
    let directive = match level.as_str() {
        "" => return None,
        "debug" | "info" | "warn" | "error" | "trace" => {
            format!("{level},tokio_postgres=warn,hyper=warn")
        }
        _ => level,
    };
    EnvFilter::try_new(directive).ok()
}

/// Get the default log filter based on build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "debug,ivory=trace,ivory_core=trace,tokio_postgres=warn,hyper=warn,tower_http=debug"
    }
    #[cfg(not(debug_assertions))]
    {
        "info,ivory=info,ivory_core=info,tokio_postgres=warn,hyper=warn,tower_http=info"
    }
}
