use crate::models::HealthResult;
use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info, trace, warn, LevelFilter};
use std::path::Path;
use std::sync::{Once, OnceLock};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, FmtSubscriber};
use tracing_log::LogTracer;

static INIT: Once = Once::new();

// Keeps the file writer flushing for the life of the process
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn bridge_log_crate() {
    // Bridge log events to tracing; subscriber `init` may already have done so
    let _ = LogTracer::init();
}

/// Initialize the global logger with console output filtered by `RUST_LOG`
/// This should be called once at the start of the application
pub fn init_logger() {
    INIT.call_once(|| {
        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .with_level(true)
            .with_ansi(true)
            .init();

        bridge_log_crate();
        log::set_max_level(LevelFilter::Debug);
    });
}

/// Initialize logger with environment variable support
/// Uses RUST_LOG environment variable for configuration
pub fn init_logger_with_env() {
    INIT.call_once(|| {
        let level = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string())
            .parse::<LevelFilter>()
            .unwrap_or(LevelFilter::Info);

        log::set_max_level(level);

        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .with_level(true)
            .with_ansi(true)
            .init();

        bridge_log_crate();
    });
}

/// Initialize logger from configuration, optionally adding a daily rolling log file
pub fn init_logger_with_config(log_level: &str, enable_file_logging: bool, log_dir: &Path) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
        let console = fmt::layer().with_target(false).with_ansi(true);

        if enable_file_logging {
            let appender = tracing_appender::rolling::daily(log_dir, "linkvault.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);

            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
        } else {
            tracing_subscriber::registry().with(filter).with(console).init();
        }

        bridge_log_crate();
        log::set_max_level(
            log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info),
        );
    });
}

/// Log a completed health check as JSON at debug level
pub fn log_health_result(result: &HealthResult) {
    if let Err(e) = try_log_health_result(result) {
        warn!("Failed to log health result for {}: {}", result.url, e);
    }
}

fn try_log_health_result(result: &HealthResult) -> Result<()> {
    if !log::log_enabled!(log::Level::Debug) {
        return Ok(());
    }

    let timestamp = Utc::now().to_rfc3339();
    let message = serde_json::to_string(result)?;
    debug!("[{}] HEALTH: {}", timestamp, message);
    Ok(())
}

/// Log an error message
pub fn log_error(message: &str) {
    error!("{}", message);
}

/// Log an info message
pub fn log_info(message: &str) {
    info!("{}", message);
}

/// Log a warning message
pub fn log_warning(message: &str) {
    warn!("{}", message);
}

/// Log a debug message
pub fn log_debug(message: &str) {
    debug!("{}", message);
}

/// Log a trace message
pub fn log_trace(message: &str) {
    trace!("{}", message);
}

/// Convenience macro for logging errors
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_error(&format!($($arg)*));
    };
}

/// Convenience macro for logging info messages
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_info(&format!($($arg)*));
    };
}

/// Convenience macro for logging warning messages
#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        $crate::logging::log_warning(&format!($($arg)*));
    };
}

/// Convenience macro for logging debug messages
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_debug(&format!($($arg)*));
    };
}

/// Convenience macro for logging trace messages
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::logging::log_trace(&format!($($arg)*));
    };
}
