//! linkvault - bookmark manager with URL health monitoring
//!
//! This library provides the bookmark collection and its persistence, a
//! batched reachability monitor with change notifications, export/import,
//! QR sharing links and an offline request cache.

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod models;
pub mod offline;
pub mod qr;
pub mod storage;
pub mod transfer;
pub mod utils;

// Re-export commonly used items
pub use config::settings::AppConfig;
pub use error::{Error, Result};
pub use health::{BatchOptions, CheckOptions, HealthEvent, HealthMonitor, ProbeStrategy, SubscriptionToken};
pub use logging::{init_logger, init_logger_with_config, init_logger_with_env, log_debug, log_error, log_info, log_trace, log_warning};
pub use models::{Bookmark, Category, HealthResult, HealthState, HealthStats, ProbeOutcome, Snapshot, StatusCode};
pub use storage::BookmarkStore;

/// Runtime utilities for creating single-threaded vs multi-threaded Tokio runtimes
pub mod runtime {
    use crate::config::settings::RuntimeConfig;
    use anyhow::{Context, Result};
    use tokio::runtime::{Builder, Runtime};

    /// Create a Tokio runtime based on the configuration
    pub fn create_runtime(config: &RuntimeConfig) -> Result<Runtime> {
        match config.mode.as_str() {
            "single_threaded" => {
                tracing::debug!("🧵 Initializing single-threaded runtime");
                Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("Failed to create single-threaded runtime")
            }
            "multi_threaded" => {
                let mut builder = Builder::new_multi_thread();
                builder.enable_all();

                match config.worker_threads {
                    Some(threads) if threads > 0 => {
                        tracing::debug!("🧵 Initializing multi-threaded runtime with {} worker threads", threads);
                        builder.worker_threads(threads);
                    }
                    _ => {
                        tracing::debug!("🧵 Initializing multi-threaded runtime with auto-detected CPU cores");
                    }
                }

                builder.build().context("Failed to create multi-threaded runtime")
            }
            other => {
                tracing::warn!("⚠️  Unknown runtime mode '{}', defaulting to single-threaded", other);
                Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("Failed to create default single-threaded runtime")
            }
        }
    }

    /// Execute an async function with the configured runtime
    pub fn run_with_runtime<F, T>(config: &RuntimeConfig, future: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let runtime = create_runtime(config)?;
        runtime.block_on(future)
    }

}
