//! Application configuration settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};

use crate::health::monitor::{BatchOptions, CheckOptions};

/// Default config file looked up by [`AppConfig::load_config`]
pub const DEFAULT_CONFIG_FILE: &str = "linkvault.yml";

/// Main configuration for linkvault
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log level configuration
    pub log_level: String,

    /// Health monitor configuration
    pub health: HealthConfig,

    /// Bookmark persistence configuration
    pub storage: StorageConfig,

    /// Offline asset cache configuration
    pub offline_cache: OfflineCacheConfig,

    /// QR code endpoint configuration
    pub qr: QrConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Runtime configuration
    pub runtime: RuntimeConfig,
}

/// How the primary probe reports the observed status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    /// Any completed round trip is healthy with status `unknown`
    Opaque,
    /// Completed round trips are still healthy but record the real status
    Transparent,
}

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Primary probe timeout in milliseconds
    pub timeout_ms: u64,

    /// Fallback asset probe timeout in milliseconds
    pub fallback_timeout_ms: u64,

    /// Extra attempts after the first failed probe
    pub retries: u32,

    /// Backoff unit; attempt `n` waits `n * backoff_base_ms`
    pub backoff_base_ms: u64,

    /// Whether to try the favicon probe after the primary probe gives up
    pub use_fallback: bool,

    /// URLs checked concurrently per batch
    pub batch_size: usize,

    /// Pause between batches in milliseconds
    pub delay_between_batches_ms: u64,

    /// Re-check interval for `watch`; disabled when unset
    pub periodic_interval_minutes: Option<u64>,

    pub probe_mode: ProbeMode,

    pub user_agent: String,
}

/// Bookmark persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON file per storage key
    pub data_dir: PathBuf,
}

/// Offline asset cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineCacheConfig {
    /// Entries older than this are pruned
    pub max_age_days: i64,

    /// Path extensions served cache-first
    pub static_extensions: Vec<String>,

    /// Path prefixes served network-first
    pub api_path_prefixes: Vec<String>,
}

/// QR code image endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QrConfig {
    pub endpoint: String,

    /// Square image size in pixels
    pub size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write logs to a daily rolling file
    pub enable_file_logging: bool,

    pub log_dir: PathBuf,
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// "single_threaded" or "multi_threaded"
    pub mode: String,

    /// Worker threads for multi-threaded mode; auto-detected when unset
    pub worker_threads: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            health: HealthConfig::default(),
            storage: StorageConfig::default(),
            offline_cache: OfflineCacheConfig::default(),
            qr: QrConfig::default(),
            logging: LoggingConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            fallback_timeout_ms: 8_000,
            retries: 1,
            backoff_base_ms: 1_000,
            use_fallback: true,
            batch_size: 5,
            delay_between_batches_ms: 1_000,
            periodic_interval_minutes: None,
            probe_mode: ProbeMode::Opaque,
            user_agent: format!("linkvault/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".linkvault"),
        }
    }
}

impl Default for OfflineCacheConfig {
    fn default() -> Self {
        Self {
            max_age_days: 7,
            static_extensions: [
                "css", "js", "png", "jpg", "jpeg", "gif", "svg", "ico", "woff", "woff2", "ttf",
            ]
            .iter()
            .map(|ext| ext.to_string())
            .collect(),
            api_path_prefixes: vec!["/api/".to_string()],
        }
    }
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.qrserver.com/v1/create-qr-code/".to_string(),
            size: 200,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_file_logging: false,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: "single_threaded".to_string(),
            worker_threads: None,
        }
    }
}

impl HealthConfig {
    /// Options for a single-URL check
    pub fn check_options(&self) -> CheckOptions {
        CheckOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            retries: self.retries,
        }
    }

    /// Options for a batched check
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            batch_size: self.batch_size,
            delay_between_batches: Duration::from_millis(self.delay_between_batches_ms),
            check: self.check_options(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load configuration from `linkvault.yml` (or defaults) with environment overrides
    pub fn load_config() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from `path` if it exists, then apply environment overrides
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::from_yaml_file(path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables take precedence over the config file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.log_level = log_level;
        }

        if let Some(timeout) = env_parse("LINKVAULT_TIMEOUT_MS") {
            self.health.timeout_ms = timeout;
        }

        if let Some(timeout) = env_parse("LINKVAULT_FALLBACK_TIMEOUT_MS") {
            self.health.fallback_timeout_ms = timeout;
        }

        if let Some(retries) = env_parse("LINKVAULT_RETRIES") {
            self.health.retries = retries;
        }

        if let Some(batch_size) = env_parse("LINKVAULT_BATCH_SIZE") {
            self.health.batch_size = batch_size;
        }

        if let Some(delay) = env_parse("LINKVAULT_BATCH_DELAY_MS") {
            self.health.delay_between_batches_ms = delay;
        }

        if let Some(minutes) = env_parse("LINKVAULT_PERIODIC_MINUTES") {
            self.health.periodic_interval_minutes = Some(minutes);
        }

        if let Ok(mode) = std::env::var("LINKVAULT_PROBE_MODE") {
            match mode.as_str() {
                "opaque" => self.health.probe_mode = ProbeMode::Opaque,
                "transparent" => self.health.probe_mode = ProbeMode::Transparent,
                other => tracing::warn!("Ignoring unknown LINKVAULT_PROBE_MODE '{}'", other),
            }
        }

        if let Ok(data_dir) = std::env::var("LINKVAULT_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(endpoint) = std::env::var("LINKVAULT_QR_ENDPOINT") {
            self.qr.endpoint = endpoint;
        }

        if let Some(enable) = env_parse("LINKVAULT_ENABLE_FILE_LOGGING") {
            self.logging.enable_file_logging = enable;
        }

        if let Ok(mode) = std::env::var("LINKVAULT_RUNTIME_MODE") {
            self.runtime.mode = mode;
        }

        if let Some(threads) = env_parse("LINKVAULT_WORKER_THREADS") {
            self.runtime.worker_threads = Some(threads);
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}
