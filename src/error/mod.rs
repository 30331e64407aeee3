//! Error handling module for the bookmark manager

use thiserror::Error;
use tokio::time::error::Elapsed;

/// Custom error type for linkvault
///
/// Reachability failures are never reported through this type; they are
/// recorded as unhealthy [`crate::models::HealthResult`] values instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    Validation(String),

    #[error("Import rejected: {0}")]
    Import(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Timeout error: {0}")]
    Timeout(#[from] Elapsed),
}

impl Error {
    /// Structural failures are shown to the user as a dismissible notice,
    /// everything else is transient.
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Import(_) | Error::Storage(_) | Error::Config(_))
    }
}

/// Result type for linkvault
pub type Result<T> = std::result::Result<T, Error>;

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Unknown(err.to_string())
    }
}
