//! Reachability probe strategies
//!
//! A probe makes one best-effort attempt to reach a URL. The verdict is a
//! heuristic: a host that blocks a probe method looks the same as a host that
//! is down, so callers get a best guess and never ground truth.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::settings::{HealthConfig, ProbeMode};
use crate::error::Result;
use crate::models::{ProbeOutcome, StatusCode};
use crate::utils::{duration_to_ms, elapsed_ms, favicon_url, parse_url};

/// Marker recorded when the favicon probe loads the asset
pub const IMAGE_LOAD_SUCCESS: &str = "image-load-success";

/// Marker recorded when the favicon probe gets a non-success response
pub const IMAGE_LOAD_ERROR: &str = "image-load-error";

/// Why a probe attempt did not produce an outcome
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProbeError {
    /// The probe's own deadline passed; the pending request was dropped
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// DNS failure, refused connection, TLS failure and the like
    #[error("{0}")]
    Network(String),

    /// The strategy itself failed (panicked or misbehaved)
    #[error("Probe failed: {0}")]
    Internal(String),
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout(_))
    }

    /// Represent this failure as an unhealthy outcome
    pub fn into_outcome(self) -> ProbeOutcome {
        match self {
            ProbeError::Timeout(ms) => ProbeOutcome::timed_out(ms),
            other => ProbeOutcome::unhealthy(other.to_string()),
        }
    }
}

pub type ProbeResult = std::result::Result<ProbeOutcome, ProbeError>;

/// One way of checking whether a URL is reachable
#[async_trait]
pub trait ProbeStrategy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Attempt to reach `url`, giving up after `timeout`
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeResult;
}

/// Bound `probe` by `timeout`; an expired deadline drops the pending future
/// and reports [`ProbeError::Timeout`].
pub async fn with_timeout<T, F>(timeout: Duration, probe: F) -> std::result::Result<T, ProbeError>
where
    F: Future<Output = std::result::Result<T, ProbeError>>,
{
    match tokio::time::timeout(timeout, probe).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(duration_to_ms(timeout))),
    }
}

fn classify_reqwest_error(err: reqwest::Error, timeout: Duration) -> ProbeError {
    if err.is_timeout() {
        ProbeError::Timeout(duration_to_ms(timeout))
    } else {
        ProbeError::Network(err.to_string())
    }
}

fn build_client(config: &HealthConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;
    Ok(client)
}

/// Primary strategy: a HEAD request.
///
/// In [`ProbeMode::Opaque`] any completed round trip counts as healthy with
/// status `unknown`, whatever the server answered. [`ProbeMode::Transparent`]
/// records the real status but keeps the same classification.
pub struct HeadProbe {
    client: reqwest::Client,
    mode: ProbeMode,
}

impl HeadProbe {
    pub fn new(client: reqwest::Client, mode: ProbeMode) -> Self {
        Self { client, mode }
    }

    pub fn from_config(config: &HealthConfig) -> Result<Self> {
        Ok(Self::new(build_client(config)?, config.probe_mode))
    }
}

#[async_trait]
impl ProbeStrategy for HeadProbe {
    fn name(&self) -> &str {
        "head"
    }

    async fn probe(&self, url: &str, timeout: Duration) -> ProbeResult {
        let start = Instant::now();
        let response = with_timeout(timeout, async {
            self.client
                .head(url)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| classify_reqwest_error(e, timeout))
        })
        .await?;

        let elapsed = elapsed_ms(start);
        let status = match self.mode {
            ProbeMode::Opaque => StatusCode::Unknown,
            ProbeMode::Transparent => StatusCode::Http(response.status().as_u16()),
        };

        let final_url = response.url().to_string();
        let redirected = parse_url(url).map(|u| u != *response.url()).unwrap_or(false);
        debug!("HEAD {} completed in {}ms (status {})", url, elapsed, response.status());

        Ok(ProbeOutcome::healthy(status, elapsed).with_redirect(final_url, redirected))
    }
}

/// Fallback strategy: load the site's favicon as an asset.
///
/// Some hosts reject HEAD requests but still serve static assets.
pub struct FaviconProbe {
    client: reqwest::Client,
}

impl FaviconProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &HealthConfig) -> Result<Self> {
        Ok(Self::new(build_client(config)?))
    }
}

#[async_trait]
impl ProbeStrategy for FaviconProbe {
    fn name(&self) -> &str {
        "favicon"
    }

    async fn probe(&self, url: &str, timeout: Duration) -> ProbeResult {
        let asset = favicon_url(url).map_err(|e| ProbeError::Network(e.to_string()))?;
        let start = Instant::now();

        let response = with_timeout(timeout, async {
            self.client
                .get(&asset)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| classify_reqwest_error(e, timeout))
        })
        .await?;
        let elapsed = elapsed_ms(start);

        if response.status().is_success() {
            debug!("Favicon for {} loaded in {}ms", url, elapsed);
            Ok(ProbeOutcome::healthy(StatusCode::Marker(IMAGE_LOAD_SUCCESS.to_string()), elapsed))
        } else {
            Ok(ProbeOutcome::unhealthy(format!(
                "Favicon failed to load (HTTP {})",
                response.status().as_u16()
            ))
            .with_status(StatusCode::Marker(IMAGE_LOAD_ERROR.to_string()))
            .with_response_time(elapsed))
        }
    }
}
