use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod bookmark;

pub use bookmark::{Bookmark, BookmarkFilter, Category, Snapshot};

/// Status observed by a probe
///
/// Serialized as a bare number for real HTTP statuses and as a string for the
/// sentinels (`"unknown"`, `"timeout"`, strategy markers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawStatus", into = "RawStatus")]
pub enum StatusCode {
    Http(u16),
    /// The request completed but its status could not be observed
    Unknown,
    Timeout,
    /// Strategy-specific marker such as `image-load-success`
    Marker(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawStatus {
    Number(u16),
    Text(String),
}

impl From<RawStatus> for StatusCode {
    fn from(raw: RawStatus) -> Self {
        match raw {
            RawStatus::Number(code) => StatusCode::Http(code),
            RawStatus::Text(text) => match text.as_str() {
                "unknown" => StatusCode::Unknown,
                "timeout" => StatusCode::Timeout,
                _ => StatusCode::Marker(text),
            },
        }
    }
}

impl From<StatusCode> for RawStatus {
    fn from(status: StatusCode) -> Self {
        match status {
            StatusCode::Http(code) => RawStatus::Number(code),
            other => RawStatus::Text(other.to_string()),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Http(code) => write!(f, "{}", code),
            StatusCode::Unknown => f.write_str("unknown"),
            StatusCode::Timeout => f.write_str("timeout"),
            StatusCode::Marker(marker) => f.write_str(marker),
        }
    }
}

// Outcome of a single probe, before the monitor stamps bookkeeping on it
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub is_healthy: bool,
    pub response_time_ms: Option<u64>,
    pub status_code: Option<StatusCode>,
    pub error: Option<String>,
    pub redirected: Option<bool>,
    pub final_url: Option<String>,
}

impl ProbeOutcome {
    pub fn healthy(status_code: StatusCode, response_time_ms: u64) -> Self {
        Self {
            is_healthy: true,
            response_time_ms: Some(response_time_ms),
            status_code: Some(status_code),
            error: None,
            redirected: None,
            final_url: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            is_healthy: false,
            response_time_ms: None,
            status_code: None,
            error: Some(error.into()),
            redirected: None,
            final_url: None,
        }
    }

    pub fn timed_out(timeout_ms: u64) -> Self {
        Self {
            status_code: Some(StatusCode::Timeout),
            ..Self::unhealthy(format!("Request timed out after {}ms", timeout_ms))
        }
    }

    pub fn with_status(mut self, status_code: StatusCode) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_response_time(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = Some(response_time_ms);
        self
    }

    pub fn with_redirect(mut self, final_url: String, redirected: bool) -> Self {
        self.redirected = Some(redirected);
        self.final_url = Some(final_url);
        self
    }
}

/// Latest known reachability of one URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResult {
    pub url: String,
    pub is_healthy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<StatusCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub check_count: u64,
}

impl HealthResult {
    /// The never-checked value for `url`
    pub fn unknown(url: &str) -> Self {
        Self {
            url: url.to_string(),
            is_healthy: None,
            response_time_ms: None,
            status_code: None,
            error: None,
            redirected: None,
            final_url: None,
            last_checked_at: None,
            check_count: 0,
        }
    }

    /// Build a completed result from a probe outcome.
    ///
    /// `error` is kept only for unhealthy outcomes and always present for them.
    pub fn completed(
        url: &str,
        outcome: ProbeOutcome,
        check_count: u64,
        checked_at: DateTime<Utc>,
    ) -> Self {
        let error = if outcome.is_healthy {
            None
        } else {
            Some(outcome.error.unwrap_or_else(|| "Probe failed".to_string()))
        };

        Self {
            url: url.to_string(),
            is_healthy: Some(outcome.is_healthy),
            response_time_ms: outcome.response_time_ms,
            status_code: outcome.status_code,
            error,
            redirected: outcome.redirected,
            final_url: outcome.final_url,
            last_checked_at: Some(checked_at),
            check_count,
        }
    }

    pub fn state(&self) -> HealthState {
        match self.is_healthy {
            None => HealthState::Unchecked,
            Some(true) => HealthState::Healthy,
            Some(false) => HealthState::Unhealthy,
        }
    }
}

/// Per-URL lifecycle as seen by consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unchecked,
    Checking,
    Healthy,
    Unhealthy,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthState::Unchecked => "unchecked",
            HealthState::Checking => "checking",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        };
        f.write_str(label)
    }
}

// Aggregate counts over every cached result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStats {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub healthy_percentage: u32,
}

impl HealthStats {
    pub fn from_counts(healthy: usize, unhealthy: usize, unknown: usize) -> Self {
        let total = healthy + unhealthy + unknown;
        let healthy_percentage = if total == 0 {
            0
        } else {
            ((healthy as f64 / total as f64) * 100.0).round() as u32
        };

        Self {
            total,
            healthy,
            unhealthy,
            unknown,
            healthy_percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_serialization() {
        assert_eq!(serde_json::to_string(&StatusCode::Http(404)).unwrap(), "404");
        assert_eq!(serde_json::to_string(&StatusCode::Unknown).unwrap(), "\"unknown\"");

        let marker: StatusCode = serde_json::from_str("\"image-load-success\"").unwrap();
        assert_eq!(marker, StatusCode::Marker("image-load-success".to_string()));
        let timeout: StatusCode = serde_json::from_str("\"timeout\"").unwrap();
        assert_eq!(timeout, StatusCode::Timeout);
    }

    #[test]
    fn test_completed_error_only_when_unhealthy() {
        let now = Utc::now();
        let mut outcome = ProbeOutcome::healthy(StatusCode::Unknown, 42);
        outcome.error = Some("stale".to_string());
        let healthy = HealthResult::completed("https://a.dev", outcome, 1, now);
        assert_eq!(healthy.error, None);

        let mut failed = ProbeOutcome::unhealthy("x");
        failed.error = None;
        let unhealthy = HealthResult::completed("https://a.dev", failed, 2, now);
        assert_eq!(unhealthy.error.as_deref(), Some("Probe failed"));
        assert_eq!(unhealthy.state(), HealthState::Unhealthy);
    }

    #[test]
    fn test_health_result_camel_case() {
        let result = HealthResult::unknown("https://example.com");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isHealthy"], serde_json::Value::Null);
        assert_eq!(json["checkCount"], 0);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_stats_percentage_rounding() {
        let stats = HealthStats::from_counts(2, 1, 0);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.healthy_percentage, 67);
        assert_eq!(HealthStats::from_counts(0, 0, 0).healthy_percentage, 0);
    }
}
