//! Retry and fallback policy for a single URL check

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::settings::HealthConfig;
use crate::models::ProbeOutcome;

use super::probe::{with_timeout, ProbeError, ProbeResult, ProbeStrategy};

/// Delay inserted after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    None,
    Fixed(Duration),
    /// Attempt `n` (1-based) is followed by `n * base`
    Linear(Duration),
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => *delay,
            Backoff::Linear(base) => base.saturating_mul(attempt.max(1)),
        }
    }
}

/// How a check escalates when the primary probe fails.
///
/// Network failures are retried up to `max_attempts` in total, then handed to
/// the fallback strategy. A timeout ends the check immediately: the host has
/// already had its full time budget.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub use_fallback: bool,
    pub fallback_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Backoff::Linear(Duration::from_millis(1000)),
            use_fallback: true,
            fallback_timeout: Duration::from_millis(8000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &HealthConfig) -> Self {
        Self {
            max_attempts: config.retries.saturating_add(1),
            backoff: Backoff::Linear(Duration::from_millis(config.backoff_base_ms)),
            use_fallback: config.use_fallback,
            fallback_timeout: Duration::from_millis(config.fallback_timeout_ms),
        }
    }

    /// Same policy with `retries` extra attempts after the first
    pub fn with_retries(&self, retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..self.clone()
        }
    }

    /// Run the primary strategy under this policy, falling back when allowed.
    ///
    /// Never fails: every failure ends up as an unhealthy outcome.
    pub async fn execute(
        &self,
        primary: &dyn ProbeStrategy,
        fallback: Option<&dyn ProbeStrategy>,
        url: &str,
        timeout: Duration,
    ) -> ProbeOutcome {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        let last = loop {
            let result = run_guarded(primary, url, timeout).await;
            let retryable = match &result {
                Ok(outcome) => !outcome.is_healthy,
                Err(err) => !err.is_timeout(),
            };
            if !retryable || attempt >= max_attempts {
                break result;
            }

            let delay = self.backoff.delay(attempt);
            debug!(
                "{} probe of {} failed (attempt {}/{}), retrying in {:?}",
                primary.name(),
                url,
                attempt,
                max_attempts,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        };

        match last {
            Ok(outcome) => outcome,
            Err(err) if err.is_timeout() => err.into_outcome(),
            Err(err) => match fallback.filter(|_| self.use_fallback) {
                Some(strategy) => {
                    debug!("Falling back to {} probe for {}: {}", strategy.name(), url, err);
                    match run_guarded(strategy, url, self.fallback_timeout).await {
                        Ok(outcome) => outcome,
                        Err(fallback_err) if fallback_err.is_timeout() => fallback_err.into_outcome(),
                        Err(fallback_err) => ProbeOutcome::unhealthy(format!(
                            "{}; {} fallback: {}",
                            err,
                            strategy.name(),
                            fallback_err
                        )),
                    }
                }
                None => err.into_outcome(),
            },
        }
    }
}

/// Run one probe bounded by `timeout`, turning a panic into an internal error
async fn run_guarded(strategy: &dyn ProbeStrategy, url: &str, timeout: Duration) -> ProbeResult {
    let guarded = AssertUnwindSafe(strategy.probe(url, timeout)).catch_unwind();
    match with_timeout(timeout, async { Ok(guarded.await) }).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => {
            warn!("{} probe panicked while checking {}", strategy.name(), url);
            Err(ProbeError::Internal(format!("{} probe panicked", strategy.name())))
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StatusCode;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Strategy that replays a fixed script of results, repeating the last one
    struct Scripted {
        script: Mutex<Vec<ProbeResult>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(script: Vec<ProbeResult>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProbeStrategy for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn probe(&self, _url: &str, _timeout: Duration) -> ProbeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }

    struct Panicking;

    #[async_trait]
    impl ProbeStrategy for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn probe(&self, _url: &str, _timeout: Duration) -> ProbeResult {
            panic!("probe exploded");
        }
    }

    fn refused() -> ProbeResult {
        Err(ProbeError::Network("connection refused".to_string()))
    }

    fn ok(ms: u64) -> ProbeResult {
        Ok(ProbeOutcome::healthy(StatusCode::Unknown, ms))
    }

    #[test]
    fn test_backoff_delays() {
        let linear = Backoff::Linear(Duration::from_millis(1000));
        assert_eq!(linear.delay(1), Duration::from_millis(1000));
        assert_eq!(linear.delay(3), Duration::from_millis(3000));
        assert_eq!(Backoff::Fixed(Duration::from_millis(5)).delay(9), Duration::from_millis(5));
        assert_eq!(Backoff::None.delay(2), Duration::ZERO);
    }

    #[test]
    fn test_from_config() {
        let policy = RetryPolicy::from_config(&HealthConfig::default());
        assert_eq!(policy, RetryPolicy::default());
        assert_eq!(policy.with_retries(3).max_attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let primary = Scripted::new(vec![refused(), ok(50)]);
        let started = tokio::time::Instant::now();

        let outcome = RetryPolicy::default()
            .execute(&primary, None, "https://a.dev", Duration::from_secs(10))
            .await;

        assert!(outcome.is_healthy);
        assert_eq!(primary.calls(), 2);
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_use_fallback() {
        let primary = Scripted::new(vec![refused()]);
        let fallback = Scripted::new(vec![Ok(ProbeOutcome::healthy(
            StatusCode::Marker("image-load-success".to_string()),
            30,
        ))]);

        let outcome = RetryPolicy::default()
            .with_retries(2)
            .execute(&primary, Some(&fallback), "https://a.dev", Duration::from_secs(10))
            .await;

        assert_eq!(primary.calls(), 3);
        assert_eq!(fallback.calls(), 1);
        assert!(outcome.is_healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_skips_retry_and_fallback() {
        let primary = Scripted::new(vec![Err(ProbeError::Timeout(10_000))]);
        let fallback = Scripted::new(vec![ok(1)]);

        let outcome = RetryPolicy::default()
            .execute(&primary, Some(&fallback), "https://a.dev", Duration::from_secs(10))
            .await;

        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
        assert!(!outcome.is_healthy);
        assert_eq!(outcome.status_code, Some(StatusCode::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_failure_keeps_both_reasons() {
        let primary = Scripted::new(vec![refused()]);
        let fallback = Scripted::new(vec![Err(ProbeError::Network("dns".to_string()))]);

        let outcome = RetryPolicy { max_attempts: 1, ..RetryPolicy::default() }
            .execute(&primary, Some(&fallback), "https://a.dev", Duration::from_secs(10))
            .await;

        let error = outcome.error.unwrap();
        assert!(error.contains("connection refused"));
        assert!(error.contains("dns"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_disabled() {
        let primary = Scripted::new(vec![refused()]);
        let fallback = Scripted::new(vec![ok(1)]);
        let policy = RetryPolicy { max_attempts: 1, use_fallback: false, ..RetryPolicy::default() };

        let outcome = policy
            .execute(&primary, Some(&fallback), "https://a.dev", Duration::from_secs(10))
            .await;

        assert_eq!(fallback.calls(), 0);
        assert_eq!(outcome.error.as_deref(), Some("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_strategy_becomes_unhealthy() {
        let policy = RetryPolicy { max_attempts: 1, use_fallback: false, ..RetryPolicy::default() };
        let outcome = policy
            .execute(&Panicking, None, "https://a.dev", Duration::from_secs(10))
            .await;

        assert!(!outcome.is_healthy);
        assert!(outcome.error.unwrap().contains("panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_strategy_is_bounded() {
        struct Hanging;

        #[async_trait]
        impl ProbeStrategy for Hanging {
            fn name(&self) -> &str {
                "hanging"
            }

            async fn probe(&self, _url: &str, _timeout: Duration) -> ProbeResult {
                std::future::pending().await
            }
        }

        let started = tokio::time::Instant::now();
        let outcome = RetryPolicy::default()
            .execute(&Hanging, None, "https://a.dev", Duration::from_millis(500))
            .await;

        assert_eq!(outcome.status_code, Some(StatusCode::Timeout));
        assert!(started.elapsed() < Duration::from_millis(600));
    }
}
