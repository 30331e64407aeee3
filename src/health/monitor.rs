//! Health check orchestration
//!
//! The monitor owns the [`HealthCache`], runs probes under a [`RetryPolicy`],
//! checks URL lists in paced batches, re-checks on a schedule, and notifies
//! subscribers after every completed check.

use chrono::Utc;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::settings::HealthConfig;
use crate::error::Result;
use crate::models::{HealthResult, HealthState, HealthStats};

use super::bus::{HealthBus, HealthEvent, SubscriptionToken};
use super::cache::HealthCache;
use super::policy::RetryPolicy;
use super::probe::{FaviconProbe, HeadProbe, ProbeStrategy};

/// Longest accepted re-check period (one year)
pub const MAX_PERIODIC_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Options for a single-URL check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOptions {
    pub timeout: Duration,
    /// Extra attempts after the first failed probe
    pub retries: u32,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 1,
        }
    }
}

/// Options for a batched check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub delay_between_batches: Duration,
    pub check: CheckOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            delay_between_batches: Duration::from_secs(1),
            check: CheckOptions::default(),
        }
    }
}

enum Slot {
    Owner(watch::Sender<Option<HealthResult>>),
    Waiter(watch::Receiver<Option<HealthResult>>),
}

/// Releases a URL's in-flight slot even if the check is cancelled
struct InFlightGuard<'a> {
    monitor: &'a HealthMonitor,
    url: &'a str,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.monitor.in_flight().remove(self.url);
    }
}

pub struct HealthMonitor {
    cache: HealthCache,
    bus: HealthBus,
    primary: Arc<dyn ProbeStrategy>,
    fallback: Option<Arc<dyn ProbeStrategy>>,
    policy: RetryPolicy,
    defaults: BatchOptions,
    in_flight: Mutex<HashMap<String, watch::Receiver<Option<HealthResult>>>>,
    periodic: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    /// Monitor using `primary` only, with the default policy
    pub fn new(primary: Arc<dyn ProbeStrategy>) -> Self {
        Self {
            cache: HealthCache::new(),
            bus: HealthBus::new(),
            primary,
            fallback: None,
            policy: RetryPolicy::default(),
            defaults: BatchOptions::default(),
            in_flight: Mutex::new(HashMap::new()),
            periodic: Mutex::new(None),
        }
    }

    /// HEAD probe with favicon fallback, configured from `config`
    pub fn from_config(config: &HealthConfig) -> Result<Self> {
        let primary = Arc::new(HeadProbe::from_config(config)?);
        let fallback = Arc::new(FaviconProbe::from_config(config)?);

        info!(
            "Health monitor configured: timeout {}ms, {} retries, batches of {}",
            config.timeout_ms, config.retries, config.batch_size
        );

        Ok(Self::new(primary)
            .with_fallback(fallback)
            .with_policy(RetryPolicy::from_config(config))
            .with_defaults(config.batch_options()))
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn ProbeStrategy>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Options used by periodic re-checks
    pub fn with_defaults(mut self, defaults: BatchOptions) -> Self {
        self.defaults = defaults;
        self
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, watch::Receiver<Option<HealthResult>>>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn periodic(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.periodic.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn cache(&self) -> &HealthCache {
        &self.cache
    }

    pub fn defaults(&self) -> BatchOptions {
        self.defaults
    }

    /// Check one URL.
    ///
    /// At most one probe per URL is in flight: a concurrent caller for the
    /// same URL waits for that check and receives its result. Failures come
    /// back as unhealthy results, never as errors.
    pub async fn check_one(&self, url: &str, options: &CheckOptions) -> HealthResult {
        let url = url.trim();
        if url.is_empty() {
            warn!("Ignoring health check for an empty URL");
            return HealthResult::unknown(url);
        }

        let slot = {
            let mut in_flight = self.in_flight();
            match in_flight.get(url) {
                Some(receiver) => Slot::Waiter(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    in_flight.insert(url.to_string(), receiver);
                    Slot::Owner(sender)
                }
            }
        };

        let sender = match slot {
            Slot::Owner(sender) => sender,
            Slot::Waiter(receiver) => return self.await_in_flight(url, receiver).await,
        };
        let _guard = InFlightGuard { monitor: self, url };

        self.cache.register(url);
        debug!("Checking {}", url);

        let policy = self.policy.with_retries(options.retries);
        let outcome = policy
            .execute(self.primary.as_ref(), self.fallback.as_deref(), url, options.timeout)
            .await;

        let checked_at = Utc::now();
        let result = match self.cache.record(url, outcome.clone(), checked_at) {
            Some(result) => {
                crate::logging::log_health_result(&result);
                self.bus.publish(&HealthEvent {
                    url: url.to_string(),
                    result: result.clone(),
                });
                result
            }
            None => {
                debug!("{} was evicted during its check; result discarded", url);
                HealthResult::completed(url, outcome, 1, checked_at)
            }
        };
        let _ = sender.send(Some(result.clone()));

        result
    }

    async fn await_in_flight(
        &self,
        url: &str,
        mut receiver: watch::Receiver<Option<HealthResult>>,
    ) -> HealthResult {
        debug!("Check for {} already in flight, waiting for it", url);
        let settled = receiver
            .wait_for(|value| value.is_some())
            .await
            .ok()
            .and_then(|value| value.clone());

        // The owning check was cancelled; fall back to whatever is cached
        settled.unwrap_or_else(|| self.cache.get(url))
    }

    /// Check many URLs in sequential batches.
    ///
    /// Checks inside a batch run concurrently; the next batch starts only
    /// after the previous one settled and the pause elapsed. Duplicate and
    /// empty URLs are skipped.
    pub async fn check_many<S: AsRef<str>>(
        &self,
        urls: &[S],
        options: &BatchOptions,
    ) -> HashMap<String, HealthResult> {
        let mut seen = HashSet::new();
        let urls: Vec<&str> = urls
            .iter()
            .map(|url| url.as_ref().trim())
            .filter(|url| !url.is_empty() && seen.insert(*url))
            .collect();

        let mut results = HashMap::with_capacity(urls.len());
        if urls.is_empty() {
            return results;
        }

        let batch_size = options.batch_size.max(1);
        let batch_count = urls.len().div_ceil(batch_size);
        info!("Checking {} URLs in {} batch(es) of up to {}", urls.len(), batch_count, batch_size);

        for (index, batch) in urls.chunks(batch_size).enumerate() {
            if index > 0 && !options.delay_between_batches.is_zero() {
                tokio::time::sleep(options.delay_between_batches).await;
            }

            debug!("Starting batch {}/{} ({} URLs)", index + 1, batch_count, batch.len());
            let checks = batch.iter().map(|url| async move {
                (url.to_string(), self.check_one(url, &options.check).await)
            });

            results.extend(join_all(checks).await);
        }

        results
    }

    /// Re-check every tracked URL every `interval_minutes`, replacing any
    /// previous schedule. Zero disables nothing and is ignored.
    pub fn start_periodic(self: &Arc<Self>, interval_minutes: u64) {
        if interval_minutes == 0 {
            warn!("Ignoring periodic health check with a zero interval");
            return;
        }
        self.start_periodic_every(Duration::from_secs(interval_minutes.saturating_mul(60)));
    }

    /// Like [`start_periodic`](Self::start_periodic) with an arbitrary period,
    /// capped at [`MAX_PERIODIC_INTERVAL`]
    pub fn start_periodic_every(self: &Arc<Self>, period: Duration) {
        if period.is_zero() {
            warn!("Ignoring periodic health check with a zero interval");
            return;
        }
        if period > MAX_PERIODIC_INTERVAL {
            warn!("Capping periodic health check interval {:?} to {:?}", period, MAX_PERIODIC_INTERVAL);
        }
        let period = period.min(MAX_PERIODIC_INTERVAL);

        let monitor = Arc::downgrade(self);
        let options = self.defaults;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };

                let urls = monitor.cache.urls();
                debug!("Periodic health check of {} URLs", urls.len());
                monitor.check_many(&urls, &options).await;
            }
        });

        if let Some(previous) = self.periodic().replace(handle) {
            previous.abort();
            debug!("Replaced previous periodic health check schedule");
        }
        info!("Periodic health checks every {:?}", period);
    }

    /// Cancel the periodic schedule; no-op when none is running
    pub fn stop_periodic(&self) {
        if let Some(handle) = self.periodic().take() {
            handle.abort();
            info!("Stopped periodic health checks");
        }
    }

    pub fn is_periodic_running(&self) -> bool {
        self.periodic().as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    pub fn get_stats(&self) -> HealthStats {
        self.cache.stats()
    }

    /// Start tracking `url` without checking it
    pub fn register(&self, url: &str) -> bool {
        self.cache.register(url.trim())
    }

    /// Stop tracking `url`
    pub fn evict(&self, url: &str) {
        self.cache.remove(url.trim());
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn get(&self, url: &str) -> HealthResult {
        self.cache.get(url)
    }

    pub fn state(&self, url: &str) -> HealthState {
        if self.in_flight().contains_key(url) {
            HealthState::Checking
        } else {
            self.cache.get(url).state()
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&HealthEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(handler)
    }

    pub fn watch(&self) -> (SubscriptionToken, mpsc::UnboundedReceiver<HealthEvent>) {
        self.bus.watch()
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.bus.unsubscribe(token)
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop_periodic();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::probe::{ProbeError, ProbeResult};
    use crate::models::{ProbeOutcome, StatusCode};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Delayed {
        delay: Duration,
        calls: AtomicU32,
        healthy: bool,
    }

    impl Delayed {
        fn new(delay: Duration, healthy: bool) -> Arc<Self> {
            Arc::new(Self { delay, calls: AtomicU32::new(0), healthy })
        }
    }

    #[async_trait]
    impl ProbeStrategy for Delayed {
        fn name(&self) -> &str {
            "delayed"
        }

        async fn probe(&self, _url: &str, _timeout: Duration) -> ProbeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.healthy {
                Ok(ProbeOutcome::healthy(StatusCode::Unknown, self.delay.as_millis() as u64))
            } else {
                Err(ProbeError::Network("connection refused".to_string()))
            }
        }
    }

    fn no_retry() -> CheckOptions {
        CheckOptions { timeout: Duration::from_secs(10), retries: 0 }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_inputs_are_no_ops() {
        let probe = Delayed::new(Duration::ZERO, true);
        let monitor = HealthMonitor::new(probe.clone());

        let result = monitor.check_one("   ", &no_retry()).await;
        assert_eq!(result.is_healthy, None);

        let empty: Vec<String> = Vec::new();
        assert!(monitor.check_many(&empty, &BatchOptions::default()).await.is_empty());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
        assert!(monitor.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_is_checking_while_in_flight() {
        let probe = Delayed::new(Duration::from_millis(500), true);
        let monitor = Arc::new(HealthMonitor::new(probe));

        let running = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.check_one("https://a.dev", &no_retry()).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(monitor.state("https://a.dev"), HealthState::Checking);

        running.await.unwrap();
        assert_eq!(monitor.state("https://a.dev"), HealthState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_becomes_unhealthy_result() {
        let monitor = HealthMonitor::new(Delayed::new(Duration::ZERO, false));
        let result = monitor.check_one("https://down.dev", &no_retry()).await;

        assert_eq!(result.is_healthy, Some(false));
        assert_eq!(result.error.as_deref(), Some("connection refused"));
        assert_eq!(result.check_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_owner_releases_slot() {
        let probe = Delayed::new(Duration::from_secs(5), true);
        let monitor = HealthMonitor::new(probe.clone());

        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            monitor.check_one("https://a.dev", &no_retry()),
        )
        .await;
        assert!(cancelled.is_err());
        assert_ne!(monitor.state("https://a.dev"), HealthState::Checking);

        let result = monitor.check_one("https://a.dev", &no_retry()).await;
        assert_eq!(result.check_count, 1);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_rechecks_and_restarts() {
        let probe = Delayed::new(Duration::ZERO, true);
        let monitor = Arc::new(HealthMonitor::new(probe.clone()));
        monitor.register("https://a.dev");

        monitor.start_periodic(1);
        monitor.start_periodic(1);
        assert!(monitor.is_periodic_running());

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(monitor.get("https://a.dev").check_count, 2);

        monitor.stop_periodic();
        monitor.stop_periodic();
        assert!(!monitor.is_periodic_running());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extreme_sizes_do_not_panic() {
        let probe = Delayed::new(Duration::ZERO, true);
        let monitor = Arc::new(HealthMonitor::new(probe.clone()));
        let options = BatchOptions {
            batch_size: usize::MAX,
            delay_between_batches: Duration::from_secs(1),
            check: no_retry(),
        };

        let results = monitor.check_many(&["https://a.dev", "https://b.dev"], &options).await;
        assert_eq!(results.len(), 2);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);

        monitor.start_periodic(u64::MAX);
        assert!(monitor.is_periodic_running());
        monitor.stop_periodic();
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicted_during_check_stays_evicted() {
        let monitor = Arc::new(HealthMonitor::new(Delayed::new(Duration::from_millis(500), true)));
        let (_token, mut events) = monitor.watch();

        let running = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.check_one("https://a.dev", &no_retry()).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.evict("https://a.dev");

        let result = running.await.unwrap();
        assert_eq!(result.is_healthy, Some(true));
        assert!(!monitor.cache().contains("https://a.dev"));
        assert!(events.try_recv().is_err());
        assert!(monitor.cache().urls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_ignored() {
        let monitor = Arc::new(HealthMonitor::new(Delayed::new(Duration::ZERO, true)));
        monitor.start_periodic(0);
        assert!(!monitor.is_periodic_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_and_stats() {
        let monitor = HealthMonitor::new(Delayed::new(Duration::ZERO, true));
        monitor.check_one("https://a.dev", &no_retry()).await;
        monitor.register("https://b.dev");

        let stats = monitor.get_stats();
        assert_eq!((stats.total, stats.healthy, stats.unknown), (2, 1, 1));

        monitor.evict("https://a.dev");
        assert_eq!(monitor.get_stats().total, 1);
        monitor.clear();
        assert_eq!(monitor.get_stats().total, 0);
    }
}
