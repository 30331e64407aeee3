//! In-memory store of the latest health result per URL

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::models::{HealthResult, HealthStats, ProbeOutcome};

/// Authoritative store of health results.
///
/// Callers always receive clones; stored values are only replaced wholesale.
#[derive(Debug, Default)]
pub struct HealthCache {
    entries: Mutex<HashMap<String, HealthResult>>,
}

impl HealthCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, HealthResult>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stored result, or the never-checked value when absent
    pub fn get(&self, url: &str) -> HealthResult {
        self.entries()
            .get(url)
            .cloned()
            .unwrap_or_else(|| HealthResult::unknown(url))
    }

    pub fn set(&self, url: &str, result: HealthResult) {
        self.entries().insert(url.to_string(), result);
    }

    /// Start tracking `url` with the unknown value; returns false if it was already tracked
    pub fn register(&self, url: &str) -> bool {
        let mut entries = self.entries();
        if entries.contains_key(url) {
            return false;
        }
        entries.insert(url.to_string(), HealthResult::unknown(url));
        debug!("Registered {} for health monitoring", url);
        true
    }

    /// Store a completed check, bumping the check count under the same lock.
    ///
    /// Only tracked URLs are updated: a URL evicted while its check was in
    /// flight stays evicted and `None` is returned.
    pub fn record(&self, url: &str, outcome: ProbeOutcome, checked_at: DateTime<Utc>) -> Option<HealthResult> {
        let mut entries = self.entries();
        let entry = entries.get_mut(url)?;
        let result = HealthResult::completed(url, outcome, entry.check_count.saturating_add(1), checked_at);
        *entry = result.clone();
        Some(result)
    }

    pub fn remove(&self, url: &str) {
        if self.entries().remove(url).is_some() {
            debug!("Evicted {} from health cache", url);
        }
    }

    pub fn clear(&self) {
        let mut entries = self.entries();
        let count = entries.len();
        entries.clear();
        info!("Cleared health cache ({} entries removed)", count);
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every tracked URL, sorted
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.entries().keys().cloned().collect();
        urls.sort();
        urls
    }

    pub fn stats(&self) -> HealthStats {
        let (mut healthy, mut unhealthy, mut unknown) = (0, 0, 0);
        for result in self.entries().values() {
            match result.is_healthy {
                Some(true) => healthy += 1,
                Some(false) => unhealthy += 1,
                None => unknown += 1,
            }
        }
        HealthStats::from_counts(healthy, unhealthy, unknown)
    }

    /// Snapshot of every entry for backup
    pub fn export_all(&self) -> HashMap<String, HealthResult> {
        self.entries().clone()
    }

    /// Overwrite matching keys and add new ones; keys absent from `snapshot` are kept
    pub fn import_all(&self, snapshot: HashMap<String, HealthResult>) {
        let count = snapshot.len();
        self.entries().extend(snapshot);
        debug!("Imported {} health results", count);
    }
}
