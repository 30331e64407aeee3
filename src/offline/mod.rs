//! Offline request cache with cache-first, network-first and
//! stale-while-revalidate routing

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::settings::OfflineCacheConfig;
use crate::error::Result;

/// How a request is served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStrategy {
    /// Static assets: cache if present, else fetch and store
    CacheFirst,
    /// API-like paths: network, then cache, then the offline response
    NetworkFirst,
    /// Everything else: cached copy now, refreshed in the background
    StaleWhileRevalidate,
}

/// Where a served response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Network,
    Offline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(status: u16, body: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            status,
            body: body.into(),
            content_type,
            stored_at: Utc::now(),
        }
    }

    /// Generic response when neither network nor cache can answer
    pub fn offline() -> Self {
        Self::new(503, "Offline", Some("text/plain".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Served {
    pub response: CachedResponse,
    pub source: Source,
}

/// Network access used by the cache
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<CachedResponse>;
}

/// [`Fetcher`] backed by a reqwest client
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<CachedResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        Ok(CachedResponse::new(status, body, content_type))
    }
}

/// Pick the strategy for `url` from its path
pub fn classify(url: &str, config: &OfflineCacheConfig) -> CacheStrategy {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let path = path.to_lowercase();

    let extension = path
        .rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext);

    if let Some(ext) = extension {
        if config.static_extensions.iter().any(|s| s.eq_ignore_ascii_case(ext)) {
            return CacheStrategy::CacheFirst;
        }
        if ext == "json" {
            return CacheStrategy::NetworkFirst;
        }
    }

    if config.api_path_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str())) {
        return CacheStrategy::NetworkFirst;
    }

    CacheStrategy::StaleWhileRevalidate
}

type Entries = Arc<Mutex<HashMap<String, CachedResponse>>>;

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<String, CachedResponse>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Only complete 200 responses are stored
fn store_if_ok(entries: &Entries, url: &str, response: &CachedResponse) {
    if response.status == 200 {
        lock(entries).insert(url.to_string(), response.clone());
        debug!("Cached response for {}", url);
    }
}

pub struct OfflineCache {
    fetcher: Arc<dyn Fetcher>,
    entries: Entries,
    config: OfflineCacheConfig,
}

impl OfflineCache {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: OfflineCacheConfig) -> Self {
        Self {
            fetcher,
            entries: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    pub fn cached(&self, url: &str) -> Option<CachedResponse> {
        lock(&self.entries).get(url).cloned()
    }

    pub fn insert(&self, url: &str, response: CachedResponse) {
        lock(&self.entries).insert(url.to_string(), response);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serve `url` according to its strategy. Network errors never escape:
    /// the worst case is the generic offline response. Entries older than
    /// `max_age_days` are dropped first and never served.
    pub async fn handle(&self, url: &str) -> Served {
        self.prune(Utc::now());
        match classify(url, &self.config) {
            CacheStrategy::CacheFirst => self.cache_first(url).await,
            CacheStrategy::NetworkFirst => self.network_first(url).await,
            CacheStrategy::StaleWhileRevalidate => self.stale_while_revalidate(url).await,
        }
    }

    async fn fetch_and_store(&self, url: &str) -> Result<CachedResponse> {
        let response = self.fetcher.fetch(url).await?;
        store_if_ok(&self.entries, url, &response);
        Ok(response)
    }

    fn from_network_or_offline(url: &str, result: Result<CachedResponse>) -> Served {
        match result {
            Ok(response) => Served { response, source: Source::Network },
            Err(e) => {
                warn!("Fetch of {} failed with nothing cached: {}", url, e);
                Served { response: CachedResponse::offline(), source: Source::Offline }
            }
        }
    }

    async fn cache_first(&self, url: &str) -> Served {
        if let Some(response) = self.cached(url) {
            return Served { response, source: Source::Cache };
        }
        Self::from_network_or_offline(url, self.fetch_and_store(url).await)
    }

    async fn network_first(&self, url: &str) -> Served {
        match self.fetch_and_store(url).await {
            Ok(response) => Served { response, source: Source::Network },
            Err(e) => match self.cached(url) {
                Some(response) => {
                    debug!("Network failed for {}, serving cached copy: {}", url, e);
                    Served { response, source: Source::Cache }
                }
                None => Self::from_network_or_offline(url, Err(e)),
            },
        }
    }

    async fn stale_while_revalidate(&self, url: &str) -> Served {
        match self.cached(url) {
            Some(response) => {
                let fetcher = Arc::clone(&self.fetcher);
                let entries = Arc::clone(&self.entries);
                let url = url.to_string();
                tokio::spawn(async move {
                    match fetcher.fetch(&url).await {
                        Ok(fresh) => store_if_ok(&entries, &url, &fresh),
                        Err(e) => debug!("Background refresh of {} failed: {}", url, e),
                    }
                });
                Served { response, source: Source::Cache }
            }
            None => Self::from_network_or_offline(url, self.fetch_and_store(url).await),
        }
    }

    /// Drop entries stored more than `max_age_days` before `now`
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - ChronoDuration::days(self.config.max_age_days);
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, response| response.stored_at >= cutoff);

        let removed = before - entries.len();
        if removed > 0 {
            info!("Pruned {} stale offline cache entries", removed);
        }
        removed
    }
}
