//! Health check CLI commands

use crate::config::settings::AppConfig;
use crate::health::{HealthEvent, HealthMonitor};
use crate::models::{HealthResult, HealthStats, StatusCode};
use crate::storage::{BookmarkStore, FileStorage};
use crate::utils::{format_timestamp, normalize_url};
use anyhow::{anyhow, Result};
use clap::Args;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// URLs to check; saved bookmarks are checked when none are given
    pub urls: Vec<String>,

    /// Primary probe timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Extra attempts after a failed probe
    #[arg(long)]
    pub retries: Option<u32>,

    /// URLs checked concurrently per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Print results as JSON
    #[arg(long, default_value = "false")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Minutes between full re-checks
    #[arg(long)]
    pub interval_minutes: Option<u64>,
}

impl CheckArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(timeout) = self.timeout_ms {
            config.health.timeout_ms = timeout;
        }
        if let Some(retries) = self.retries {
            config.health.retries = retries;
        }
        if let Some(batch_size) = self.batch_size {
            config.health.batch_size = batch_size;
        }
    }

    /// Check the given URLs (or every saved bookmark) and print a report
    pub async fn execute(&self, config: &AppConfig) -> Result<()> {
        let mut config = config.clone();
        self.apply(&mut config);

        let urls = if self.urls.is_empty() {
            saved_urls(&config)?
        } else {
            normalize_all(&self.urls)?
        };

        if urls.is_empty() {
            info!("Nothing to check");
            return Ok(());
        }

        let monitor = HealthMonitor::from_config(&config.health)?;
        let results = monitor.check_many(&urls, &config.health.batch_options()).await;
        let stats = monitor.get_stats();

        if self.json {
            let report = serde_json::json!({ "results": results, "stats": stats });
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            for url in &urls {
                if let Some(result) = results.get(url) {
                    println!("{}", describe(result));
                }
            }
            println!("{}", describe_stats(&stats));
        }

        Ok(())
    }
}

impl WatchArgs {
    /// Track every saved bookmark and print each completed check until Ctrl-C
    pub async fn execute(&self, config: &AppConfig) -> Result<()> {
        let minutes = self
            .interval_minutes
            .or(config.health.periodic_interval_minutes)
            .unwrap_or(5);
        if minutes == 0 {
            return Err(anyhow!("Watch interval must be at least one minute"));
        }

        let urls = saved_urls(config)?;
        let monitor = Arc::new(HealthMonitor::from_config(&config.health)?);
        for url in &urls {
            monitor.register(url);
        }

        let (token, mut events) = monitor.watch();
        info!("👀 Watching {} bookmarks every {} minute(s)", urls.len(), minutes);

        // Initial pass so results appear without waiting a full interval
        let initial = Arc::clone(&monitor);
        let options = config.health.batch_options();
        let first_pass = tokio::spawn(async move {
            initial.check_many(&urls, &options).await;
        });
        monitor.start_periodic(minutes);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(HealthEvent { result, .. }) => println!("{}", describe(&result)),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Stopping watch");
                    break;
                }
            }
        }

        first_pass.abort();
        monitor.stop_periodic();
        monitor.unsubscribe(token);
        println!("{}", describe_stats(&monitor.get_stats()));
        Ok(())
    }
}

fn saved_urls(config: &AppConfig) -> Result<Vec<String>> {
    let storage = FileStorage::new(&config.storage.data_dir)?;
    let store = BookmarkStore::open(Box::new(storage));
    debug!("Loaded {} saved URLs", store.list().len());
    Ok(store.urls())
}

fn normalize_all(inputs: &[String]) -> Result<Vec<String>> {
    let mut urls = Vec::with_capacity(inputs.len());
    for input in inputs {
        match normalize_url(input) {
            Ok(url) => urls.push(url),
            Err(e) => {
                warn!("Skipping '{}': {}", input, e);
            }
        }
    }
    if urls.is_empty() && !inputs.is_empty() {
        return Err(anyhow!("None of the given URLs are valid"));
    }
    Ok(urls)
}

/// One-line human summary of a result
pub fn describe(result: &HealthResult) -> String {
    let status = result
        .status_code
        .as_ref()
        .map(StatusCode::to_string)
        .unwrap_or_else(|| "-".to_string());

    let verdict = match result.is_healthy {
        Some(true) => "✅ healthy",
        Some(false) => "❌ unhealthy",
        None => "❔ unchecked",
    };

    let mut line = format!("{} {} [{}]", verdict, result.url, status);
    if let Some(ms) = result.response_time_ms {
        line.push_str(&format!(" {}ms", ms));
    }
    line.push_str(&format!(" (check #{})", result.check_count));
    if let Some(error) = &result.error {
        line.push_str(&format!(" - {}", error));
    }
    if let Some(checked_at) = result.last_checked_at {
        line.push_str(&format!(" at {}", format_timestamp(checked_at)));
    }
    line
}

pub fn describe_stats(stats: &HealthStats) -> String {
    format!(
        "📊 {} total, {} healthy, {} unhealthy, {} unknown ({}% healthy)",
        stats.total, stats.healthy, stats.unhealthy, stats.unknown, stats.healthy_percentage
    )
}
