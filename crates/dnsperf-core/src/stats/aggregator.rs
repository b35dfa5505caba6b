//! Statistics aggregator
//!
//! The StatsAggregator owns the domain → [`DomainStat`] map and the durable
//! store connection. Every update runs under one coarse lock:
//!
//! ```text
//!            update(domain, latency)
//!                     │
//!            ┌────────▼────────┐
//!            │   lock (all     │
//!            │   domains)      │
//!            └────────┬────────┘
//!                     │
//!        ┌────────────┼─────────────┐
//!        ▼            ▼             ▼
//!   fold sample   update summary  append sample
//!   (in memory)   (store)         (store)
//! ```
//!
//! Persistence failures are logged and never roll back the in-memory
//! statistics; memory is the source of truth for the rest of the run.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::stats::DomainStat;
use crate::traits::{DurableStore, LatencySample};

/// State guarded by the aggregator lock
struct AggregatorState {
    stats: HashMap<String, DomainStat>,
    store: Box<dyn DurableStore>,
}

/// Shared per-domain latency statistics with write-through persistence
pub struct StatsAggregator {
    /// Map and store connection behind a single lock
    state: Mutex<AggregatorState>,

    /// Domains probed each round, in configuration order
    domains: Vec<String>,
}

impl StatsAggregator {
    /// Recover aggregator state from the durable store
    ///
    /// 1. Create the schema if needed (fatal on failure)
    /// 2. Load every summary row verbatim (fatal on failure)
    /// 3. Insert a zeroed row for each configured domain that has none;
    ///    a domain whose insert fails is logged and left out of the run
    ///
    /// The active domain set is the configured domains that were either
    /// loaded or registered. Rows for domains no longer configured stay
    /// loadable but are not probed.
    pub async fn recover(store: Box<dyn DurableStore>, configured: &[String]) -> Result<Self> {
        info!("Preparing {} store schema", store.store_name());
        store
            .ensure_schema()
            .await
            .map_err(|e| Error::store(format!("Failed to create tables: {}", e)))?;

        let rows = store
            .load_summaries()
            .await
            .map_err(|e| Error::store(format!("Failed to fetch domain summaries: {}", e)))?;

        if rows.is_empty() {
            info!("Initializing default domain statistics in the store");
        } else {
            info!("Syncing statistics for {} domain(s) from the store", rows.len());
        }

        let mut stats: HashMap<String, DomainStat> = rows
            .into_iter()
            .map(|stat| (stat.domain_name.clone(), stat))
            .collect();

        let mut seen = HashSet::new();
        let mut domains = Vec::with_capacity(configured.len());

        for domain in configured {
            if !seen.insert(domain.as_str()) {
                debug!("Domain {} listed more than once, ignoring duplicate", domain);
                continue;
            }

            if let Some(stat) = stats.get(domain) {
                debug!(
                    domain = %domain,
                    record_count = stat.record_count,
                    mean_latency = stat.mean_latency,
                    std_dev = stat.std_dev,
                    "Recovered domain statistics"
                );
                domains.push(domain.clone());
                continue;
            }

            match store.insert_summary(domain).await {
                Ok(stat) => {
                    debug!("Registered domain {}", domain);
                    stats.insert(domain.clone(), stat);
                    domains.push(domain.clone());
                }
                Err(e) => {
                    warn!("Failed to register domain {} (will be skipped): {}", domain, e);
                }
            }
        }

        info!("Monitoring {} domain(s)", domains.len());

        Ok(Self {
            state: Mutex::new(AggregatorState { stats, store }),
            domains,
        })
    }

    /// Domains probed each round
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Fold one latency sample into `domain` and write it through
    ///
    /// Holds the aggregator lock for the statistics update and both store
    /// writes. Store failures are logged and do not fail the update.
    ///
    /// # Returns
    ///
    /// - `Ok(DomainStat)`: The statistics after the update
    /// - `Err(Error::NotFound)`: `domain` is not registered (nothing changed)
    pub async fn update(&self, domain: &str, latency_usec: u64) -> Result<DomainStat> {
        let mut guard = self.state.lock().await;
        let AggregatorState { stats, store } = &mut *guard;

        let stat = stats
            .get_mut(domain)
            .ok_or_else(|| Error::not_found(domain.to_string()))?;

        stat.fold(latency_usec, Utc::now());
        let updated = stat.clone();

        debug!(
            domain = %domain,
            latency_usec,
            record_count = updated.record_count,
            mean_latency = updated.mean_latency,
            std_dev = updated.std_dev,
            "Updated domain statistics"
        );

        if let Err(e) = store.update_summary(&updated).await {
            error!("Failed to update summary for {}: {}", domain, e);
        }

        if let Err(e) = store
            .append_sample(&LatencySample::new(domain, latency_usec))
            .await
        {
            error!("Failed to record latency sample for {}: {}", domain, e);
        }

        Ok(updated)
    }

    /// Current statistics for `domain`, if it is known
    pub async fn load(&self, domain: &str) -> Option<DomainStat> {
        self.state.lock().await.stats.get(domain).cloned()
    }

    /// Current statistics for every known domain, sorted by name
    pub async fn snapshot(&self) -> Vec<DomainStat> {
        let guard = self.state.lock().await;
        let mut all: Vec<DomainStat> = guard.stats.values().cloned().collect();
        all.sort_by(|a, b| a.domain_name.cmp(&b.domain_name));
        all
    }

    /// Release the durable store connection
    pub async fn close(&self) -> Result<()> {
        let guard = self.state.lock().await;
        guard.store.close().await?;
        info!("Closed {} store", guard.store.store_name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStore;
    use std::sync::Arc;

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_recover_registers_configured_domains() {
        let store = MemoryStore::new();
        let aggregator = StatsAggregator::recover(Box::new(store.clone()), &domains(&["a.test", "b.test"]))
            .await
            .unwrap();

        assert_eq!(aggregator.domains(), &["a.test", "b.test"]);
        assert_eq!(store.summary_count().await, 2);
        assert_eq!(aggregator.load("a.test").await, Some(DomainStat::new("a.test")));
    }

    #[tokio::test]
    async fn test_recover_ignores_duplicate_domains() {
        let store = MemoryStore::new();
        let aggregator =
            StatsAggregator::recover(Box::new(store.clone()), &domains(&["a.test", "a.test"]))
                .await
                .unwrap();

        assert_eq!(aggregator.domains(), &["a.test"]);
        assert_eq!(store.summary_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_writes_through() {
        let store = MemoryStore::new();
        let aggregator = StatsAggregator::recover(Box::new(store.clone()), &domains(&["a.test"]))
            .await
            .unwrap();

        let stat = aggregator.update("a.test", 1500).await.unwrap();
        assert_eq!(stat.record_count, 1);
        assert_eq!(stat.mean_latency, 1500.0);

        let persisted = store.load_summary("a.test").await.unwrap().unwrap();
        assert_eq!(persisted, stat);

        let samples = store.list_samples("a.test").await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].latency_usec, 1500);
        assert!(samples[0].observed_at.is_some());
    }

    #[tokio::test]
    async fn test_update_unknown_domain_is_not_found() {
        let aggregator = StatsAggregator::recover(Box::new(MemoryStore::new()), &domains(&["a.test"]))
            .await
            .unwrap();

        let result = aggregator.update("unknown.test", 10).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(aggregator.load("unknown.test").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let aggregator = Arc::new(
            StatsAggregator::recover(Box::new(MemoryStore::new()), &domains(&["a.test", "b.test"]))
                .await
                .unwrap(),
        );

        let mut handles = Vec::new();
        for i in 0..100u64 {
            let aggregator = Arc::clone(&aggregator);
            let domain = if i % 3 == 0 { "a.test" } else { "b.test" };
            handles.push(tokio::spawn(async move {
                aggregator.update(domain, i).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(aggregator.load("a.test").await.unwrap().record_count, 34);
        assert_eq!(aggregator.load("b.test").await.unwrap().record_count, 66);
    }

    #[tokio::test]
    async fn test_snapshot_is_sorted() {
        let aggregator =
            StatsAggregator::recover(Box::new(MemoryStore::new()), &domains(&["z.test", "m.test", "a.test"]))
                .await
                .unwrap();

        let names: Vec<String> = aggregator
            .snapshot()
            .await
            .into_iter()
            .map(|s| s.domain_name)
            .collect();
        assert_eq!(names, vec!["a.test", "m.test", "z.test"]);
    }
}
