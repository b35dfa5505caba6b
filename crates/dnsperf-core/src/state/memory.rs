// # Memory Store
//
// In-memory implementation of DurableStore.
//
// ## Purpose
//
// Provides a fast store that doesn't persist across restarts. Useful for
// testing and for dry runs where only the live statistics matter.
//
// ## Crash Behavior
//
// - All summaries and samples are lost on restart/crash
// - First run after a restart registers every domain with zeroed statistics

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::stats::DomainStat;
use crate::traits::durable_store::{DurableStore, DurableStoreFactory, LatencySample};
use crate::Error;

/// In-memory durable store implementation
///
/// Summaries and samples live in a map protected by a RwLock. Clones share
/// the same underlying state, so a test can keep a handle for inspection
/// after handing a boxed clone to the aggregator.
///
/// # Example
///
/// ```rust,no_run
/// use dnsperf_core::state::MemoryStore;
/// use dnsperf_core::traits::DurableStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///     store.ensure_schema().await?;
///
///     let stat = store.insert_summary("example.com").await?;
///     assert_eq!(stat.record_count, 0);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    summaries: HashMap<String, DomainStat>,
    samples: Vec<LatencySample>,
    closed: bool,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryState::default())),
        }
    }

    /// Create a memory store pre-populated with summary rows
    pub fn with_summaries(summaries: impl IntoIterator<Item = DomainStat>) -> Self {
        let state = MemoryState {
            summaries: summaries
                .into_iter()
                .map(|stat| (stat.domain_name.clone(), stat))
                .collect(),
            ..MemoryState::default()
        };

        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Number of summary rows
    pub async fn summary_count(&self) -> usize {
        self.inner.read().await.summaries.len()
    }

    /// Number of sample rows across all domains
    pub async fn sample_count(&self) -> usize {
        self.inner.read().await.samples.len()
    }

    /// Whether `close()` has been called
    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.closed
    }

    fn ensure_open(state: &MemoryState) -> Result<(), Error> {
        if state.closed {
            return Err(Error::store("memory store is closed"));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), Error> {
        // Nothing to create
        Self::ensure_open(&*self.inner.read().await)
    }

    async fn load_summaries(&self) -> Result<Vec<DomainStat>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.summaries.values().cloned().collect())
    }

    async fn load_summary(&self, domain: &str) -> Result<Option<DomainStat>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.summaries.get(domain).cloned())
    }

    async fn insert_summary(&self, domain: &str) -> Result<DomainStat, Error> {
        let mut guard = self.inner.write().await;
        Self::ensure_open(&guard)?;

        if guard.summaries.contains_key(domain) {
            return Err(Error::store(format!("summary row for {} already exists", domain)));
        }

        let stat = DomainStat::new(domain);
        guard.summaries.insert(domain.to_string(), stat.clone());
        Ok(stat)
    }

    async fn update_summary(&self, stat: &DomainStat) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        Self::ensure_open(&guard)?;

        let row = guard
            .summaries
            .get_mut(&stat.domain_name)
            .ok_or_else(|| Error::not_found(stat.domain_name.clone()))?;
        *row = stat.clone();
        Ok(())
    }

    async fn append_sample(&self, sample: &LatencySample) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        Self::ensure_open(&guard)?;

        if !guard.summaries.contains_key(&sample.domain_name) {
            return Err(Error::not_found(sample.domain_name.clone()));
        }

        let mut sample = sample.clone();
        sample.observed_at = Some(chrono::Utc::now());
        guard.samples.push(sample);
        Ok(())
    }

    async fn list_samples(&self, domain: &str) -> Result<Vec<LatencySample>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .samples
            .iter()
            .filter(|s| s.domain_name == domain)
            .cloned()
            .collect())
    }

    async fn close(&self) -> Result<(), Error> {
        self.inner.write().await.closed = true;
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for creating memory stores
pub struct MemoryStoreFactory;

impl DurableStoreFactory for MemoryStoreFactory {
    fn create(&self, config: &StoreConfig) -> Result<Box<dyn DurableStore>, Error> {
        match config {
            StoreConfig::Memory => Ok(Box::new(MemoryStore::new())),
            _ => Err(Error::config("Invalid config for memory store")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();
        store.ensure_schema().await.unwrap();

        assert_eq!(store.summary_count().await, 0);

        let stat = store.insert_summary("example.com").await.unwrap();
        assert_eq!(stat, DomainStat::new("example.com"));
        assert_eq!(store.summary_count().await, 1);

        // Duplicate insert fails
        assert!(store.insert_summary("example.com").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        store.insert_summary("example.com").await.unwrap();

        let mut stat = DomainStat::with_summary("example.com", 7, 1234.5, 67.25);
        stat.first_update_time = Some(chrono::Utc::now());
        stat.last_update_time = stat.first_update_time;
        store.update_summary(&stat).await.unwrap();

        assert_eq!(store.load_summary("example.com").await.unwrap(), Some(stat));
    }

    #[tokio::test]
    async fn test_memory_store_samples_need_summary() {
        let store = MemoryStore::new();

        let orphan = LatencySample::new("nowhere.test", 10);
        assert!(store.append_sample(&orphan).await.is_err());

        store.insert_summary("example.com").await.unwrap();
        store
            .append_sample(&LatencySample::new("example.com", 10))
            .await
            .unwrap();
        store
            .append_sample(&LatencySample::new("example.com", 20))
            .await
            .unwrap();

        let samples = store.list_samples("example.com").await.unwrap();
        let latencies: Vec<u64> = samples.iter().map(|s| s.latency_usec).collect();
        assert_eq!(latencies, vec![10, 20]);
        assert!(samples.iter().all(|s| s.observed_at.is_some()));
    }

    #[tokio::test]
    async fn test_memory_store_rejects_writes_after_close() {
        let store = MemoryStore::new();
        store.insert_summary("example.com").await.unwrap();
        store.close().await.unwrap();

        assert!(store.is_closed().await);
        assert!(store
            .append_sample(&LatencySample::new("example.com", 10))
            .await
            .is_err());
        // Reads still work for inspection
        assert!(store.load_summary("example.com").await.unwrap().is_some());
    }
}
