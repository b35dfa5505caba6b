// # Durable Store Trait
//
// Defines the interface for persisting per-domain summaries and the
// append-only latency sample history.
//
// ## Purpose
//
// The summary rows are the recovery source: on restart the aggregator loads
// them verbatim instead of replaying samples.
//
// ## Logical Schema
//
// - Summary: domain identity (unique), domain name, record count, mean
//   latency, standard deviation, first/last update timestamps
// - Sample: generated id, reference to the summary identity (restrict
//   delete, cascade update), latency, insertion timestamp
//
// ## Implementations
//
// - In-memory: `MemoryStore` (this crate)
// - SQLite: `dnsperf-store-sqlite` crate

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::StoreConfig;
use crate::stats::DomainStat;

/// One completed probe's latency, as appended to the sample history
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LatencySample {
    /// Domain the sample belongs to
    pub domain_name: String,
    /// Measured latency in microseconds
    pub latency_usec: u64,
    /// Insertion time; assigned by the store, `None` until persisted
    pub observed_at: Option<DateTime<Utc>>,
}

impl LatencySample {
    /// Create a sample that has not been persisted yet
    pub fn new(domain_name: impl Into<String>, latency_usec: u64) -> Self {
        Self {
            domain_name: domain_name.into(),
            latency_usec,
            observed_at: None,
        }
    }
}

/// Trait for durable store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently. The aggregator serializes
/// its own writes, but recovery tooling and tests may read concurrently.
///
/// # Implementation Guidelines
///
/// - Summary writes replace all statistics columns of the row
/// - Sample inserts must reference an existing summary row
/// - `close()` releases the connection; later calls may fail
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Create the summary and sample tables if they do not exist
    async fn ensure_schema(&self) -> Result<(), crate::Error>;

    /// Load every summary row
    async fn load_summaries(&self) -> Result<Vec<DomainStat>, crate::Error>;

    /// Load the summary row for one domain
    ///
    /// # Returns
    ///
    /// - `Ok(Some(DomainStat))`: The stored summary
    /// - `Ok(None)`: No row for this domain
    /// - `Err(Error)`: Storage error
    async fn load_summary(&self, domain: &str) -> Result<Option<DomainStat>, crate::Error>;

    /// Insert a zeroed summary row for a newly configured domain
    ///
    /// Fails if the domain already has a row.
    async fn insert_summary(&self, domain: &str) -> Result<DomainStat, crate::Error>;

    /// Overwrite the statistics of an existing summary row
    async fn update_summary(&self, stat: &DomainStat) -> Result<(), crate::Error>;

    /// Append one sample to the history of an existing domain
    async fn append_sample(&self, sample: &LatencySample) -> Result<(), crate::Error>;

    /// List the sample history of one domain, oldest first
    async fn list_samples(&self, domain: &str) -> Result<Vec<LatencySample>, crate::Error>;

    /// Release the underlying connection
    async fn close(&self) -> Result<(), crate::Error>;

    /// Backend name, used in logs
    fn store_name(&self) -> &'static str;
}

/// Helper trait for constructing durable stores from configuration
pub trait DurableStoreFactory: Send + Sync {
    /// Create a DurableStore instance from configuration
    ///
    /// Fails when the store is unreachable (fatal at startup).
    fn create(&self, config: &StoreConfig) -> Result<Box<dyn DurableStore>, crate::Error>;
}
