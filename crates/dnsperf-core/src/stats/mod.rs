//! Per-domain latency statistics
//!
//! - [`DomainStat`]: running count/mean/std-dev for one domain
//! - [`StatsAggregator`]: shared map of all domains with write-through

pub mod aggregator;
pub mod domain_stat;

pub use aggregator::StatsAggregator;
pub use domain_stat::DomainStat;
