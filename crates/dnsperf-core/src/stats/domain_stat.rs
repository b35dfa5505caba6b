//! Running latency statistics for one domain

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running summary of every latency sample observed for a domain
///
/// Mean and standard deviation are maintained online: each new sample is
/// folded in without keeping the sample history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainStat {
    /// Domain name (identity key)
    pub domain_name: String,
    /// Number of samples folded in
    pub record_count: u64,
    /// Mean latency in microseconds
    pub mean_latency: f64,
    /// Sample standard deviation (Bessel-corrected) in microseconds
    pub std_dev: f64,
    /// Time of the first folded sample
    pub first_update_time: Option<DateTime<Utc>>,
    /// Time of the most recent folded sample
    pub last_update_time: Option<DateTime<Utc>>,
}

impl DomainStat {
    /// Create zeroed statistics for a newly registered domain
    pub fn new(domain_name: impl Into<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            record_count: 0,
            mean_latency: 0.0,
            std_dev: 0.0,
            first_update_time: None,
            last_update_time: None,
        }
    }

    /// Create statistics from an existing summary (e.g. a recovered row)
    pub fn with_summary(
        domain_name: impl Into<String>,
        record_count: u64,
        mean_latency: f64,
        std_dev: f64,
    ) -> Self {
        Self {
            record_count,
            mean_latency,
            std_dev,
            ..Self::new(domain_name)
        }
    }

    /// Fold one latency sample into the running statistics
    ///
    /// The spread is undefined for a single sample, so `std_dev` stays 0.0
    /// until a second sample arrives. From then on the update keeps `std_dev`
    /// equal to the sample standard deviation of every folded latency.
    ///
    /// `first_update_time` is set only when this is the first sample;
    /// `last_update_time` is always refreshed.
    pub fn fold(&mut self, latency_usec: u64, at: DateTime<Utc>) {
        let latency = latency_usec as f64;
        let old_count = self.record_count;
        let new_count = old_count + 1;
        let old_mean = self.mean_latency;
        let old_std_dev = self.std_dev;

        let new_mean = (old_mean * old_count as f64 + latency) / new_count as f64;

        // Not `old_count > 1`: samples 100 then 300 must give sd ≈ 141.42, not 0
        let new_std_dev = if old_count >= 1 {
            let variance = ((old_count - 1) as f64 * old_std_dev * old_std_dev
                + (latency - old_mean) * (latency - new_mean))
                / (new_count - 1) as f64;
            // rounding can push a zero variance a hair below 0
            variance.max(0.0).sqrt()
        } else {
            0.0
        };

        self.record_count = new_count;
        self.mean_latency = new_mean;
        self.std_dev = new_std_dev;

        if new_count == 1 {
            self.first_update_time = Some(at);
        }
        self.last_update_time = Some(at);
    }
}
