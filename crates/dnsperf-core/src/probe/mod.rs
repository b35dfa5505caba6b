//! Latency probe
//!
//! A probe measures one full resolution of one domain:
//!
//! 1. Prefix the domain with a random 8-character label so no cache between
//!    us and the authoritative servers can answer
//! 2. Build a fresh resolver from the configured factory
//! 3. Time the resolve call (monotonic clock, microseconds)
//!
//! The probe touches no shared state; the scheduler hands its report to the
//! aggregator.

use std::sync::Arc;

use rand::Rng;
use rand::distr::Alphanumeric;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::traits::{Resolution, ResolverFactory};

/// Length of the random label prepended to every probed domain
pub const PROBE_LABEL_LEN: usize = 8;

/// A successful latency measurement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// Configured domain
    pub domain: String,
    /// Name actually queried (random label + domain)
    pub query_name: String,
    /// Time spent in the resolve call, in microseconds
    pub latency_usec: u64,
    /// Response code of the answer
    pub response_code: String,
    /// Number of answer records
    pub answers: usize,
}

/// Why a probe produced no latency sample
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The resolver could not be built; nothing was sent
    #[error("resolver unavailable for {domain}: {reason}")]
    ResolverUnavailable {
        /// Configured domain
        domain: String,
        /// Construction failure
        reason: String,
    },

    /// The query was sent but no answer came back
    #[error("no answer for {domain} after {latency_usec}us: {reason}")]
    NoAnswer {
        /// Configured domain
        domain: String,
        /// Time spent waiting, in microseconds
        latency_usec: u64,
        /// Resolver-reported reason
        reason: String,
    },
}

impl ProbeError {
    /// Configured domain the failure belongs to
    pub fn domain(&self) -> &str {
        match self {
            ProbeError::ResolverUnavailable { domain, .. } | ProbeError::NoAnswer { domain, .. } => {
                domain
            }
        }
    }

    /// Elapsed latency, when the query was actually sent
    pub fn latency_usec(&self) -> Option<u64> {
        match self {
            ProbeError::ResolverUnavailable { .. } => None,
            ProbeError::NoAnswer { latency_usec, .. } => Some(*latency_usec),
        }
    }
}

/// Measures resolution latency using an injected resolver backend
#[derive(Clone)]
pub struct LatencyProbe {
    factory: Arc<dyn ResolverFactory>,
    config: ResolverConfig,
}

impl LatencyProbe {
    /// Create a probe that builds resolvers from `factory` with `config`
    pub fn new(factory: Arc<dyn ResolverFactory>, config: ResolverConfig) -> Self {
        Self { factory, config }
    }

    /// Measure one resolution of `domain`
    ///
    /// # Returns
    ///
    /// - `Ok(ProbeReport)`: An answer came back; latency is valid
    /// - `Err(ProbeError::ResolverUnavailable)`: Failed before sending
    /// - `Err(ProbeError::NoAnswer)`: Sent, timed, but nothing came back
    pub async fn probe(&self, domain: &str) -> Result<ProbeReport, ProbeError> {
        let resolver = self
            .factory
            .create(&self.config)
            .map_err(|e| ProbeError::ResolverUnavailable {
                domain: domain.to_string(),
                reason: e.to_string(),
            })?;

        let query_name = probe_name(domain);

        let started = Instant::now();
        let resolution = resolver.resolve(&query_name).await;
        let latency_usec = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

        debug!(
            domain = %domain,
            query = %query_name,
            resolver = resolver.resolver_name(),
            latency_usec,
            "Probe finished"
        );

        match resolution {
            Resolution::Response {
                response_code,
                answers,
            } => Ok(ProbeReport {
                domain: domain.to_string(),
                query_name,
                latency_usec,
                response_code,
                answers,
            }),
            Resolution::NoResponse { reason } => Err(ProbeError::NoAnswer {
                domain: domain.to_string(),
                latency_usec,
                reason,
            }),
        }
    }
}

/// Build the cache-busting query name for `domain`
pub fn probe_name(domain: &str) -> String {
    let label: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(PROBE_LABEL_LEN)
        .map(char::from)
        .collect();
    format!("{}.{}", label, domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Resolver;
    use crate::Error;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedResolver {
        delay: Duration,
        resolution: Resolution,
        queried: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Resolver for FixedResolver {
        async fn resolve(&self, name: &str) -> Resolution {
            self.queried.lock().unwrap().push(name.to_string());
            tokio::time::advance(self.delay).await;
            self.resolution.clone()
        }

        fn resolver_name(&self) -> &'static str {
            "fixed"
        }
    }

    struct FixedFactory {
        delay: Duration,
        resolution: Option<Resolution>,
        queried: Arc<Mutex<Vec<String>>>,
    }

    impl ResolverFactory for FixedFactory {
        fn create(&self, _config: &ResolverConfig) -> Result<Box<dyn Resolver>, Error> {
            let resolution = self
                .resolution
                .clone()
                .ok_or_else(|| Error::resolver("no nameservers configured"))?;
            Ok(Box::new(FixedResolver {
                delay: self.delay,
                resolution,
                queried: Arc::clone(&self.queried),
            }))
        }
    }

    fn probe_with(delay: Duration, resolution: Option<Resolution>) -> (LatencyProbe, Arc<Mutex<Vec<String>>>) {
        let queried = Arc::new(Mutex::new(Vec::new()));
        let factory = FixedFactory {
            delay,
            resolution,
            queried: Arc::clone(&queried),
        };
        (
            LatencyProbe::new(Arc::new(factory), ResolverConfig::default()),
            queried,
        )
    }

    fn answered() -> Resolution {
        Resolution::Response {
            response_code: "NXDomain".to_string(),
            answers: 0,
        }
    }

    #[test]
    fn test_probe_name_has_random_label() {
        let name = probe_name("example.com");
        let (label, rest) = name.split_once('.').unwrap();

        assert_eq!(rest, "example.com");
        assert_eq!(label.len(), PROBE_LABEL_LEN);
        assert!(label.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(probe_name("example.com"), probe_name("example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_measures_resolve_call() {
        let (probe, queried) = probe_with(Duration::from_micros(2500), Some(answered()));

        let report = probe.probe("example.com").await.unwrap();
        assert_eq!(report.domain, "example.com");
        assert_eq!(report.latency_usec, 2500);
        assert_eq!(report.response_code, "NXDomain");

        let queried = queried.lock().unwrap();
        assert_eq!(queried.len(), 1);
        assert_eq!(queried[0], report.query_name);
        assert!(queried[0].ends_with(".example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_reports_latency_without_answer() {
        let (probe, _) = probe_with(
            Duration::from_millis(5),
            Some(Resolution::NoResponse {
                reason: "request timed out".to_string(),
            }),
        );

        let err = probe.probe("example.com").await.unwrap_err();
        assert_eq!(err.domain(), "example.com");
        assert_eq!(err.latency_usec(), Some(5000));
        assert!(matches!(err, ProbeError::NoAnswer { .. }));
    }

    #[tokio::test]
    async fn test_probe_fails_fast_without_resolver() {
        let (probe, queried) = probe_with(Duration::ZERO, None);

        let err = probe.probe("example.com").await.unwrap_err();
        assert!(matches!(err, ProbeError::ResolverUnavailable { .. }));
        assert_eq!(err.latency_usec(), None);
        assert!(queried.lock().unwrap().is_empty(), "nothing may be sent");
    }
}
