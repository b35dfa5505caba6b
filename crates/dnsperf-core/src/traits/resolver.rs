// # Resolver Trait
//
// Defines the capability a latency probe measures: resolving one name.
//
// ## Implementations
//
// - hickory-resolver backed: `dnsperf-resolver-hickory` crate
// - Test doubles with scripted latencies (see `tests/common`)
//
// ## Construction
//
// Resolvers are built through a [`ResolverFactory`] once per probe, so a
// probe sees construction failures (e.g. an unreadable system resolver
// configuration) separately from lookup failures.
//
// ## Usage
//
// ```rust,ignore
// use dnsperf_core::traits::{Resolution, ResolverFactory};
//
// let resolver = factory.create(&config)?;
// match resolver.resolve("abcd1234.example.com").await {
//     Resolution::Response { response_code, answers } => { /* measured */ }
//     Resolution::NoResponse { reason } => { /* nothing came back */ }
// }
// ```

use async_trait::async_trait;

use crate::config::ResolverConfig;

/// Outcome of a single resolution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The resolution path answered
    ///
    /// An error response code (e.g. NXDOMAIN for a random probe label) is
    /// still an answer: the full resolution round trip happened.
    Response {
        /// DNS response code as text (`NoError`, `NXDomain`, ...)
        response_code: String,
        /// Number of answer records
        answers: usize,
    },

    /// No answer was retrieved (timeout, network failure, ...)
    NoResponse {
        /// Human-readable reason
        reason: String,
    },
}

impl Resolution {
    /// Whether any answer came back
    pub fn is_response(&self) -> bool {
        matches!(self, Resolution::Response { .. })
    }
}

/// Trait for resolver implementations
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; every probe task owns its own
/// resolver instance, but the trait object crosses task boundaries.
///
/// # Constraints
///
/// - No retries: one call is one measurement
/// - No internal caching of answers (it would defeat the measurement)
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `name` once
    async fn resolve(&self, name: &str) -> Resolution;

    /// Backend name, used in logs
    fn resolver_name(&self) -> &'static str;
}

/// Helper trait for constructing resolvers from configuration
pub trait ResolverFactory: Send + Sync {
    /// Create a Resolver instance from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn Resolver>)`: Ready-to-use resolver
    /// - `Err(Error)`: No usable configuration source
    fn create(&self, config: &ResolverConfig) -> Result<Box<dyn Resolver>, crate::Error>;
}
