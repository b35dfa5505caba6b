// # Hickory Resolver Backend
//
// This crate provides the production Resolver for the dnsperf monitor,
// backed by hickory-resolver.
//
// ## Purpose
//
// Every probe builds a fresh resolver from either:
// - The host's resolver configuration (/etc/resolv.conf and friends)
// - A well-known public resolver (Google, Cloudflare, Quad9)
//
// ## Measurement Rules
//
// - The answer cache is disabled; a cached answer is not a resolution
// - One attempt per query; a retry would be a second measurement
// - An error response code (NXDOMAIN for the random probe label) still
//   counts as an answer: the full round trip happened

use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig as HickoryConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use tracing::debug;

use dnsperf_core::config::{PublicResolver, ResolverConfig};
use dnsperf_core::traits::{Resolution, Resolver, ResolverFactory};
use dnsperf_core::{BackendRegistry, Error, Result};

/// Resolver backed by a hickory `TokioAsyncResolver`
pub struct HickoryResolver {
    inner: TokioAsyncResolver,
    source: &'static str,
}

impl HickoryResolver {
    /// Resolver using the host's resolver configuration
    ///
    /// Fails when the system configuration cannot be read; there is nothing
    /// to query in that case.
    pub fn system(timeout: Option<Duration>) -> Result<Self> {
        let (config, opts) = hickory_resolver::system_conf::read_system_conf().map_err(|e| {
            Error::resolver(format!("Failed to read system resolver configuration: {}", e))
        })?;

        Ok(Self::with_config(config, opts, timeout, "system"))
    }

    /// Resolver querying a well-known public resolver
    pub fn public(provider: PublicResolver, timeout: Option<Duration>) -> Self {
        let (config, source) = match provider {
            PublicResolver::Google => (HickoryConfig::google(), "google"),
            PublicResolver::Cloudflare => (HickoryConfig::cloudflare(), "cloudflare"),
            PublicResolver::Quad9 => (HickoryConfig::quad9(), "quad9"),
        };

        Self::with_config(config, ResolverOpts::default(), timeout, source)
    }

    fn with_config(
        config: HickoryConfig,
        mut opts: ResolverOpts,
        timeout: Option<Duration>,
        source: &'static str,
    ) -> Self {
        opts.cache_size = 0;
        opts.attempts = 1;
        if let Some(timeout) = timeout {
            opts.timeout = timeout;
        }

        Self {
            inner: TokioAsyncResolver::tokio(config, opts),
            source,
        }
    }

    /// Where queries are sent (`system`, `google`, ...)
    pub fn source(&self) -> &'static str {
        self.source
    }
}

#[async_trait]
impl Resolver for HickoryResolver {
    async fn resolve(&self, name: &str) -> Resolution {
        let result = self
            .inner
            .lookup_ip(name)
            .await
            .map(|lookup| lookup.iter().count());

        let resolution = classify(result);
        debug!(name = %name, source = self.source, ?resolution, "Lookup finished");
        resolution
    }

    fn resolver_name(&self) -> &'static str {
        "hickory"
    }
}

/// Map a lookup result onto answered / unanswered
fn classify(result: std::result::Result<usize, ResolveError>) -> Resolution {
    match result {
        Ok(answers) => Resolution::Response {
            response_code: "NoError".to_string(),
            answers,
        },
        Err(e) => match e.kind() {
            ResolveErrorKind::NoRecordsFound { response_code, .. } => Resolution::Response {
                response_code: format!("{:?}", response_code),
                answers: 0,
            },
            _ => Resolution::NoResponse {
                reason: e.to_string(),
            },
        },
    }
}

/// Factory for creating hickory resolvers
pub struct HickoryFactory;

impl ResolverFactory for HickoryFactory {
    fn create(&self, config: &ResolverConfig) -> Result<Box<dyn Resolver>> {
        match config {
            ResolverConfig::System { .. } => Ok(Box::new(HickoryResolver::system(config.timeout())?)),
            ResolverConfig::Public { provider, .. } => {
                Ok(Box::new(HickoryResolver::public(*provider, config.timeout())))
            }
            ResolverConfig::Custom { .. } => Err(Error::config("Invalid config for hickory resolver")),
        }
    }
}

/// Register the hickory resolver with a registry
pub fn register(registry: &BackendRegistry) {
    registry.register_resolver("hickory", Box::new(HickoryFactory));
}
