//! Configuration types for the dnsperf system
//!
//! This module defines all configuration structures used throughout the crate,
//! plus the domain-list loader used at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Domains monitored when no domain list is supplied (or the file is absent)
pub const DEFAULT_DOMAINS: &[&str] = &[
    "google.com",
    "facebook.com",
    "youtube.com",
    "yahoo.com",
    "live.com",
    "wikipedia.org",
    "baidu.com",
    "blogger.com",
    "msn.com",
    "qq.com",
];

/// Main monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Domains to probe every round
    pub domains: Vec<String>,

    /// Round scheduling settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Resolver backend configuration
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Durable store backend configuration
    #[serde(default)]
    pub store: StoreConfig,
}

impl MonitorConfig {
    /// Create a configuration for the given domains with default settings
    pub fn new(domains: Vec<String>) -> Self {
        Self {
            domains,
            scheduler: SchedulerConfig::default(),
            resolver: ResolverConfig::default(),
            store: StoreConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.domains.is_empty() {
            return Err(crate::Error::config("No domains configured"));
        }

        for domain in &self.domains {
            validate_domain_name(domain)?;
        }

        self.scheduler.validate()?;
        self.resolver.validate()?;
        self.store.validate()?;

        Ok(())
    }
}

/// Round scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Sleep between the end of one round and the start of the next, in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Capacity of the scheduler event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl SchedulerConfig {
    /// Create a scheduler configuration with the given interval
    pub fn with_interval_secs(interval_secs: u64) -> Self {
        Self {
            interval_secs,
            ..Self::default()
        }
    }

    /// Inter-round sleep as a `Duration`
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validate the scheduler configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Polling interval must be > 0 seconds"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_interval_secs() -> u64 {
    10
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Resolver backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolverConfig {
    /// Use the host's resolver configuration (e.g. /etc/resolv.conf)
    System {
        /// Per-query timeout in seconds (resolver default when unset)
        #[serde(default)]
        timeout_secs: Option<u64>,
    },

    /// Use a well-known public resolver
    Public {
        /// Which public resolver to query
        provider: PublicResolver,
        /// Per-query timeout in seconds (resolver default when unset)
        #[serde(default)]
        timeout_secs: Option<u64>,
    },

    /// Custom resolver backend
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ResolverConfig {
    /// Validate the resolver configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ResolverConfig::System { timeout_secs } | ResolverConfig::Public { timeout_secs, .. } => {
                if *timeout_secs == Some(0) {
                    return Err(crate::Error::config("Resolver timeout must be > 0 seconds"));
                }
                Ok(())
            }
            ResolverConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom resolver factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom resolver config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the name of the backend that serves this configuration
    pub fn type_name(&self) -> &str {
        match self {
            ResolverConfig::System { .. } | ResolverConfig::Public { .. } => "hickory",
            ResolverConfig::Custom { factory, .. } => factory,
        }
    }

    /// Per-query timeout, if one was configured
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            ResolverConfig::System { timeout_secs } | ResolverConfig::Public { timeout_secs, .. } => {
                timeout_secs.map(Duration::from_secs)
            }
            ResolverConfig::Custom { .. } => None,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig::System { timeout_secs: None }
    }
}

/// Well-known public resolvers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicResolver {
    /// 8.8.8.8 / 8.8.4.4
    Google,
    /// 1.1.1.1 / 1.0.0.1
    Cloudflare,
    /// 9.9.9.9
    Quad9,
}

impl std::str::FromStr for PublicResolver {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(PublicResolver::Google),
            "cloudflare" => Ok(PublicResolver::Cloudflare),
            "quad9" => Ok(PublicResolver::Quad9),
            other => Err(crate::Error::config(format!(
                "Unknown public resolver '{}'. Supported: google, cloudflare, quad9",
                other
            ))),
        }
    }
}

/// Durable store configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// SQLite database file
    Sqlite {
        /// Path to the database file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// Custom store backend
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::Sqlite { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("SQLite database path cannot be empty"));
                }
                Ok(())
            }
            StoreConfig::Memory => Ok(()),
            StoreConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom store factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the name of the backend that serves this configuration
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::Sqlite { .. } => "sqlite",
            StoreConfig::Memory => "memory",
            StoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Parse a newline-delimited domain list
///
/// Surrounding whitespace is trimmed; blank lines and `#` comments are skipped.
pub fn parse_domains(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Load the domain list from `path`
///
/// Falls back to [`DEFAULT_DOMAINS`] when no path is given or the file does
/// not exist. Any other read failure is returned.
pub fn load_domains(path: Option<&Path>) -> Result<Vec<String>, crate::Error> {
    let Some(path) = path else {
        tracing::info!("No domain list given, using {} default domains", DEFAULT_DOMAINS.len());
        return Ok(default_domains());
    };

    match std::fs::read_to_string(path) {
        Ok(content) => {
            let domains = retain_valid_domains(parse_domains(&content));
            if domains.is_empty() {
                return Err(crate::Error::config(format!(
                    "Domain list {} contains no valid domains",
                    path.display()
                )));
            }
            tracing::info!("Loaded {} domain(s) from {}", domains.len(), path.display());
            Ok(domains)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                "Domain list {} not found, using {} default domains",
                path.display(),
                DEFAULT_DOMAINS.len()
            );
            Ok(default_domains())
        }
        Err(e) => Err(crate::Error::config(format!(
            "Failed to read domain list {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Drop names that fail [`validate_domain_name`], logging each one
///
/// One bad line must not take the other domains down with it.
pub fn retain_valid_domains(domains: Vec<String>) -> Vec<String> {
    domains
        .into_iter()
        .filter(|domain| match validate_domain_name(domain) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(domain = %domain, "Skipping domain: {}", e);
                false
            }
        })
        .collect()
}

fn default_domains() -> Vec<String> {
    DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect()
}

/// Validate that a string is a plausible DNS domain name
///
/// Basic RFC 1035 checks: total length, label length, label characters.
/// A single trailing dot (fully-qualified form) is accepted.
pub fn validate_domain_name(domain: &str) -> Result<(), crate::Error> {
    let name = domain.strip_suffix('.').unwrap_or(domain);

    if name.is_empty() {
        return Err(crate::Error::config("Domain name cannot be empty"));
    }

    // 253 minus the probe label (8 chars + dot)
    if name.len() > 244 {
        return Err(crate::Error::config(format!(
            "Domain name too long: {} chars (max 244). Got: {}",
            name.len(),
            domain
        )));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(crate::Error::config(format!(
                "Domain name has empty label: '{}'",
                domain
            )));
        }

        if label.len() > 63 {
            return Err(crate::Error::config(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(crate::Error::config(format!(
                "Domain label contains invalid characters. Label: '{}'",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(crate::Error::config(format!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(())
}
