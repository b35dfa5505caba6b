//! Error types for the dnsperf system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for dnsperf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the dnsperf system
#[derive(Error, Debug)]
pub enum Error {
    /// Resolver-related errors (construction or lookup plumbing)
    #[error("Resolver error: {0}")]
    Resolver(String),

    /// Durable store errors
    #[error("Durable store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Domain not registered with the aggregator or store
    #[error("Domain not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a resolver error
    pub fn resolver(msg: impl Into<String>) -> Self {
        Self::Resolver(msg.into())
    }

    /// Create a durable store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error came from the durable store
    ///
    /// The daemon uses this to pick the store-failure exit code.
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
