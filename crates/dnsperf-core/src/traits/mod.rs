//! Core traits for the dnsperf system
//!
//! This module defines the capability interfaces the engine is built against.
//!
//! - [`Resolver`]: Resolve one name (the thing a probe measures)
//! - [`DurableStore`]: Persist summaries and samples, recover on restart

pub mod resolver;
pub mod durable_store;

pub use resolver::{Resolver, Resolution, ResolverFactory};
pub use durable_store::{DurableStore, DurableStoreFactory, LatencySample};
