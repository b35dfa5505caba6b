// # dnsperf-core
//
// Core library for the DNS resolution latency monitor.
//
// ## Architecture Overview
//
// This library measures how long full (uncached) DNS resolutions take for a
// fixed set of domains and keeps running statistics per domain:
// - **Resolver**: Trait for performing one name resolution
// - **DurableStore**: Trait for persisting summaries and the sample history
// - **LatencyProbe**: Times one resolution of a randomized name
// - **StatsAggregator**: Shared per-domain mean/std-dev with write-through
// - **RoundScheduler**: Fans probes out per round, joins, sleeps, repeats
// - **LifecycleController**: Cooperative stop at round boundaries
// - **BackendRegistry**: Plugin-based registry for resolvers and stores
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from backends
// 2. **Plugin-Based**: Backends are registered dynamically, no hard-coded if-else
// 3. **Library-First**: All core functionality can be used as a library
// 4. **Memory First**: In-memory statistics are authoritative; the store is
//    written through and only read back at startup

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod probe;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod stats;
pub mod traits;

// Re-export core types for convenience
pub use config::{MonitorConfig, PublicResolver, ResolverConfig, SchedulerConfig, StoreConfig};
pub use error::{Error, Result};
pub use lifecycle::{LifecycleController, RunState};
pub use probe::{LatencyProbe, ProbeError, ProbeReport};
pub use registry::BackendRegistry;
pub use scheduler::{RoundScheduler, RoundSummary, SchedulerEvent};
pub use state::MemoryStore;
pub use stats::{DomainStat, StatsAggregator};
pub use traits::{DurableStore, LatencySample, Resolution, Resolver, ResolverFactory};
