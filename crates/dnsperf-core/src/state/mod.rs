// # Durable Store Implementations
//
// Built-in implementations of the DurableStore trait. Database-backed stores
// live in their own crates (see `dnsperf-store-sqlite`).

pub mod memory;

pub use memory::{MemoryStore, MemoryStoreFactory};
