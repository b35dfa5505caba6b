//! Plugin-based backend registry
//!
//! The registry allows resolver and durable store backends to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dnsperf_core::registry::BackendRegistry;
//! use dnsperf_core::config::StoreConfig;
//!
//! // Memory store is always available
//! let registry = BackendRegistry::with_builtins();
//!
//! // Backend crates register themselves
//! dnsperf_resolver_hickory::register(&registry);
//! dnsperf_store_sqlite::register(&registry);
//!
//! let store = registry.create_store(&StoreConfig::Sqlite { path: "dnsperf.db".into() })?;
//! ```
//!
//! ## Registration
//!
//! Backend crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &BackendRegistry) {
//!     registry.register_store("sqlite", Box::new(SqliteFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::{ResolverConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::state::MemoryStoreFactory;
use crate::traits::{DurableStore, DurableStoreFactory, ResolverFactory};

/// Backend registry for plugin-based resolver and store creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct BackendRegistry {
    /// Registered resolver factories
    resolvers: RwLock<HashMap<String, Arc<dyn ResolverFactory>>>,

    /// Registered durable store factories
    stores: RwLock<HashMap<String, Arc<dyn DurableStoreFactory>>>,
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the in-crate backends (`memory` store)
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_store("memory", Box::new(MemoryStoreFactory));
        registry
    }

    /// Register a resolver factory
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_resolver(&self, name: impl Into<String>, factory: Box<dyn ResolverFactory>) {
        let mut resolvers = self.resolvers.write().unwrap_or_else(|e| e.into_inner());
        resolvers.insert(name.into(), Arc::from(factory));
    }

    /// Register a durable store factory
    pub fn register_store(&self, name: impl Into<String>, factory: Box<dyn DurableStoreFactory>) {
        let mut stores = self.stores.write().unwrap_or_else(|e| e.into_inner());
        stores.insert(name.into(), Arc::from(factory));
    }

    /// Look up the factory serving a resolver configuration
    ///
    /// The factory is shared with the probe, which builds a fresh resolver
    /// from it for every measurement.
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn ResolverFactory>)`: Registered factory
    /// - `Err(Error::Config)`: No backend registered under that name
    pub fn resolver_factory(&self, config: &ResolverConfig) -> Result<Arc<dyn ResolverFactory>> {
        let resolver_type = config.type_name();
        let resolvers = self.resolvers.read().unwrap_or_else(|e| e.into_inner());

        resolvers
            .get(resolver_type)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown resolver type: {}", resolver_type)))
    }

    /// Create a durable store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DurableStore>)`: Connected store
    /// - `Err(Error)`: Unknown store type, or the backend could not connect
    pub fn create_store(&self, config: &StoreConfig) -> Result<Box<dyn DurableStore>> {
        let store_type = config.type_name();

        let factory = {
            let stores = self.stores.read().unwrap_or_else(|e| e.into_inner());
            stores
                .get(store_type)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown store type: {}", store_type)))?
        };

        factory.create(config)
    }

    /// List all registered resolver types
    pub fn list_resolvers(&self) -> Vec<String> {
        let resolvers = self.resolvers.read().unwrap_or_else(|e| e.into_inner());
        resolvers.keys().cloned().collect()
    }

    /// List all registered store types
    pub fn list_stores(&self) -> Vec<String> {
        let stores = self.stores.read().unwrap_or_else(|e| e.into_inner());
        stores.keys().cloned().collect()
    }

    /// Check if a resolver type is registered
    pub fn has_resolver(&self, name: &str) -> bool {
        let resolvers = self.resolvers.read().unwrap_or_else(|e| e.into_inner());
        resolvers.contains_key(name)
    }

    /// Check if a store type is registered
    pub fn has_store(&self, name: &str) -> bool {
        let stores = self.stores.read().unwrap_or_else(|e| e.into_inner());
        stores.contains_key(name)
    }
}
