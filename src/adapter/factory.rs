//! Adapter factory.
//!
//! Creates memory adapters from configuration.

use crate::adapter::backend::MemoryAdapter;
use crate::adapter::backends::{
    HttpMemoryAdapter, InMemoryAdapter, KeyValueMemoryAdapter, VectorIndexAdapter,
};
use crate::adapter::registry::AdapterRegistry;
use crate::config::AdapterConfig;
use crate::core::{DisplayZone, Result};
use std::sync::Arc;

/// Create an adapter from configuration.
///
/// The adapter is returned uninitialized.
pub fn create_adapter(config: &AdapterConfig, zone: &DisplayZone) -> Result<Arc<dyn MemoryAdapter>> {
    let adapter: Arc<dyn MemoryAdapter> = match config {
        AdapterConfig::VectorIndex(c) => Arc::new(VectorIndexAdapter::new(c, zone.clone())?),
        AdapterConfig::KeyValue(c) => Arc::new(KeyValueMemoryAdapter::new(c, zone.clone())?),
        AdapterConfig::HttpMemory(c) => Arc::new(HttpMemoryAdapter::new(c, zone.clone())?),
        AdapterConfig::InMemory(c) => Arc::new(InMemoryAdapter::new(&c.name)),
    };
    Ok(adapter)
}

/// Build a registry holding one adapter per config entry, in order.
pub fn create_registry(configs: &[AdapterConfig], zone: &DisplayZone) -> Result<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();
    for config in configs {
        registry.register(create_adapter(config, zone)?)?;
    }
    Ok(registry)
}
