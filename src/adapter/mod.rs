//! Backend Adapters
//!
//! Uniform capability set {initialize, store, search, fetch, update,
//! delete, health} over heterogeneous memory systems. Adapter selection
//! is data: a name → instance registry.

pub mod backend;
pub mod backends;
pub mod factory;
pub mod record;
pub mod registry;

pub use backend::{AdapterHealth, AdapterKind, AdapterStats, HealthStatus, MemoryAdapter};
pub use backends::{
    Embedder, HashEmbedder, HttpMemoryAdapter, InMemoryAdapter, KeyValueMemoryAdapter,
    VectorIndexAdapter,
};
pub use factory::{create_adapter, create_registry};
pub use record::{Metadata, MemoryRecord, RecordId, RecordPatch, SearchQuery};
pub use registry::{AdapterRegistry, AdapterStatus, InitReport};
