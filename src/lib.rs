//! # memfed - Federated Memory Storage
//!
//! Fans single logical memory operations out to several independent
//! backends and keeps a tamper-evident record of every attempt:
//! - **Adapters**: uniform async interface over vector indexes, key-value
//!   memory services, generic HTTP memory APIs and a local store
//! - **Federation**: concurrent fan-out with partial-failure tolerance
//! - **Merge**: content-hash dedup across heterogeneous result sets
//! - **Audit**: SHA3-256 hash chain with signed forensic reports
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use memfed::config::{AdapterConfig, FederationConfig};
//! use memfed::federation::{FederationEngine, SearchRequest, StoreRequest};
//!
//! #[tokio::main]
//! async fn main() -> memfed::Result<()> {
//!     let config = FederationConfig::default()
//!         .with_adapter(AdapterConfig::in_memory("primary"))
//!         .with_adapter(AdapterConfig::in_memory("replica"));
//!     let engine = FederationEngine::from_config(config).await?;
//!
//!     let stored = engine.store(StoreRequest::new("evidence-17", "legal")).await?;
//!     println!("{} -> {:?}", stored.record.id, stored.status);
//!
//!     let found = engine.search(SearchRequest::new("evidence", "legal")).await?;
//!     for result in found.results {
//!         println!("{} from {:?}", result.record.content, result.source_backends);
//!     }
//!
//!     assert!(engine.audit().verify());
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod audit;
pub mod config;
pub mod core;
pub mod federation;
pub mod merge;
pub mod monitoring;
pub mod transport;

pub use core::error::{Error, Result};
pub use federation::FederationEngine;
