//! MemoryAdapter trait definition.
//!
//! Uniform capability set over one external memory system.

use crate::adapter::record::{MemoryRecord, RecordId, RecordPatch, SearchQuery};
use crate::core::{now, Result, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Adapter type identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// Vector index data plane
    VectorIndex,
    /// Hosted key-value memory service
    KeyValue,
    /// Generic HTTP memory API
    HttpMemory,
    /// Process-local store
    InMemory,
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterKind::VectorIndex => write!(f, "vector_index"),
            AdapterKind::KeyValue => write!(f, "key_value"),
            AdapterKind::HttpMemory => write!(f, "http_memory"),
            AdapterKind::InMemory => write!(f, "in_memory"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    NotInitialized,
}

/// Best-effort health snapshot of one adapter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdapterHealth {
    pub name: String,
    pub kind: AdapterKind,
    pub status: HealthStatus,
    /// Round trip of the probe, when one was made
    pub latency_ms: Option<u64>,
    pub detail: Option<String>,
    pub checked_at: Timestamp,
}

impl AdapterHealth {
    pub fn healthy(name: &str, kind: AdapterKind, latency_ms: Option<u64>) -> Self {
        Self::with_status(name, kind, HealthStatus::Healthy, latency_ms, None)
    }

    pub fn unhealthy(name: &str, kind: AdapterKind, detail: impl Into<String>) -> Self {
        Self::with_status(name, kind, HealthStatus::Unhealthy, None, Some(detail.into()))
    }

    pub fn not_initialized(name: &str, kind: AdapterKind) -> Self {
        Self::with_status(name, kind, HealthStatus::NotInitialized, None, None)
    }

    fn with_status(
        name: &str,
        kind: AdapterKind,
        status: HealthStatus,
        latency_ms: Option<u64>,
        detail: Option<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind,
            status,
            latency_ms,
            detail,
            checked_at: now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Best-effort statistics snapshot of one adapter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdapterStats {
    pub name: String,
    pub kind: AdapterKind,
    pub initialized: bool,
    /// Record count, if the backend reports one
    pub record_count: Option<u64>,
    /// Backend-specific extras
    #[serde(default)]
    pub details: HashMap<String, Value>,
}

impl AdapterStats {
    pub fn new(name: &str, kind: AdapterKind, initialized: bool) -> Self {
        Self {
            name: name.to_string(),
            kind,
            initialized,
            record_count: None,
            details: HashMap::new(),
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.record_count = Some(count);
        self
    }

    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

/// Core trait for memory backends.
///
/// Implementations are long-lived and shared across concurrent
/// operations. Every data call made before a successful
/// [`initialize`](MemoryAdapter::initialize) fails with
/// [`Error::NotInitialized`](crate::core::Error::NotInitialized).
#[async_trait]
pub trait MemoryAdapter: Send + Sync {
    /// Registry name.
    fn name(&self) -> &str;

    fn kind(&self) -> AdapterKind;

    fn is_initialized(&self) -> bool;

    /// Establish credentials and connection state.
    ///
    /// Idempotent. Returns whether the adapter is usable.
    async fn initialize(&self) -> Result<bool>;

    /// Persist an engine-prepared record.
    ///
    /// The returned copy keeps `record.id` and may carry a `backend_ref`.
    async fn store(&self, record: MemoryRecord) -> Result<MemoryRecord>;

    /// Search. No matches is an empty vector, not an error.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryRecord>>;

    async fn fetch_by_id(&self, id: &RecordId) -> Result<Option<MemoryRecord>>;

    /// Apply a patch. Fails with `NotFound` for an unknown id.
    async fn update(&self, id: &RecordId, patch: &RecordPatch) -> Result<MemoryRecord>;

    /// Delete. Returns whether a record was removed.
    async fn delete(&self, id: &RecordId) -> Result<bool>;

    /// Never fails; problems are reported in the snapshot.
    async fn health_check(&self) -> AdapterHealth;

    /// Never fails; unknown figures are left empty.
    async fn statistics(&self) -> AdapterStats;
}
