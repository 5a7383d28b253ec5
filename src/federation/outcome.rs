//! Federation requests and outcomes.

use crate::adapter::{AdapterHealth, MemoryRecord, Metadata, RecordId, RecordPatch};
use crate::audit::{EntryId, OperationKind, ResultStatus};
use crate::core::Hash256;
use crate::merge::MergedResult;
use crate::monitoring::MetricsSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Per-operation lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationPhase {
    /// Canonical id assigned, intent entry appended
    Preparing,
    /// Adapter calls in flight
    Dispatching,
    /// Waiting for every call or the deadline
    Collecting,
    /// Audit entry finalized, counters updated
    Finalized,
}

/// Result of one backend call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    /// Abandoned at the fan-out deadline; counts as failed
    TimedOut,
}

/// Outcome of one backend within a fan-out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackendOutcome<T> {
    pub backend: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl<T> BackendOutcome<T> {
    pub fn success(backend: &str, value: T, elapsed_ms: u64) -> Self {
        Self {
            backend: backend.to_string(),
            status: OutcomeStatus::Success,
            value: Some(value),
            error: None,
            elapsed_ms,
        }
    }

    pub fn failed(backend: &str, error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            backend: backend.to_string(),
            status: OutcomeStatus::Failed,
            value: None,
            error: Some(error.into()),
            elapsed_ms,
        }
    }

    pub fn timed_out(backend: &str, elapsed_ms: u64) -> Self {
        Self {
            backend: backend.to_string(),
            status: OutcomeStatus::TimedOut,
            value: None,
            error: Some("fan-out deadline exceeded".to_string()),
            elapsed_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// Convert the carried value, keeping status and timing.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> BackendOutcome<U> {
        BackendOutcome {
            backend: self.backend,
            status: self.status,
            value: self.value.map(f),
            error: self.error,
            elapsed_ms: self.elapsed_ms,
        }
    }
}

/// Aggregate status over a set of outcomes.
pub fn aggregate_status<T>(outcomes: &[BackendOutcome<T>]) -> ResultStatus {
    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    ResultStatus::classify(succeeded, outcomes.len())
}

/// Names of the backends that succeeded, in dispatch order.
pub fn succeeded_backends<T>(outcomes: &[BackendOutcome<T>]) -> Vec<String> {
    outcomes
        .iter()
        .filter(|o| o.is_success())
        .map(|o| o.backend.clone())
        .collect()
}

/// Store request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreRequest {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl StoreRequest {
    pub fn new(content: impl Into<String>, namespace: &str) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
            namespace: namespace.to_string(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Search request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub filters: Metadata,
    /// Engine default when unset
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, namespace: &str) -> Self {
        Self {
            query: query.into(),
            namespace: namespace.to_string(),
            filters: HashMap::new(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_filter(mut self, key: &str, value: Value) -> Self {
        self.filters.insert(key.to_string(), value);
        self
    }
}

/// Update request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub id: RecordId,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub patch: RecordPatch,
}

impl UpdateRequest {
    pub fn new(id: RecordId, namespace: &str, patch: RecordPatch) -> Self {
        Self {
            id,
            namespace: namespace.to_string(),
            patch,
        }
    }
}

/// Delete request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub id: RecordId,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl DeleteRequest {
    pub fn new(id: RecordId, namespace: &str) -> Self {
        Self {
            id,
            namespace: namespace.to_string(),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

/// Result of a federated store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreOutcome {
    /// Canonical record as prepared by the engine
    pub record: MemoryRecord,
    pub status: ResultStatus,
    /// Backends that accepted the write
    pub providers_used: Vec<String>,
    pub outcomes: Vec<BackendOutcome<MemoryRecord>>,
    pub content_hash: Hash256,
    pub audit_entry_id: EntryId,
    pub audit_chain_index: u64,
}

/// Result of a federated search.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub query: String,
    pub namespace: String,
    pub status: ResultStatus,
    /// Merged, ranked and truncated results
    pub results: Vec<MergedResult>,
    /// Merged count before truncation
    pub total_found: usize,
    /// Backends the search was dispatched to
    pub providers_searched: Vec<String>,
    /// Per-backend hit counts
    pub outcomes: Vec<BackendOutcome<usize>>,
    pub audit_entry_id: EntryId,
    pub audit_chain_index: u64,
}

/// Result of a federated update or delete.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub id: RecordId,
    pub operation: OperationKind,
    pub status: ResultStatus,
    pub providers_used: Vec<String>,
    pub outcomes: Vec<BackendOutcome<bool>>,
    pub audit_entry_id: EntryId,
    pub audit_chain_index: u64,
}

/// A record found by id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub record: MemoryRecord,
    /// Backend that answered
    pub backend: String,
}

/// One item of a bulk store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResultStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkItemResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(s) if s != ResultStatus::Failed)
    }
}

/// Summary of a bulk store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkStoreSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub items: Vec<BulkItemResult>,
}

impl BulkStoreSummary {
    pub fn from_items(items: Vec<BulkItemResult>) -> Self {
        let successful = items.iter().filter(|i| i.is_success()).count();
        Self {
            total: items.len(),
            successful,
            failed: items.len() - successful,
            items,
        }
    }
}

/// Overall service status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    /// Every registered backend healthy
    Operational,
    /// At least one backend unhealthy or excluded
    Degraded,
    /// No backend active
    Unavailable,
}

/// Engine health snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: SystemStatus,
    pub backends: Vec<AdapterHealth>,
    pub audit_chain_length: usize,
    pub audit_chain_intact: bool,
    pub metrics: MetricsSnapshot,
}
