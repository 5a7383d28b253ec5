//! Audit entry structure.
//!
//! One entry per federation operation. The entry hash covers the
//! canonical form of every field fixed at append time; `result_status`,
//! `finalized_at` and `timestamp_display` sit outside it.

use crate::core::crypto::{canonical_json, sha3_256};
use crate::core::{DisplayZone, Hash256, Result, Timestamp};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

/// `previous_hash` of the first entry.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Unique entry identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    /// Create a new entry ID.
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Generate a unique ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the ID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Federation operation recorded by an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Store,
    Search,
    Delete,
    Update,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Store => write!(f, "store"),
            OperationKind::Search => write!(f, "search"),
            OperationKind::Delete => write!(f, "delete"),
            OperationKind::Update => write!(f, "update"),
        }
    }
}

/// Aggregate result of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    /// Appended, outcome not yet known
    Pending,
    /// Every dispatched backend succeeded
    Success,
    /// Some but not all succeeded
    Partial,
    /// None succeeded, or nothing was dispatched
    Failed,
}

impl ResultStatus {
    /// Classify `succeeded` successes out of `dispatched` calls.
    pub fn classify(succeeded: usize, dispatched: usize) -> Self {
        if dispatched == 0 || succeeded == 0 {
            ResultStatus::Failed
        } else if succeeded == dispatched {
            ResultStatus::Success
        } else {
            ResultStatus::Partial
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResultStatus::Pending)
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultStatus::Pending => write!(f, "pending"),
            ResultStatus::Success => write!(f, "success"),
            ResultStatus::Partial => write!(f, "partial"),
            ResultStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Hashed projection of an entry.
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    chain_index: u64,
    data_hash: String,
    entry_id: &'a str,
    namespace: &'a str,
    operation: OperationKind,
    previous_hash: &'a str,
    timestamp_utc: String,
}

/// Audit entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique ID
    pub entry_id: EntryId,
    /// Operation kind
    pub operation: OperationKind,
    /// Namespace the operation targeted
    pub namespace: String,
    /// SHA3-256 of the canonical request payload
    pub data_hash: Hash256,
    /// Append time
    pub timestamp_utc: Timestamp,
    /// Append time in the display zone
    pub timestamp_display: String,
    /// 0-based position in the chain
    pub chain_index: u64,
    /// Hex entry hash of the prior entry, `"0"` for the first
    pub previous_hash: String,
    /// SHA3-256 of the canonical form
    pub entry_hash: Hash256,
    /// Aggregate result, `Pending` until finalized
    pub result_status: ResultStatus,
    /// Finalization time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<Timestamp>,
}

impl AuditEntry {
    /// Assemble an entry and compute its hash last.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        operation: OperationKind,
        namespace: &str,
        data_hash: Hash256,
        chain_index: u64,
        previous_hash: &str,
        timestamp_utc: Timestamp,
        zone: &DisplayZone,
        result_status: ResultStatus,
    ) -> Result<Self> {
        let mut entry = Self {
            entry_id: EntryId::generate(),
            operation,
            namespace: namespace.to_string(),
            data_hash,
            timestamp_display: zone.format(&timestamp_utc),
            timestamp_utc,
            chain_index,
            previous_hash: previous_hash.to_string(),
            entry_hash: Hash256::zero(),
            result_status,
            finalized_at: None,
        };
        entry.entry_hash = entry.compute_hash()?;
        Ok(entry)
    }

    /// Canonical JSON of the hashed fields, keys sorted.
    pub fn canonical_form(&self) -> Result<String> {
        canonical_json(&CanonicalEntry {
            chain_index: self.chain_index,
            data_hash: self.data_hash.to_hex(),
            entry_id: self.entry_id.as_str(),
            namespace: &self.namespace,
            operation: self.operation,
            previous_hash: &self.previous_hash,
            timestamp_utc: self.timestamp_utc.to_rfc3339_opts(SecondsFormat::Nanos, true),
        })
    }

    /// Compute the entry hash from the current field values.
    pub fn compute_hash(&self) -> Result<Hash256> {
        Ok(sha3_256(self.canonical_form()?.as_bytes()))
    }

    /// Whether the stored hash matches the fields.
    pub fn verify_hash(&self) -> bool {
        matches!(self.compute_hash(), Ok(hash) if hash == self.entry_hash)
    }

    /// Whether this entry links to `previous` (or to genesis when `None`).
    pub fn links_to(&self, previous: Option<&AuditEntry>) -> bool {
        match previous {
            None => self.chain_index == 0 && self.previous_hash == GENESIS_PREVIOUS_HASH,
            Some(prev) => {
                self.chain_index == prev.chain_index + 1
                    && self.previous_hash == prev.entry_hash.to_hex()
            }
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| crate::core::Error::DeserializationError(e.to_string()))
    }
}
