//! Stored memory records and search queries.

use crate::core::crypto::content_hash;
use crate::core::{DisplayZone, DualTimestamp, Hash256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Open key/value metadata.
pub type Metadata = HashMap<String, Value>;

/// Canonical record identifier, assigned by the engine before fan-out.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Generate a new random record ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One stored unit of memory.
///
/// `id` is identical on every backend holding the same logical write.
/// `backend_ref` carries a backend's own identifier when it assigns one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: RecordId,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DualTimestamp,
    /// Adapter that produced or owns this copy
    pub source_backend: String,
    /// SHA3-256 of the full content
    pub content_hash: Hash256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_ref: Option<String>,
    pub namespace: String,
    /// `content` is a prefix held by a size-limited backend;
    /// `content_hash` still covers the full text
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub content_truncated: bool,
}

impl MemoryRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        id: RecordId,
        content: impl Into<String>,
        metadata: Metadata,
        namespace: impl Into<String>,
        zone: &DisplayZone,
    ) -> Self {
        let content = content.into();
        Self {
            id,
            content_hash: content_hash(&content),
            content,
            metadata,
            created_at: DualTimestamp::now(zone),
            source_backend: String::new(),
            backend_ref: None,
            namespace: namespace.into(),
            content_truncated: false,
        }
    }

    /// Tag the copy with the adapter that holds it.
    pub fn with_source(mut self, backend: &str) -> Self {
        self.source_backend = backend.to_string();
        self
    }

    pub fn with_backend_ref(mut self, backend_ref: impl Into<String>) -> Self {
        self.backend_ref = Some(backend_ref.into());
        self
    }

    /// Whether `content_hash` matches the current content.
    pub fn verify_content_hash(&self) -> bool {
        self.content_hash == content_hash(&self.content)
    }

    /// Mark `content` as a prefix of the text hashed by `full_hash`.
    pub fn with_truncated_content(mut self, full_hash: Hash256) -> Self {
        self.content_hash = full_hash;
        self.content_truncated = true;
        self
    }

    /// Hash identifying the full content across backends.
    ///
    /// Recomputed from `content` unless the copy is truncated.
    pub fn identity_hash(&self) -> Hash256 {
        if self.content_truncated {
            self.content_hash.clone()
        } else {
            content_hash(&self.content)
        }
    }

    /// Apply a partial update, rehashing changed content.
    pub fn apply_patch(&mut self, patch: &RecordPatch) {
        if let Some(content) = &patch.content {
            self.content = content.clone();
            self.content_hash = content_hash(content);
            self.content_truncated = false;
        }
        if let Some(metadata) = &patch.metadata {
            for (key, value) in metadata {
                self.metadata.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Partial update. Metadata keys are merged over the existing map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl RecordPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.metadata.as_ref().map_or(true, |m| m.is_empty())
    }
}

/// A search as dispatched to one adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub namespace: String,
    /// Exact-match metadata filters
    #[serde(default)]
    pub filters: Metadata,
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, namespace: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            namespace: namespace.into(),
            filters: HashMap::new(),
            limit,
        }
    }

    pub fn with_filter(mut self, key: &str, value: Value) -> Self {
        self.filters.insert(key.to_string(), value);
        self
    }

    /// Whether every filter key is present with an equal value.
    pub fn matches_filters(&self, record: &MemoryRecord) -> bool {
        self.filters
            .iter()
            .all(|(key, value)| record.metadata.get(key) == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(content: &str) -> MemoryRecord {
        MemoryRecord::new(
            RecordId::new("r1"),
            content,
            Metadata::new(),
            "default",
            &DisplayZone::default(),
        )
    }

    #[test]
    fn test_record_id_generate_unique() {
        assert_ne!(RecordId::generate(), RecordId::generate());
    }

    #[test]
    fn test_record_id_serializes_transparently() {
        let json = serde_json::to_string(&RecordId::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }

    #[test]
    fn test_new_record_hashes_content() {
        let r = record("evidence-17");
        assert_eq!(r.content_hash, content_hash("evidence-17"));
        assert!(r.verify_content_hash());
        assert!(r.created_at.display.ends_with("HST"));
    }

    #[test]
    fn test_apply_patch() {
        let mut r = record("old");
        r.metadata.insert("keep".into(), json!(1));

        let patch = RecordPatch::content("new").with_metadata("tag", json!("x"));
        r.apply_patch(&patch);

        assert_eq!(r.content, "new");
        assert!(r.verify_content_hash());
        assert_eq!(r.metadata.get("keep"), Some(&json!(1)));
        assert_eq!(r.metadata.get("tag"), Some(&json!("x")));
    }

    #[test]
    fn test_truncated_copy_keeps_full_identity() {
        let full = "e".repeat(1200);
        let prefix = record(&full[..1000]).with_truncated_content(content_hash(&full));

        assert!(prefix.content_truncated);
        assert!(!prefix.verify_content_hash());
        assert_eq!(prefix.identity_hash(), record(&full).identity_hash());

        let json = serde_json::to_value(&prefix).unwrap();
        assert_eq!(json["content_truncated"], true);
        assert!(serde_json::to_value(record("x")).unwrap().get("content_truncated").is_none());

        let mut patched = prefix;
        patched.apply_patch(&RecordPatch::content("short"));
        assert!(!patched.content_truncated);
        assert_eq!(patched.identity_hash(), content_hash("short"));
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(RecordPatch::default().is_empty());
        assert!(!RecordPatch::content("x").is_empty());
    }

    #[test]
    fn test_search_filters() {
        let mut r = record("x");
        r.metadata.insert("case".into(), json!("17"));

        let query = SearchQuery::new("x", "default", 5).with_filter("case", json!("17"));
        assert!(query.matches_filters(&r));

        let query = SearchQuery::new("x", "default", 5).with_filter("case", json!("18"));
        assert!(!query.matches_filters(&r));
    }
}
