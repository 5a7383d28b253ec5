//! Adapter implementations.
//!
//! - `vector`: vector index data plane
//! - `keyvalue`: hosted key-value memory service
//! - `http`: generic HTTP memory API
//! - `memory`: process-local store

pub mod http;
pub mod keyvalue;
pub mod memory;
pub mod vector;

pub use http::HttpMemoryAdapter;
pub use keyvalue::KeyValueMemoryAdapter;
pub use memory::InMemoryAdapter;
pub use vector::{Embedder, HashEmbedder, VectorIndexAdapter};

use crate::adapter::record::{Metadata, MemoryRecord, RecordId};
use crate::core::{DisplayZone, DualTimestamp, Error, Result, Timestamp};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};

/// Metadata key carrying the canonical id on backends with their own ids.
pub(crate) const RECORD_ID_KEY: &str = "record_id";

/// Canonical to native id entries kept per adapter.
pub const MAX_TRACKED_NATIVE_IDS: usize = 10_000;

/// Bounded canonical to native id map. The oldest entry is evicted first.
#[derive(Debug)]
pub(crate) struct NativeIdCache {
    capacity: usize,
    ids: HashMap<RecordId, String>,
    order: VecDeque<RecordId>,
}

impl NativeIdCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ids: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub(crate) fn get(&self, id: &RecordId) -> Option<&String> {
        self.ids.get(id)
    }

    pub(crate) fn insert(&mut self, id: RecordId, native: String) {
        if self.ids.insert(id.clone(), native).is_some() {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    pub(crate) fn remove(&mut self, id: &RecordId) {
        if self.ids.remove(id).is_some() {
            self.order.retain(|tracked| tracked != id);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }
}

impl Default for NativeIdCache {
    fn default() -> Self {
        Self::new(MAX_TRACKED_NATIVE_IDS)
    }
}

pub(crate) fn ensure_initialized(initialized: bool, name: &str) -> Result<()> {
    if initialized {
        Ok(())
    } else {
        Err(Error::NotInitialized(name.to_string()))
    }
}

/// User metadata plus the bookkeeping fields every remote copy carries.
pub(crate) fn remote_metadata(record: &MemoryRecord) -> Value {
    let mut map: Map<String, Value> = record
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    map.insert(RECORD_ID_KEY.into(), json!(record.id.as_str()));
    map.insert("namespace".into(), json!(record.namespace));
    map.insert("content_hash".into(), json!(record.content_hash.to_hex()));
    map.insert("timestamp_utc".into(), json!(record.created_at.utc.to_rfc3339()));
    map.insert("timestamp_display".into(), json!(record.created_at.display));
    Value::Object(map)
}

/// Remove the bookkeeping fields added by [`remote_metadata`].
fn strip_bookkeeping(metadata: &mut Metadata) {
    for key in [
        RECORD_ID_KEY,
        "namespace",
        "content_hash",
        "timestamp_utc",
        "timestamp_display",
    ] {
        metadata.remove(key);
    }
}

/// Unwrap the list out of whichever envelope a backend used:
/// `{items}`, `{results}`, `{memories}`, `{data}`, or a bare array.
pub(crate) fn extract_items(body: &Value) -> Vec<Value> {
    if let Value::Array(items) = body {
        return items.clone();
    }
    for key in ["items", "results", "memories", "data"] {
        if let Some(Value::Array(items)) = body.get(key) {
            return items.clone();
        }
    }
    Vec::new()
}

pub(crate) fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn parse_timestamp(value: Option<String>) -> Option<Timestamp> {
    value
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .map(|ts| ts.with_timezone(&chrono::Utc))
}

/// Build a record from one remote item.
///
/// The content hash is always recomputed locally. Items without textual
/// content are skipped.
pub(crate) fn parse_remote_record(
    item: &Value,
    backend: &str,
    default_namespace: &str,
    zone: &DisplayZone,
) -> Option<MemoryRecord> {
    let content = string_field(item, &["content", "memory", "text"])?;
    let backend_ref = string_field(item, &["id"]);

    let mut metadata: Metadata = match item.get("metadata") {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => Metadata::new(),
    };
    let meta_value = Value::Object(metadata.clone().into_iter().collect());

    let id = string_field(&meta_value, &[RECORD_ID_KEY])
        .or_else(|| backend_ref.clone())
        .map(RecordId::new)
        .unwrap_or_else(RecordId::generate);
    let namespace = string_field(&meta_value, &["namespace"])
        .or_else(|| string_field(item, &["user_id"]))
        .unwrap_or_else(|| default_namespace.to_string());
    let created_at = parse_timestamp(string_field(&meta_value, &["timestamp_utc"]))
        .or_else(|| parse_timestamp(string_field(item, &["created_at", "createdAt"])))
        .map(|utc| DualTimestamp::from_utc(utc, zone))
        .unwrap_or_else(|| DualTimestamp::now(zone));

    strip_bookkeeping(&mut metadata);

    let mut record = MemoryRecord::new(id, content, metadata, namespace, zone).with_source(backend);
    record.created_at = created_at;
    record.backend_ref = backend_ref;
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::crypto::content_hash;

    #[test]
    fn test_extract_items_shapes() {
        let item = json!({"content": "a"});
        for body in [
            json!([item.clone()]),
            json!({"items": [item.clone()], "total": 1}),
            json!({"results": [item.clone()]}),
            json!({"memories": [item.clone()]}),
            json!({"data": [item.clone()]}),
        ] {
            assert_eq!(extract_items(&body).len(), 1, "shape: {}", body);
        }
        assert!(extract_items(&json!({"unexpected": true})).is_empty());
    }

    #[test]
    fn test_remote_metadata_roundtrip() {
        let zone = DisplayZone::default();
        let mut meta = Metadata::new();
        meta.insert("case".into(), json!("17"));
        let record = MemoryRecord::new(RecordId::new("r1"), "evidence-17", meta, "legal", &zone);

        let item = json!({
            "id": "native-9",
            "memory": "evidence-17",
            "metadata": remote_metadata(&record),
        });
        let parsed = parse_remote_record(&item, "kv", "default", &zone).unwrap();

        assert_eq!(parsed.id, RecordId::new("r1"));
        assert_eq!(parsed.backend_ref.as_deref(), Some("native-9"));
        assert_eq!(parsed.namespace, "legal");
        assert_eq!(parsed.source_backend, "kv");
        assert_eq!(parsed.created_at, record.created_at);
        assert_eq!(parsed.metadata.len(), 1);
        assert_eq!(parsed.content_hash, content_hash("evidence-17"));
    }

    #[test]
    fn test_parse_remote_record_defaults() {
        let zone = DisplayZone::utc();
        let item = json!({"id": 42, "text": "note", "user_id": "alice"});
        let parsed = parse_remote_record(&item, "http", "default", &zone).unwrap();
        assert_eq!(parsed.id.as_str(), "42");
        assert_eq!(parsed.namespace, "alice");

        assert!(parse_remote_record(&json!({"id": "x"}), "http", "d", &zone).is_none());
    }

    #[test]
    fn test_native_id_cache_evicts_oldest() {
        let mut cache = NativeIdCache::new(2);
        cache.insert(RecordId::new("a"), "n-a".into());
        cache.insert(RecordId::new("b"), "n-b".into());
        cache.insert(RecordId::new("a"), "n-a2".into());
        assert_eq!(cache.len(), 2);

        cache.insert(RecordId::new("c"), "n-c".into());
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&RecordId::new("a")).is_none());
        assert_eq!(cache.get(&RecordId::new("c")).map(String::as_str), Some("n-c"));

        cache.remove(&RecordId::new("b"));
        cache.insert(RecordId::new("d"), "n-d".into());
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&RecordId::new("c")).is_some());
    }

    #[test]
    fn test_ensure_initialized() {
        assert!(ensure_initialized(true, "x").is_ok());
        assert!(matches!(
            ensure_initialized(false, "x"),
            Err(Error::NotInitialized(_))
        ));
    }
}
