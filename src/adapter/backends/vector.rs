//! Vector index adapter.
//!
//! Talks to a Pinecone-style data plane. The canonical record id is the
//! vector id; content and bookkeeping ride along as vector metadata.

use super::{ensure_initialized, parse_remote_record, remote_metadata};
use crate::adapter::backend::{AdapterHealth, AdapterKind, AdapterStats, MemoryAdapter};
use crate::adapter::record::{MemoryRecord, RecordId, RecordPatch, SearchQuery};
use crate::config::VectorIndexConfig;
use crate::core::crypto::sha3_256_multi;
use crate::core::{truncate_chars, DisplayZone, Error, Hash256, Result};
use crate::transport::{Auth, RequestPayload, ResilientClient, RetryPolicy};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Metadata content is cut to this many characters.
pub const MAX_METADATA_CONTENT_CHARS: usize = 1000;

/// Set on vectors whose metadata content is a prefix.
const TRUNCATED_KEY: &str = "content_truncated";

/// Produces embedding vectors for content and queries.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Deterministic digest-derived pseudo-embedding.
///
/// Identical text always maps to the same unit vector, which is enough
/// for exact-match recall without a model.
#[derive(Clone, Debug)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.dimension);
        let mut block: u32 = 0;
        while values.len() < self.dimension {
            let digest = sha3_256_multi(&[text.as_bytes(), &block.to_le_bytes()]);
            for byte in digest.as_bytes() {
                if values.len() == self.dimension {
                    break;
                }
                values.push(*byte as f32 / 127.5 - 1.0);
            }
            block += 1;
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        values
    }
}

pub struct VectorIndexAdapter {
    name: String,
    index_name: String,
    /// Index namespace; empty selects the default namespace
    index_namespace: String,
    client: ResilientClient,
    embedder: Arc<dyn Embedder>,
    zone: DisplayZone,
    initialized: AtomicBool,
}

impl VectorIndexAdapter {
    pub fn new(config: &VectorIndexConfig, zone: DisplayZone) -> Result<Self> {
        let client = ResilientClient::new(
            &config.index_host,
            Auth::Header {
                name: "Api-Key".to_string(),
                value: config.api_key.clone(),
            },
            RetryPolicy::from(&config.retry),
        )?;

        Ok(Self {
            name: config.name.clone(),
            index_name: config.index_name.clone(),
            index_namespace: config.namespace.clone().unwrap_or_default(),
            client,
            embedder: Arc::new(HashEmbedder::new(config.dimension)),
            zone,
            initialized: AtomicBool::new(false),
        })
    }

    /// Replace the embedding source.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    fn check(&self) -> Result<()> {
        ensure_initialized(self.is_initialized(), &self.name)
    }

    fn vector_metadata(&self, record: &MemoryRecord) -> Value {
        let mut metadata = remote_metadata(record);
        if let Value::Object(map) = &mut metadata {
            map.insert(
                "content".into(),
                json!(truncate_chars(&record.content, MAX_METADATA_CONTENT_CHARS)),
            );
            if record.content_truncated
                || record.content.chars().count() > MAX_METADATA_CONTENT_CHARS
            {
                map.insert(TRUNCATED_KEY.into(), json!(true));
            }
        }
        metadata
    }

    async fn upsert(&self, record: &MemoryRecord) -> Result<()> {
        let body = json!({
            "vectors": [{
                "id": record.id.as_str(),
                "values": self.embedder.embed(&record.content),
                "metadata": self.vector_metadata(record),
            }],
            "namespace": self.index_namespace,
        });
        self.client.post("/vectors/upsert", body).await?;
        Ok(())
    }

    async fn describe(&self) -> Result<Value> {
        Ok(self
            .client
            .post("/describe_index_stats", json!({}))
            .await?
            .into_json())
    }

    fn parse_vector(&self, id: &str, vector: &Value) -> Option<MemoryRecord> {
        let metadata = vector.get("metadata").cloned().unwrap_or(json!({}));
        let item = json!({
            "id": id,
            "content": metadata.get("content").cloned().unwrap_or(Value::Null),
            "metadata": metadata,
        });
        let mut record = parse_remote_record(&item, &self.name, "default", &self.zone)?;
        // The vector id is the canonical id, not a native one.
        record.backend_ref = None;
        record.metadata.remove("content");

        let truncated = record.metadata.remove(TRUNCATED_KEY) == Some(Value::Bool(true));
        let full_hash = metadata
            .get("content_hash")
            .and_then(Value::as_str)
            .and_then(|hex| Hash256::from_hex(hex).ok());
        if let (true, Some(full_hash)) = (truncated, full_hash) {
            record = record.with_truncated_content(full_hash);
        }

        if let Some(score) = vector.get("score").and_then(Value::as_f64) {
            record.metadata.insert("vector_score".into(), json!(score));
        }
        Some(record)
    }
}

#[async_trait]
impl MemoryAdapter for VectorIndexAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::VectorIndex
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    async fn initialize(&self) -> Result<bool> {
        if self.is_initialized() {
            return Ok(true);
        }
        let stats = self.describe().await?;
        if let Some(dim) = stats.get("dimension").and_then(Value::as_u64) {
            if dim as usize != self.embedder.dimension() {
                warn!(
                    backend = %self.name,
                    index_dimension = dim,
                    embedder_dimension = self.embedder.dimension(),
                    "index dimension does not match embedder"
                );
                return Ok(false);
            }
        }
        self.initialized.store(true, Ordering::Release);
        info!(backend = %self.name, index = %self.index_name, "vector index ready");
        Ok(true)
    }

    async fn store(&self, record: MemoryRecord) -> Result<MemoryRecord> {
        self.check()?;
        self.upsert(&record).await?;
        debug!(backend = %self.name, id = %record.id, "vector upserted");
        Ok(record.with_source(&self.name))
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryRecord>> {
        self.check()?;

        let mut filter = Map::new();
        filter.insert("namespace".into(), json!({ "$eq": query.namespace }));
        for (key, value) in &query.filters {
            filter.insert(key.clone(), json!({ "$eq": value }));
        }

        let body = json!({
            "vector": self.embedder.embed(&query.query),
            "topK": query.limit,
            "includeMetadata": true,
            "namespace": self.index_namespace,
            "filter": Value::Object(filter),
        });
        let response = self.client.post("/query", body).await?.into_json();

        let matches = response
            .get("matches")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(matches
            .iter()
            .filter_map(|m| {
                let id = m.get("id").and_then(Value::as_str)?;
                self.parse_vector(id, m)
            })
            .collect())
    }

    async fn fetch_by_id(&self, id: &RecordId) -> Result<Option<MemoryRecord>> {
        self.check()?;
        let mut payload = RequestPayload::new().with_query("ids", id.as_str());
        if !self.index_namespace.is_empty() {
            payload = payload.with_query("namespace", self.index_namespace.clone());
        }
        let response = self.client.get("/vectors/fetch", &payload).await?.into_json();

        Ok(response
            .get("vectors")
            .and_then(|v| v.get(id.as_str()))
            .and_then(|vector| self.parse_vector(id.as_str(), vector)))
    }

    async fn update(&self, id: &RecordId, patch: &RecordPatch) -> Result<MemoryRecord> {
        self.check()?;
        let mut record = self
            .fetch_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        record.metadata.remove("vector_score");
        record.apply_patch(patch);

        if patch.content.is_some() {
            self.upsert(&record).await?;
        } else {
            // Re-upserting would write back the metadata prefix as content.
            let set_metadata = patch.metadata.clone().unwrap_or_default();
            self.client
                .post(
                    "/vectors/update",
                    json!({
                        "id": id.as_str(),
                        "setMetadata": set_metadata,
                        "namespace": self.index_namespace,
                    }),
                )
                .await?;
        }
        Ok(record)
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        self.check()?;
        if self.fetch_by_id(id).await?.is_none() {
            return Ok(false);
        }
        self.client
            .post(
                "/vectors/delete",
                json!({ "ids": [id.as_str()], "namespace": self.index_namespace }),
            )
            .await?;
        Ok(true)
    }

    async fn health_check(&self) -> AdapterHealth {
        if !self.is_initialized() {
            return AdapterHealth::not_initialized(&self.name, self.kind());
        }
        let started = Instant::now();
        match self.describe().await {
            Ok(_) => AdapterHealth::healthy(
                &self.name,
                self.kind(),
                Some(started.elapsed().as_millis() as u64),
            ),
            Err(e) => AdapterHealth::unhealthy(&self.name, self.kind(), e.to_string()),
        }
    }

    async fn statistics(&self) -> AdapterStats {
        let stats = AdapterStats::new(&self.name, self.kind(), self.is_initialized())
            .with_detail("index_name", json!(self.index_name))
            .with_detail("dimension", json!(self.embedder.dimension()));
        if !self.is_initialized() {
            return stats;
        }
        match self.describe().await {
            Ok(described) => match described.get("totalVectorCount").and_then(Value::as_u64) {
                Some(count) => stats.with_count(count),
                None => stats,
            },
            Err(e) => stats.with_detail("error", json!(e.to_string())),
        }
    }
}
