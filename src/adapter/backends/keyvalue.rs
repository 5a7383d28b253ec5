//! Hosted key-value memory adapter.
//!
//! The service assigns its own memory ids. The canonical id travels in
//! metadata under `record_id` and native ids are cached per canonical id.
//! An optional secondary account mirrors writes on a best-effort basis.

use super::{
    ensure_initialized, extract_items, parse_remote_record, remote_metadata, string_field,
    NativeIdCache,
};
use crate::adapter::backend::{AdapterHealth, AdapterKind, AdapterStats, MemoryAdapter};
use crate::adapter::record::{MemoryRecord, RecordId, RecordPatch, SearchQuery};
use crate::config::KeyValueConfig;
use crate::core::{DisplayZone, Error, Result};
use crate::transport::{Auth, Method, RequestPayload, ResilientClient, RetryPolicy};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct KeyValueMemoryAdapter {
    name: String,
    api_key: String,
    client: ResilientClient,
    secondary: Option<ResilientClient>,
    native_ids: RwLock<NativeIdCache>,
    zone: DisplayZone,
    initialized: AtomicBool,
}

fn token_auth(key: &str) -> Auth {
    Auth::Header {
        name: "Authorization".to_string(),
        value: format!("Token {}", key),
    }
}

impl KeyValueMemoryAdapter {
    pub fn new(config: &KeyValueConfig, zone: DisplayZone) -> Result<Self> {
        let policy = RetryPolicy::from(&config.retry);
        let client = ResilientClient::new(&config.base_url, token_auth(&config.api_key), policy.clone())?;
        let secondary = match &config.api_key_secondary {
            Some(key) if !key.is_empty() => Some(ResilientClient::new(
                &config.base_url,
                token_auth(key),
                policy,
            )?),
            _ => None,
        };

        Ok(Self {
            name: config.name.clone(),
            api_key: config.api_key.clone(),
            client,
            secondary,
            native_ids: RwLock::new(NativeIdCache::default()),
            zone,
            initialized: AtomicBool::new(false),
        })
    }

    fn check(&self) -> Result<()> {
        ensure_initialized(self.is_initialized(), &self.name)
    }

    /// Native id for a canonical id; falls back to the canonical id itself.
    async fn native_id(&self, id: &RecordId) -> String {
        self.native_ids
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    async fn remember(&self, record: &MemoryRecord) {
        if let Some(native) = &record.backend_ref {
            self.native_ids
                .write()
                .await
                .insert(record.id.clone(), native.clone());
        }
    }

    fn add_body(record: &MemoryRecord) -> Value {
        json!({
            "messages": [{ "role": "user", "content": record.content }],
            "user_id": record.namespace,
            "metadata": remote_metadata(record),
            "infer": false,
        })
    }
}

/// Native id out of an add response: a list of events or a single object.
fn created_id(body: &Value) -> Option<String> {
    extract_items(body)
        .first()
        .and_then(|item| string_field(item, &["id"]))
        .or_else(|| string_field(body, &["id"]))
}

fn is_not_found(err: &Error) -> bool {
    err.status() == Some(404)
}

#[async_trait]
impl MemoryAdapter for KeyValueMemoryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::KeyValue
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    async fn initialize(&self) -> Result<bool> {
        if self.api_key.trim().is_empty() {
            warn!(backend = %self.name, "no API key configured");
            return Ok(false);
        }
        if !self.initialized.swap(true, Ordering::AcqRel) {
            info!(
                backend = %self.name,
                mirrored = self.secondary.is_some(),
                "key-value memory client ready"
            );
        }
        Ok(true)
    }

    async fn store(&self, record: MemoryRecord) -> Result<MemoryRecord> {
        self.check()?;
        let body = Self::add_body(&record);
        let response = self.client.post("/v1/memories/", body.clone()).await?.into_json();

        if let Some(secondary) = &self.secondary {
            if let Err(e) = secondary.post("/v1/memories/", body).await {
                warn!(backend = %self.name, id = %record.id, error = %e, "secondary mirror write failed");
            }
        }

        let mut stored = record.with_source(&self.name);
        if let Some(native) = created_id(&response) {
            stored.backend_ref = Some(native);
            self.remember(&stored).await;
        }
        debug!(backend = %self.name, id = %stored.id, native = ?stored.backend_ref, "memory added");
        Ok(stored)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryRecord>> {
        self.check()?;
        let body = json!({
            "query": query.query,
            "user_id": query.namespace,
            "top_k": query.limit,
        });
        let response = self
            .client
            .post("/v1/memories/search/", body)
            .await?
            .into_json();

        let mut records = Vec::new();
        for item in extract_items(&response) {
            if let Some(record) = parse_remote_record(&item, &self.name, &query.namespace, &self.zone) {
                if query.matches_filters(&record) {
                    self.remember(&record).await;
                    records.push(record);
                }
            }
        }
        records.truncate(query.limit);
        Ok(records)
    }

    async fn fetch_by_id(&self, id: &RecordId) -> Result<Option<MemoryRecord>> {
        self.check()?;
        let native = self.native_id(id).await;
        let target = format!("/v1/memories/{}/", native);
        match self.client.get(&target, &RequestPayload::new()).await {
            Ok(body) => {
                let item = body.into_json();
                Ok(parse_remote_record(&item, &self.name, "default", &self.zone))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update(&self, id: &RecordId, patch: &RecordPatch) -> Result<MemoryRecord> {
        self.check()?;
        let mut record = self
            .fetch_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        record.apply_patch(patch);

        let native = record.backend_ref.clone().unwrap_or_else(|| id.to_string());
        let body = json!({ "text": record.content, "metadata": remote_metadata(&record) });
        self.client
            .execute(
                Method::PUT,
                &format!("/v1/memories/{}/", native),
                &RequestPayload::json(body),
            )
            .await?;
        Ok(record)
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        self.check()?;
        let native = self.native_id(id).await;
        let target = format!("/v1/memories/{}/", native);
        match self
            .client
            .execute(Method::DELETE, &target, &RequestPayload::new())
            .await
        {
            Ok(_) => {
                self.native_ids.write().await.remove(id);
                Ok(true)
            }
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn health_check(&self) -> AdapterHealth {
        if !self.is_initialized() {
            return AdapterHealth::not_initialized(&self.name, self.kind());
        }
        let started = Instant::now();
        let probe = RequestPayload::new()
            .with_query("user_id", "memfed-health")
            .with_query("page_size", "1");
        match self.client.get("/v1/memories/", &probe).await {
            Ok(_) => AdapterHealth::healthy(
                &self.name,
                self.kind(),
                Some(started.elapsed().as_millis() as u64),
            ),
            Err(e) => AdapterHealth::unhealthy(&self.name, self.kind(), e.to_string()),
        }
    }

    async fn statistics(&self) -> AdapterStats {
        AdapterStats::new(&self.name, self.kind(), self.is_initialized())
            .with_detail("tracked_ids", json!(self.native_ids.read().await.len()))
            .with_detail("mirrored", json!(self.secondary.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::record::Metadata;
    use crate::config::RetryConfig;
    use crate::transport::testing::FakeServer;

    fn config(url: &str, secondary: Option<&str>) -> KeyValueConfig {
        KeyValueConfig {
            name: "mem0".into(),
            api_key: "primary".into(),
            api_key_secondary: secondary.map(String::from),
            base_url: url.into(),
            retry: RetryConfig {
                max_retries: 0,
                backoff_unit_ms: 1,
                ..Default::default()
            },
        }
    }

    fn record(id: &str, content: &str) -> MemoryRecord {
        MemoryRecord::new(
            RecordId::new(id),
            content,
            Metadata::new(),
            "alice",
            &DisplayZone::default(),
        )
    }

    #[tokio::test]
    async fn test_store_caches_native_id_and_mirrors() {
        let server = FakeServer::start(|_| {
            (200, r#"[{"id":"mem-1","memory":"evidence-17","event":"ADD"}]"#.into())
        })
        .await;
        let adapter =
            KeyValueMemoryAdapter::new(&config(&server.url(), Some("secondary")), DisplayZone::default())
                .unwrap();
        adapter.initialize().await.unwrap();

        let stored = adapter.store(record("r1", "evidence-17")).await.unwrap();
        assert_eq!(stored.id, RecordId::new("r1"));
        assert_eq!(stored.backend_ref.as_deref(), Some("mem-1"));

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].header("authorization"), Some("Token primary"));
        assert_eq!(requests[1].header("authorization"), Some("Token secondary"));
        let body = requests[0].json();
        assert_eq!(body["user_id"], "alice");
        assert_eq!(body["metadata"]["record_id"], "r1");

        assert_eq!(adapter.native_id(&RecordId::new("r1")).await, "mem-1");
    }

    #[tokio::test]
    async fn test_secondary_failure_does_not_fail_store() {
        let server = FakeServer::start(|req| match req.header("authorization") {
            Some("Token primary") => (200, r#"{"id":"mem-1"}"#.into()),
            _ => (401, "bad key".into()),
        })
        .await;
        let adapter =
            KeyValueMemoryAdapter::new(&config(&server.url(), Some("stale")), DisplayZone::default())
                .unwrap();
        adapter.initialize().await.unwrap();

        let stored = adapter.store(record("r1", "x")).await.unwrap();
        assert_eq!(stored.backend_ref.as_deref(), Some("mem-1"));
    }

    #[tokio::test]
    async fn test_search_maps_canonical_ids() {
        let server = FakeServer::start(|_| {
            (
                200,
                json!({"results": [
                    {"id": "mem-1", "memory": "evidence-17", "metadata": {"record_id": "r1", "namespace": "alice"}},
                    {"id": "mem-2", "memory": "evidence-22"}
                ]})
                .to_string(),
            )
        })
        .await;
        let adapter =
            KeyValueMemoryAdapter::new(&config(&server.url(), None), DisplayZone::default()).unwrap();
        adapter.initialize().await.unwrap();

        let hits = adapter
            .search(&SearchQuery::new("evidence", "alice", 10))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, RecordId::new("r1"));
        assert_eq!(hits[1].id, RecordId::new("mem-2"));
        assert_eq!(hits[1].namespace, "alice");
        assert_eq!(adapter.native_id(&RecordId::new("r1")).await, "mem-1");
    }

    #[tokio::test]
    async fn test_search_hits_do_not_grow_id_map_past_capacity() {
        let server = FakeServer::start(|_| {
            let hits: Vec<Value> = (0..5)
                .map(|i| json!({"id": format!("mem-{}", i), "memory": format!("evidence-{}", i)}))
                .collect();
            (200, json!({ "results": hits }).to_string())
        })
        .await;
        let mut adapter =
            KeyValueMemoryAdapter::new(&config(&server.url(), None), DisplayZone::default()).unwrap();
        adapter.native_ids = RwLock::new(NativeIdCache::new(3));
        adapter.initialize().await.unwrap();

        for _ in 0..4 {
            let hits = adapter
                .search(&SearchQuery::new("evidence", "alice", 10))
                .await
                .unwrap();
            assert_eq!(hits.len(), 5);
        }
        assert_eq!(adapter.native_ids.read().await.len(), 3);
        assert_eq!(adapter.statistics().await.details["tracked_ids"], json!(3));

        // Evicted ids fall back to the canonical id
        assert_eq!(adapter.native_id(&RecordId::new("mem-0")).await, "mem-0");
        assert_eq!(adapter.native_id(&RecordId::new("mem-4")).await, "mem-4");
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let server = FakeServer::start(|_| (404, r#"{"detail":"Memory not found"}"#.into())).await;
        let adapter =
            KeyValueMemoryAdapter::new(&config(&server.url(), None), DisplayZone::default()).unwrap();
        adapter.initialize().await.unwrap();

        let err = adapter
            .update(&RecordId::new("r9"), &RecordPatch::content("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!adapter.delete(&RecordId::new("r9")).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_puts_to_native_id() {
        let server = FakeServer::start(|req| match req.method.as_str() {
            "GET" => (
                200,
                json!({"id": "mem-1", "memory": "old", "metadata": {"record_id": "r1"}}).to_string(),
            ),
            _ => (200, "{}".into()),
        })
        .await;
        let adapter =
            KeyValueMemoryAdapter::new(&config(&server.url(), None), DisplayZone::default()).unwrap();
        adapter.initialize().await.unwrap();

        let updated = adapter
            .update(&RecordId::new("r1"), &RecordPatch::content("new"))
            .await
            .unwrap();
        assert_eq!(updated.content, "new");

        let put = &server.requests()[1];
        assert_eq!(put.method, "PUT");
        assert_eq!(put.path(), "/v1/memories/mem-1/");
        assert_eq!(put.json()["text"], "new");
    }

    #[tokio::test]
    async fn test_initialize_requires_key() {
        let mut cfg = config("http://127.0.0.1:9", None);
        cfg.api_key = " ".into();
        let adapter = KeyValueMemoryAdapter::new(&cfg, DisplayZone::default()).unwrap();
        assert!(!adapter.initialize().await.unwrap());
        assert!(!adapter.is_initialized());
    }
}
