//! Generic HTTP memory API adapter.
//!
//! Covers bucket-organised memory services. When a bucket is configured,
//! initialisation finds it by name or `metadata.namespace` and creates it
//! if missing; every write and search is then scoped to its id.

use super::{
    ensure_initialized, extract_items, parse_remote_record, remote_metadata, string_field,
    NativeIdCache,
};
use crate::adapter::backend::{AdapterHealth, AdapterKind, AdapterStats, MemoryAdapter};
use crate::adapter::record::{MemoryRecord, RecordId, RecordPatch, SearchQuery};
use crate::config::HttpMemoryConfig;
use crate::core::{DisplayZone, Error, Result};
use crate::transport::{Auth, Method, RequestPayload, ResilientClient, RetryPolicy};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Remote limit multiplier for searches not scoped to a bucket.
const UNSCOPED_OVERFETCH: usize = 5;

pub struct HttpMemoryAdapter {
    name: String,
    bucket: Option<String>,
    bucket_id: RwLock<Option<String>>,
    client: ResilientClient,
    native_ids: RwLock<NativeIdCache>,
    zone: DisplayZone,
    initialized: AtomicBool,
}

/// Unwrap `{"data": {...}}` single-object envelopes.
fn unwrap_object(body: Value) -> Value {
    match body {
        Value::Object(mut map) if matches!(map.get("data"), Some(Value::Object(_))) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

impl HttpMemoryAdapter {
    pub fn new(config: &HttpMemoryConfig, zone: DisplayZone) -> Result<Self> {
        let auth = match &config.api_key {
            Some(key) if !key.is_empty() => Auth::Bearer(key.clone()),
            _ => Auth::None,
        };
        let client = ResilientClient::new(&config.base_url, auth, RetryPolicy::from(&config.retry))?;

        Ok(Self {
            name: config.name.clone(),
            bucket: config.bucket.clone(),
            bucket_id: RwLock::new(None),
            client,
            native_ids: RwLock::new(NativeIdCache::default()),
            zone,
            initialized: AtomicBool::new(false),
        })
    }

    fn check(&self) -> Result<()> {
        ensure_initialized(self.is_initialized(), &self.name)
    }

    /// Find the bucket for `namespace`, creating it when absent.
    async fn ensure_bucket(&self, namespace: &str) -> Result<String> {
        let listed = self.client.get("/v1/buckets", &RequestPayload::new()).await?.into_json();
        let found = extract_items(&listed).into_iter().find(|bucket| {
            bucket.get("name").and_then(Value::as_str) == Some(namespace)
                || bucket
                    .get("metadata")
                    .and_then(|m| m.get("namespace"))
                    .and_then(Value::as_str)
                    == Some(namespace)
        });
        if let Some(id) = found.as_ref().and_then(|b| string_field(b, &["id"])) {
            debug!(backend = %self.name, bucket = %namespace, bucket_id = %id, "bucket found");
            return Ok(id);
        }

        let created = self
            .client
            .post(
                "/v1/buckets",
                json!({
                    "name": namespace,
                    "description": format!("Bucket for {}", namespace),
                    "metadata": { "namespace": namespace },
                }),
            )
            .await?
            .into_json();
        let id = string_field(&unwrap_object(created), &["id"])
            .ok_or_else(|| Error::DeserializationError("bucket creation response has no id".into()))?;
        info!(backend = %self.name, bucket = %namespace, bucket_id = %id, "bucket created");
        Ok(id)
    }

    async fn native_id(&self, id: &RecordId) -> String {
        self.native_ids
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn memory_path(native: &str) -> String {
        format!("/v1/memories/{}", native)
    }
}

fn is_not_found(err: &Error) -> bool {
    err.status() == Some(404)
}

#[async_trait]
impl MemoryAdapter for HttpMemoryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::HttpMemory
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    async fn initialize(&self) -> Result<bool> {
        if self.is_initialized() {
            return Ok(true);
        }
        match &self.bucket {
            Some(bucket) => {
                let id = self.ensure_bucket(bucket).await?;
                *self.bucket_id.write().await = Some(id);
            }
            None => {
                self.client.get("/health", &RequestPayload::new()).await?;
            }
        }
        self.initialized.store(true, Ordering::Release);
        info!(backend = %self.name, "http memory API ready");
        Ok(true)
    }

    async fn store(&self, record: MemoryRecord) -> Result<MemoryRecord> {
        self.check()?;
        let mut body = json!({
            "content": record.content,
            "metadata": remote_metadata(&record),
        });
        if let Some(bucket_id) = self.bucket_id.read().await.clone() {
            body["bucket_id"] = json!(bucket_id);
        }

        let response = unwrap_object(self.client.post("/v1/memories", body).await?.into_json());
        let mut stored = record.with_source(&self.name);
        if let Some(native) = string_field(&response, &["id"]) {
            self.native_ids
                .write()
                .await
                .insert(stored.id.clone(), native.clone());
            stored.backend_ref = Some(native);
        }
        Ok(stored)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryRecord>> {
        self.check()?;
        let mut payload = RequestPayload::new().with_query("q", query.query.clone());
        payload = match self.bucket_id.read().await.clone() {
            Some(bucket_id) => payload
                .with_query("bucket_id", bucket_id)
                .with_query("limit", query.limit.to_string()),
            // Namespaces share one store; the local filter below drops
            // foreign hits, so ask for more than the caller keeps.
            None => payload.with_query("namespace", query.namespace.clone()).with_query(
                "limit",
                query.limit.saturating_mul(UNSCOPED_OVERFETCH).to_string(),
            ),
        };

        let response = self
            .client
            .get("/v1/memories/search", &payload)
            .await?
            .into_json();

        let mut records: Vec<MemoryRecord> = extract_items(&response)
            .iter()
            .filter_map(|item| parse_remote_record(item, &self.name, &query.namespace, &self.zone))
            .filter(|record| record.namespace == query.namespace)
            .filter(|record| query.matches_filters(record))
            .collect();
        records.truncate(query.limit);

        let mut native_ids = self.native_ids.write().await;
        for record in &records {
            if let Some(native) = &record.backend_ref {
                native_ids.insert(record.id.clone(), native.clone());
            }
        }
        Ok(records)
    }

    async fn fetch_by_id(&self, id: &RecordId) -> Result<Option<MemoryRecord>> {
        self.check()?;
        let native = self.native_id(id).await;
        match self
            .client
            .get(&Self::memory_path(&native), &RequestPayload::new())
            .await
        {
            Ok(body) => Ok(parse_remote_record(
                &unwrap_object(body.into_json()),
                &self.name,
                "default",
                &self.zone,
            )),
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
        let body = json!({ "content": record.content, "metadata": remote_metadata(&record) });
        self.client
            .execute(
                Method::PATCH,
                &Self::memory_path(&native),
                &RequestPayload::json(body),
            )
            .await?;
        Ok(record)
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        self.check()?;
        let native = self.native_id(id).await;
        match self
            .client
            .execute(Method::DELETE, &Self::memory_path(&native), &RequestPayload::new())
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
        match self.client.get("/health", &RequestPayload::new()).await {
            Ok(_) => AdapterHealth::healthy(
                &self.name,
                self.kind(),
                Some(started.elapsed().as_millis() as u64),
            ),
            Err(e) => AdapterHealth::unhealthy(&self.name, self.kind(), e.to_string()),
        }
    }

    async fn statistics(&self) -> AdapterStats {
        let mut stats = AdapterStats::new(&self.name, self.kind(), self.is_initialized())
            .with_detail("tracked_ids", json!(self.native_ids.read().await.len()));
        if let Some(bucket_id) = self.bucket_id.read().await.clone() {
            stats = stats.with_detail("bucket_id", json!(bucket_id));
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::record::Metadata;
    use crate::config::RetryConfig;
    use crate::transport::testing::FakeServer;

    fn config(url: &str, bucket: Option<&str>) -> HttpMemoryConfig {
        HttpMemoryConfig {
            name: "memoryplugin".into(),
            base_url: url.into(),
            api_key: Some("mp-key".into()),
            bucket: bucket.map(String::from),
            retry: RetryConfig {
                max_retries: 0,
                backoff_unit_ms: 1,
                ..Default::default()
            },
        }
    }

    fn record(content: &str) -> MemoryRecord {
        MemoryRecord::new(
            RecordId::new("r1"),
            content,
            Metadata::new(),
            "legal",
            &DisplayZone::default(),
        )
    }

    #[tokio::test]
    async fn test_initialize_finds_existing_bucket() {
        let server = FakeServer::start(|_| {
            (
                200,
                json!([
                    {"id": "b-1", "name": "other"},
                    {"id": "b-2", "name": "x", "metadata": {"namespace": "legal:case-1"}}
                ])
                .to_string(),
            )
        })
        .await;
        let adapter =
            HttpMemoryAdapter::new(&config(&server.url(), Some("legal:case-1")), DisplayZone::default())
                .unwrap();

        assert!(adapter.initialize().await.unwrap());
        assert_eq!(adapter.bucket_id.read().await.as_deref(), Some("b-2"));
        assert_eq!(server.requests().len(), 1);
        assert_eq!(server.requests()[0].header("authorization"), Some("Bearer mp-key"));

        // Idempotent
        assert!(adapter.initialize().await.unwrap());
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_creates_missing_bucket() {
        let server = FakeServer::start(|req| match req.method.as_str() {
            "GET" => (200, r#"{"items":[]}"#.into()),
            _ => (201, r#"{"data":{"id":"b-new"}}"#.into()),
        })
        .await;
        let adapter =
            HttpMemoryAdapter::new(&config(&server.url(), Some("legal")), DisplayZone::default())
                .unwrap();

        assert!(adapter.initialize().await.unwrap());
        assert_eq!(adapter.bucket_id.read().await.as_deref(), Some("b-new"));
        let create = &server.requests()[1];
        assert_eq!(create.json()["metadata"]["namespace"], "legal");
    }

    #[tokio::test]
    async fn test_store_and_search_in_bucket() {
        let server = FakeServer::start(|req| match (req.method.as_str(), req.path()) {
            ("GET", "/v1/buckets") => (200, r#"[{"id":"b-1","name":"legal"}]"#.into()),
            ("POST", "/v1/memories") => (200, r#"{"id":"m-1"}"#.into()),
            ("GET", "/v1/memories/search") => (
                200,
                json!({"memories": [
                    {"id": "m-1", "content": "evidence-17", "metadata": {"record_id": "r1", "namespace": "legal"}},
                    {"id": "m-7", "content": "evidence-99", "metadata": {"namespace": "other"}}
                ]})
                .to_string(),
            ),
            _ => (404, "".into()),
        })
        .await;
        let adapter =
            HttpMemoryAdapter::new(&config(&server.url(), Some("legal")), DisplayZone::default())
                .unwrap();
        adapter.initialize().await.unwrap();

        let stored = adapter.store(record("evidence-17")).await.unwrap();
        assert_eq!(stored.backend_ref.as_deref(), Some("m-1"));
        assert_eq!(server.requests()[1].json()["bucket_id"], "b-1");

        let hits = adapter
            .search(&SearchQuery::new("evidence", "legal", 10))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, RecordId::new("r1"));

        let search = &server.requests()[2];
        assert_eq!(search.query_param("q").as_deref(), Some("evidence"));
        assert_eq!(search.query_param("bucket_id").as_deref(), Some("b-1"));
    }

    #[tokio::test]
    async fn test_unscoped_search_skips_foreign_namespaces() {
        // Foreign hits rank first; the server honours `limit`.
        let server = FakeServer::start(|req| {
            let limit: usize = req
                .query_param("limit")
                .and_then(|l| l.parse().ok())
                .unwrap_or(usize::MAX);
            let hits: Vec<Value> = (0..6)
                .map(|i| {
                    let namespace = if i < 4 { "other" } else { "legal" };
                    json!({
                        "id": format!("m-{}", i),
                        "content": format!("evidence-{}", i),
                        "metadata": {"record_id": format!("r{}", i), "namespace": namespace},
                    })
                })
                .take(limit)
                .collect();
            (200, json!({ "items": hits }).to_string())
        })
        .await;
        let adapter =
            HttpMemoryAdapter::new(&config(&server.url(), None), DisplayZone::default()).unwrap();
        adapter.initialized.store(true, Ordering::Release);

        let hits = adapter
            .search(&SearchQuery::new("evidence", "legal", 2))
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r4", "r5"]);

        let search = &server.requests()[0];
        assert_eq!(search.query_param("namespace").as_deref(), Some("legal"));
        assert_eq!(search.query_param("limit").as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_initialize_without_bucket_probes_health() {
        let server = FakeServer::start(|_| (503, "down".into())).await;
        let adapter =
            HttpMemoryAdapter::new(&config(&server.url(), None), DisplayZone::default()).unwrap();

        assert!(adapter.initialize().await.is_err());
        assert!(!adapter.is_initialized());
        assert_eq!(server.requests()[0].path(), "/health");
    }

    #[tokio::test]
    async fn test_delete_uses_native_id() {
        let server = FakeServer::start(|req| match req.method.as_str() {
            "POST" => (200, r#"{"id":"m-1"}"#.into()),
            _ => (200, "{}".into()),
        })
        .await;
        let adapter =
            HttpMemoryAdapter::new(&config(&server.url(), None), DisplayZone::default()).unwrap();
        adapter.initialize().await.unwrap();
        adapter.store(record("x")).await.unwrap();

        assert!(adapter.delete(&RecordId::new("r1")).await.unwrap());
        let delete = server.requests().pop().unwrap();
        assert_eq!(delete.method, "DELETE");
        assert_eq!(delete.path(), "/v1/memories/m-1");
    }
}
