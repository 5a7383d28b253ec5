//! Federation engine.
//!
//! Fans each logical operation out to the selected adapters, tolerates
//! partial failure, merges search results and records every operation in
//! the audit chain.
//!
//! Each operation moves through `Preparing → Dispatching → Collecting →
//! Finalized`. The intent entry is appended before dispatch and finalized
//! once outcomes are known, so an attempt always leaves exactly one entry.

use crate::adapter::{
    create_registry, AdapterRegistry, InitReport, MemoryAdapter, MemoryRecord, RecordId,
    SearchQuery,
};
use crate::audit::{
    AuditChain, AuditEntry, ChainVerification, ForensicReport, OperationKind, ResultStatus,
};
use crate::config::{EngineConfig, FederationConfig};
use crate::core::crypto::CryptoSuite;
use crate::core::{DisplayZone, Error, Result};
use crate::federation::outcome::{
    aggregate_status, succeeded_backends, BackendOutcome, BulkItemResult, BulkStoreSummary,
    DeleteRequest, FetchOutcome, MutationOutcome, OperationPhase, SearchOutcome, SearchRequest,
    StoreOutcome, StoreRequest, SystemHealth, SystemStatus, UpdateRequest,
};
use crate::federation::routing::{BackendSelector, NamespaceRouter};
use crate::merge::{RelevanceScorer, ResultMerger};
use crate::monitoring::{FederationMetrics, OperationCounter};
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// The federation engine.
pub struct FederationEngine {
    registry: AdapterRegistry,
    selector: Arc<dyn BackendSelector>,
    scorer: Option<Arc<dyn RelevanceScorer>>,
    audit: Arc<AuditChain>,
    metrics: Arc<FederationMetrics>,
    config: EngineConfig,
    zone: DisplayZone,
}

impl FederationEngine {
    /// Create an engine over an already-initialized registry.
    pub fn new(
        registry: AdapterRegistry,
        selector: Arc<dyn BackendSelector>,
        config: EngineConfig,
    ) -> Self {
        let zone = config.display_zone();
        Self {
            metrics: Arc::new(FederationMetrics::new(registry.names())),
            audit: Arc::new(AuditChain::new(zone.clone())),
            registry,
            selector,
            scorer: None,
            config,
            zone,
        }
    }

    /// Build adapters from configuration, initialize them and wire routing.
    pub async fn from_config(config: FederationConfig) -> Result<Self> {
        config.validate()?;
        let zone = config.engine.display_zone();
        let mut registry = create_registry(&config.adapters, &zone)?;
        let reports = registry.initialize_all().await;
        let active = reports.iter().filter(|r| r.initialized).count();
        info!(
            registered = reports.len(),
            active, "federation engine initialized"
        );

        let selector = Arc::new(NamespaceRouter::from_config(&config.routing));
        Ok(Self::new(registry, selector, config.engine))
    }

    /// Re-rank merged search results with `scorer`.
    pub fn with_scorer(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Record into a shared chain.
    pub fn with_audit_chain(mut self, audit: Arc<AuditChain>) -> Self {
        self.audit = audit;
        self
    }

    /// Initialize any adapters still pending.
    pub async fn initialize(&mut self) -> Vec<InitReport> {
        self.registry.initialize_all().await
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared audit chain.
    pub fn audit(&self) -> &Arc<AuditChain> {
        &self.audit
    }

    pub fn metrics(&self) -> &FederationMetrics {
        &self.metrics
    }

    /// Verify the audit chain; a broken chain is an error.
    pub fn verify_audit(&self) -> Result<ChainVerification> {
        self.audit.ensure_intact()
    }

    /// Store content on every selected backend.
    pub async fn store(&self, request: StoreRequest) -> Result<StoreOutcome> {
        self.validate_content(&request.content)?;

        let record = MemoryRecord::new(
            RecordId::generate(),
            request.content,
            request.metadata,
            request.namespace,
            &self.zone,
        );
        let payload = json!({
            "record_id": record.id,
            "namespace": record.namespace,
            "content_hash": record.content_hash,
            "metadata": record.metadata,
            "timestamp_utc": record.created_at.utc,
        });
        let entry = self.begin(OperationKind::Store, &record.namespace, &payload)?;

        let backends = self.select(&record.namespace);
        log_phase(OperationKind::Store, OperationPhase::Dispatching, &entry, backends.len());
        let outcomes = self
            .fan_out(&backends, |adapter| {
                let record = record.clone();
                async move { adapter.store(record).await }
            })
            .await;

        let status = self.finish(OperationKind::Store, &entry, &outcomes);
        info!(
            record_id = %record.id,
            namespace = %record.namespace,
            %status,
            "federated store complete"
        );

        Ok(StoreOutcome {
            providers_used: succeeded_backends(&outcomes),
            content_hash: record.content_hash.clone(),
            record,
            status,
            outcomes,
            audit_entry_id: entry.entry_id,
            audit_chain_index: entry.chain_index,
        })
    }

    /// Search every selected backend and merge the results.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchOutcome> {
        let limit = self.validate_search(&request)?;

        let query = SearchQuery {
            query: request.query,
            namespace: request.namespace,
            filters: request.filters,
            limit,
        };
        let entry = self.begin(OperationKind::Search, &query.namespace, &query)?;

        // Backends return up to the engine maximum; the caller's limit
        // applies after merge and ranking.
        let dispatched = SearchQuery {
            limit: self.config.max_search_limit,
            ..query.clone()
        };
        let backends = self.select(&query.namespace);
        log_phase(OperationKind::Search, OperationPhase::Dispatching, &entry, backends.len());
        let raw = self
            .fan_out(&backends, |adapter| {
                let query = dispatched.clone();
                async move { adapter.search(&query).await }
            })
            .await;

        let mut per_backend = Vec::with_capacity(raw.len());
        let mut outcomes = Vec::with_capacity(raw.len());
        for mut outcome in raw {
            let records = outcome.value.take();
            let mut summary = outcome.map(|_| 0);
            summary.value = records.as_ref().map(Vec::len);
            if let Some(records) = records {
                per_backend.push((summary.backend.clone(), records));
            }
            outcomes.push(summary);
        }
        let status = self.finish(OperationKind::Search, &entry, &outcomes);

        let mut results = ResultMerger::merge(&per_backend);
        if let Some(scorer) = &self.scorer {
            results = ResultMerger::rank(results, &query.query, scorer.as_ref());
        }
        let total_found = results.len();
        results.truncate(limit);

        debug!(
            namespace = %query.namespace,
            total_found,
            returned = results.len(),
            %status,
            "federated search complete"
        );

        Ok(SearchOutcome {
            query: query.query,
            namespace: query.namespace,
            status,
            results,
            total_found,
            providers_searched: backends,
            outcomes,
            audit_entry_id: entry.entry_id,
            audit_chain_index: entry.chain_index,
        })
    }

    /// Apply a patch on every selected backend.
    pub async fn update(&self, request: UpdateRequest) -> Result<MutationOutcome> {
        if request.patch.is_empty() {
            return Err(Error::InvalidRequest("update patch is empty".into()));
        }
        if let Some(content) = &request.patch.content {
            self.validate_content(content)?;
        }

        let payload = json!({
            "record_id": request.id,
            "namespace": request.namespace,
            "patch": request.patch,
        });
        let entry = self.begin(OperationKind::Update, &request.namespace, &payload)?;

        let backends = self.select(&request.namespace);
        log_phase(OperationKind::Update, OperationPhase::Dispatching, &entry, backends.len());
        let outcomes = self
            .fan_out(&backends, |adapter| {
                let id = request.id.clone();
                let patch = request.patch.clone();
                async move { adapter.update(&id, &patch).await.map(|_| true) }
            })
            .await;

        let status = self.finish(OperationKind::Update, &entry, &outcomes);
        Ok(mutation_outcome(request.id, OperationKind::Update, status, outcomes, entry))
    }

    /// Delete a record from every selected backend.
    ///
    /// A backend that does not hold the record counts as failed.
    pub async fn delete(&self, request: DeleteRequest) -> Result<MutationOutcome> {
        if request.id.as_str().trim().is_empty() {
            return Err(Error::InvalidRequest("record id must not be empty".into()));
        }

        let payload = json!({
            "record_id": request.id,
            "namespace": request.namespace,
        });
        let entry = self.begin(OperationKind::Delete, &request.namespace, &payload)?;

        let backends = self.select(&request.namespace);
        log_phase(OperationKind::Delete, OperationPhase::Dispatching, &entry, backends.len());
        let outcomes = self
            .fan_out(&backends, |adapter| {
                let id = request.id.clone();
                async move {
                    if adapter.delete(&id).await? {
                        Ok(true)
                    } else {
                        Err(Error::NotFound(id.to_string()))
                    }
                }
            })
            .await;

        let status = self.finish(OperationKind::Delete, &entry, &outcomes);
        Ok(mutation_outcome(request.id, OperationKind::Delete, status, outcomes, entry))
    }

    /// First copy of `id` among the selected backends, in selection order.
    ///
    /// Backend errors are logged and skipped.
    pub async fn fetch(&self, namespace: &str, id: &RecordId) -> Result<Option<FetchOutcome>> {
        if id.as_str().trim().is_empty() {
            return Err(Error::InvalidRequest("record id must not be empty".into()));
        }

        for name in self.select(namespace) {
            let Some(adapter) = self.registry.active(&name) else {
                continue;
            };
            match adapter.fetch_by_id(id).await {
                Ok(Some(record)) => {
                    return Ok(Some(FetchOutcome {
                        record,
                        backend: name,
                    }))
                }
                Ok(None) => {}
                Err(e) => warn!(backend = %name, record_id = %id, error = %e, "fetch failed"),
            }
        }
        Ok(None)
    }

    /// Store each request in turn. Validation errors are reported per item.
    pub async fn bulk_store(&self, requests: Vec<StoreRequest>) -> BulkStoreSummary {
        let mut items = Vec::with_capacity(requests.len());
        for (index, request) in requests.into_iter().enumerate() {
            let item = match self.store(request).await {
                Ok(outcome) => BulkItemResult {
                    index,
                    record_id: Some(outcome.record.id),
                    status: Some(outcome.status),
                    error: None,
                },
                Err(e) => BulkItemResult {
                    index,
                    record_id: None,
                    status: None,
                    error: Some(e.to_string()),
                },
            };
            items.push(item);
        }

        let summary = BulkStoreSummary::from_items(items);
        info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "bulk store complete"
        );
        summary
    }

    /// Health of every backend plus chain integrity and counters.
    pub async fn health(&self) -> SystemHealth {
        let backends = self.registry.health().await;
        let status = if self.registry.active_names().is_empty() {
            SystemStatus::Unavailable
        } else if backends.iter().any(|b| !b.is_healthy()) {
            SystemStatus::Degraded
        } else {
            SystemStatus::Operational
        };

        SystemHealth {
            status,
            backends,
            audit_chain_length: self.audit.len(),
            audit_chain_intact: self.audit.verify(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Signed integrity report over the current chain.
    pub fn forensic_report(&self, crypto: &CryptoSuite) -> Result<ForensicReport> {
        ForensicReport::build(
            &self.audit,
            self.metrics.snapshot(),
            self.registry.active_names(),
            &self.zone,
            crypto,
        )
    }

    fn validate_content(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(Error::InvalidRequest("content must not be empty".into()));
        }
        if content.len() > self.config.max_content_bytes {
            return Err(Error::ContentTooLarge {
                size: content.len(),
                max: self.config.max_content_bytes,
            });
        }
        Ok(())
    }

    /// Effective result limit for a valid search request.
    fn validate_search(&self, request: &SearchRequest) -> Result<usize> {
        if request.query.trim().is_empty() {
            return Err(Error::InvalidRequest("query must not be empty".into()));
        }
        let query_chars = request.query.chars().count();
        if query_chars > self.config.max_query_chars {
            return Err(Error::InvalidRequest(format!(
                "query is {} characters, limit is {}",
                query_chars, self.config.max_query_chars
            )));
        }
        match request.limit {
            None => Ok(self.config.default_search_limit),
            Some(limit) if limit == 0 || limit > self.config.max_search_limit => {
                Err(Error::InvalidRequest(format!(
                    "limit must be in 1..={}",
                    self.config.max_search_limit
                )))
            }
            Some(limit) => Ok(limit),
        }
    }

    fn select(&self, namespace: &str) -> Vec<String> {
        self.selector
            .select_backends(namespace, &self.registry.active_names())
    }

    /// Append the intent entry.
    fn begin<P: Serialize + ?Sized>(
        &self,
        operation: OperationKind,
        namespace: &str,
        payload: &P,
    ) -> Result<AuditEntry> {
        let entry = self
            .audit
            .append(operation, namespace, payload, ResultStatus::Pending)?;
        log_phase(operation, OperationPhase::Preparing, &entry, 0);
        Ok(entry)
    }

    /// Classify outcomes, finalize the entry and bump counters.
    fn finish<T>(
        &self,
        operation: OperationKind,
        entry: &AuditEntry,
        outcomes: &[BackendOutcome<T>],
    ) -> ResultStatus {
        log_phase(operation, OperationPhase::Collecting, entry, outcomes.len());
        let status = aggregate_status(outcomes);

        if let Err(e) = self.audit.finalize(&entry.entry_id, status) {
            warn!(chain_index = entry.chain_index, error = %e, "audit finalize failed");
        }
        let counter = match operation {
            OperationKind::Store => OperationCounter::Store,
            OperationKind::Search => OperationCounter::Search,
            OperationKind::Update => OperationCounter::Update,
            OperationKind::Delete => OperationCounter::Delete,
        };
        self.metrics
            .record_operation(counter, status != ResultStatus::Failed);

        log_phase(operation, OperationPhase::Finalized, entry, outcomes.len());
        status
    }

    /// Run `call` on every named adapter concurrently.
    ///
    /// One task per adapter; a shared deadline bounds the whole fan-out.
    /// Errors, panics and timeouts become failed outcomes. Output order
    /// follows `backends`.
    async fn fan_out<T, F, Fut>(&self, backends: &[String], call: F) -> Vec<BackendOutcome<T>>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn MemoryAdapter>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let started = Instant::now();
        let deadline = started + self.config.fanout_timeout();

        let calls = backends.iter().map(|name| {
            let adapter = self.registry.active(name);
            let task = adapter.map(|adapter| tokio::spawn(call(adapter)));
            async move {
                let elapsed = || started.elapsed().as_millis() as u64;
                let Some(mut task) = task else {
                    let error = Error::UnknownBackend(name.clone());
                    return BackendOutcome::failed(name, error.to_string(), 0);
                };
                match timeout_at(deadline, &mut task).await {
                    Ok(Ok(Ok(value))) => BackendOutcome::success(name, value, elapsed()),
                    Ok(Ok(Err(e))) => BackendOutcome::failed(name, e.to_string(), elapsed()),
                    Ok(Err(join_error)) => {
                        BackendOutcome::failed(name, join_error.to_string(), elapsed())
                    }
                    Err(_) => {
                        task.abort();
                        BackendOutcome::timed_out(name, elapsed())
                    }
                }
            }
        });
        let outcomes = join_all(calls).await;

        for outcome in &outcomes {
            self.metrics
                .record_backend(&outcome.backend, outcome.is_success());
            if !outcome.is_success() {
                warn!(
                    backend = %outcome.backend,
                    status = ?outcome.status,
                    error = outcome.error.as_deref().unwrap_or(""),
                    elapsed_ms = outcome.elapsed_ms,
                    "backend call failed"
                );
            }
        }
        outcomes
    }
}

fn log_phase(operation: OperationKind, phase: OperationPhase, entry: &AuditEntry, backends: usize) {
    debug!(
        %operation,
        ?phase,
        chain_index = entry.chain_index,
        backends,
        "operation phase"
    );
}

fn mutation_outcome(
    id: RecordId,
    operation: OperationKind,
    status: ResultStatus,
    outcomes: Vec<BackendOutcome<bool>>,
    entry: AuditEntry,
) -> MutationOutcome {
    MutationOutcome {
        id,
        operation,
        status,
        providers_used: succeeded_backends(&outcomes),
        outcomes,
        audit_entry_id: entry.entry_id,
        audit_chain_index: entry.chain_index,
    }
}
