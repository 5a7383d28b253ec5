//! Process-local memory store.
//!
//! Used for development, tests, and as the zero-config fallback.

use super::ensure_initialized;
use crate::adapter::backend::{AdapterHealth, AdapterKind, AdapterStats, MemoryAdapter};
use crate::adapter::record::{MemoryRecord, RecordId, RecordPatch, SearchQuery};
use crate::core::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-memory adapter keeping records in insertion order.
pub struct InMemoryAdapter {
    name: String,
    initialized: AtomicBool,
    records: RwLock<Vec<MemoryRecord>>,
}

impl InMemoryAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            initialized: AtomicBool::new(false),
            records: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    fn check(&self) -> Result<()> {
        ensure_initialized(self.is_initialized(), &self.name)
    }
}

#[async_trait]
impl MemoryAdapter for InMemoryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::InMemory
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    async fn initialize(&self) -> Result<bool> {
        self.initialized.store(true, Ordering::Release);
        Ok(true)
    }

    async fn store(&self, record: MemoryRecord) -> Result<MemoryRecord> {
        self.check()?;
        let record = record.with_source(&self.name);

        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(record)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryRecord>> {
        self.check()?;
        let needle = query.query.to_lowercase();

        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.namespace == query.namespace)
            .filter(|r| r.content.to_lowercase().contains(&needle))
            .filter(|r| query.matches_filters(r))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn fetch_by_id(&self, id: &RecordId) -> Result<Option<MemoryRecord>> {
        self.check()?;
        let records = self.records.read().await;
        Ok(records.iter().find(|r| &r.id == id).cloned())
    }

    async fn update(&self, id: &RecordId, patch: &RecordPatch) -> Result<MemoryRecord> {
        self.check()?;
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        record.apply_patch(patch);
        Ok(record.clone())
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        self.check()?;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| &r.id != id);
        Ok(records.len() != before)
    }

    async fn health_check(&self) -> AdapterHealth {
        if self.is_initialized() {
            AdapterHealth::healthy(&self.name, self.kind(), Some(0))
        } else {
            AdapterHealth::not_initialized(&self.name, self.kind())
        }
    }

    async fn statistics(&self) -> AdapterStats {
        AdapterStats::new(&self.name, self.kind(), self.is_initialized())
            .with_count(self.records.read().await.len() as u64)
    }
}
