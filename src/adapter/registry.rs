//! Adapter registry.
//!
//! Ordered name → adapter mapping. Registration order is the
//! deterministic order used for fan-out results and merging.

use crate::adapter::backend::{AdapterHealth, AdapterKind, AdapterStats, MemoryAdapter};
use crate::core::{now, Error, Result, Timestamp};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Adapter lifecycle status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterStatus {
    /// Registered, not yet initialized
    Registered,
    /// Initialized and eligible for fan-out
    Active,
    /// Initialization failed; excluded for the life of the process
    Excluded(String),
}

/// Outcome of initializing one adapter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitReport {
    pub name: String,
    pub kind: AdapterKind,
    pub initialized: bool,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Registered adapter entry.
pub struct RegisteredAdapter {
    pub adapter: Arc<dyn MemoryAdapter>,
    pub status: AdapterStatus,
    pub registered_at: Timestamp,
}

/// Adapter registry.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<RegisteredAdapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter. Names must be unique.
    pub fn register(&mut self, adapter: Arc<dyn MemoryAdapter>) -> Result<()> {
        if self.position(adapter.name()).is_some() {
            return Err(Error::Config(format!(
                "adapter {} is already registered",
                adapter.name()
            )));
        }
        self.adapters.push(RegisteredAdapter {
            adapter,
            status: AdapterStatus::Registered,
            registered_at: now(),
        });
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.adapters.iter().position(|e| e.adapter.name() == name)
    }

    /// Initialize every adapter still in `Registered` state, concurrently.
    ///
    /// Adapters that return `false` or an error are excluded permanently.
    pub async fn initialize_all(&mut self) -> Vec<InitReport> {
        let pending: Vec<usize> = self
            .adapters
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status == AdapterStatus::Registered)
            .map(|(i, _)| i)
            .collect();

        let attempts = pending.iter().map(|&i| {
            let adapter = self.adapters[i].adapter.clone();
            async move {
                let started = Instant::now();
                let result = adapter.initialize().await;
                (i, result, started.elapsed().as_millis() as u64)
            }
        });
        let results = join_all(attempts).await;

        let mut reports = Vec::with_capacity(results.len());
        for (i, result, elapsed_ms) in results {
            let entry = &mut self.adapters[i];
            let name = entry.adapter.name().to_string();
            let kind = entry.adapter.kind();

            let error = match result {
                Ok(true) => None,
                Ok(false) => Some("adapter reported unusable".to_string()),
                Err(e) => Some(e.to_string()),
            };
            match &error {
                None => {
                    info!(backend = %name, %kind, elapsed_ms, "adapter initialized");
                    entry.status = AdapterStatus::Active;
                }
                Some(reason) => {
                    warn!(backend = %name, %kind, error = %reason, "adapter excluded");
                    entry.status = AdapterStatus::Excluded(reason.clone());
                }
            }
            reports.push(InitReport {
                initialized: error.is_none(),
                name,
                kind,
                error,
                elapsed_ms,
            });
        }
        reports
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MemoryAdapter>> {
        self.position(name).map(|i| self.adapters[i].adapter.clone())
    }

    pub fn status(&self, name: &str) -> Option<&AdapterStatus> {
        self.position(name).map(|i| &self.adapters[i].status)
    }

    /// All registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.adapters
            .iter()
            .map(|e| e.adapter.name().to_string())
            .collect()
    }

    /// Names eligible for fan-out, in registration order.
    pub fn active_names(&self) -> Vec<String> {
        self.adapters
            .iter()
            .filter(|e| e.status == AdapterStatus::Active)
            .map(|e| e.adapter.name().to_string())
            .collect()
    }

    /// Active adapter by name.
    pub fn active(&self, name: &str) -> Option<Arc<dyn MemoryAdapter>> {
        self.position(name)
            .map(|i| &self.adapters[i])
            .filter(|e| e.status == AdapterStatus::Active)
            .map(|e| e.adapter.clone())
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Health of every registered adapter, in registration order.
    pub async fn health(&self) -> Vec<AdapterHealth> {
        join_all(self.adapters.iter().map(|e| e.adapter.health_check())).await
    }

    pub async fn statistics(&self) -> Vec<AdapterStats> {
        join_all(self.adapters.iter().map(|e| e.adapter.statistics())).await
    }
}
