//! Process-wide federation counters.
//!
//! Every counter is a lock-free atomic. Per-backend counters are
//! registered up front so recording never takes a lock.

use crate::core::{now, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric (monotonically increasing).
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by amount.
    pub fn add(&self, amount: u64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    /// Get current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Reset to zero.
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Success/failure tallies for one backend.
#[derive(Debug, Default)]
pub struct BackendCounters {
    pub success: Counter,
    pub failure: Counter,
}

/// Which engine operation finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationCounter {
    Store,
    Search,
    Update,
    Delete,
}

/// Counters for the federation engine.
#[derive(Debug)]
pub struct FederationMetrics {
    total_stored: Counter,
    success_count: Counter,
    failure_count: Counter,
    search_count: Counter,
    update_count: Counter,
    delete_count: Counter,
    backends: BTreeMap<String, BackendCounters>,
    started_at: Timestamp,
}

impl FederationMetrics {
    /// Create metrics with per-backend counters for the given names.
    pub fn new<I, S>(backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            total_stored: Counter::new(),
            success_count: Counter::new(),
            failure_count: Counter::new(),
            search_count: Counter::new(),
            update_count: Counter::new(),
            delete_count: Counter::new(),
            backends: backends
                .into_iter()
                .map(|name| (name.into(), BackendCounters::default()))
                .collect(),
            started_at: now(),
        }
    }

    /// Record a finished operation and whether its aggregate status was
    /// anything other than failed.
    pub fn record_operation(&self, operation: OperationCounter, succeeded: bool) {
        match operation {
            OperationCounter::Store => self.total_stored.inc(),
            OperationCounter::Search => self.search_count.inc(),
            OperationCounter::Update => self.update_count.inc(),
            OperationCounter::Delete => self.delete_count.inc(),
        }
        if succeeded {
            self.success_count.inc();
        } else {
            self.failure_count.inc();
        }
    }

    /// Record one backend call. Unregistered names are ignored.
    pub fn record_backend(&self, backend: &str, succeeded: bool) {
        if let Some(counters) = self.backends.get(backend) {
            if succeeded {
                counters.success.inc();
            } else {
                counters.failure.inc();
            }
        }
    }

    pub fn total_stored(&self) -> u64 {
        self.total_stored.get()
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.get()
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.get()
    }

    pub fn search_count(&self) -> u64 {
        self.search_count.get()
    }

    /// Counters for a single backend.
    pub fn backend(&self, name: &str) -> Option<&BackendCounters> {
        self.backends.get(name)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let taken_at = now();
        let total = self.success_count.get() + self.failure_count.get();
        let success_rate = if total == 0 {
            0.0
        } else {
            self.success_count.get() as f64 / total as f64
        };

        MetricsSnapshot {
            total_stored: self.total_stored.get(),
            success_count: self.success_count.get(),
            failure_count: self.failure_count.get(),
            search_count: self.search_count.get(),
            update_count: self.update_count.get(),
            delete_count: self.delete_count.get(),
            success_rate,
            backends: self
                .backends
                .iter()
                .map(|(name, c)| {
                    (
                        name.clone(),
                        BackendSnapshot {
                            success: c.success.get(),
                            failure: c.failure.get(),
                        },
                    )
                })
                .collect(),
            started_at: self.started_at,
            uptime_secs: (taken_at - self.started_at).num_seconds().max(0) as u64,
            taken_at,
        }
    }
}

/// Serialisable copy of one backend's counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSnapshot {
    pub success: u64,
    pub failure: u64,
}

/// Serialisable copy of [`FederationMetrics`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_stored: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub search_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
    pub success_rate: f64,
    pub backends: BTreeMap<String, BackendSnapshot>,
    pub started_at: Timestamp,
    pub taken_at: Timestamp,
    pub uptime_secs: u64,
}
