//! Monitoring Module
//!
//! Observability for the federation engine:
//! - Atomic operation counters
//! - Structured logging setup

pub mod logging;
pub mod metrics;

pub use logging::{init_tracing, LogFormat, LoggerConfig};
pub use metrics::{
    BackendCounters, BackendSnapshot, Counter, FederationMetrics, MetricsSnapshot,
    OperationCounter,
};
