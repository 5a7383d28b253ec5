//! Federation Engine
//!
//! Concurrent fan-out of store/search/update/delete across the selected
//! adapters, with partial-failure tolerance, merged search results and
//! an audit entry per operation.

pub mod engine;
pub mod outcome;
pub mod routing;

pub use engine::FederationEngine;
pub use outcome::{
    aggregate_status, BackendOutcome, BulkItemResult, BulkStoreSummary, DeleteRequest,
    FetchOutcome, MutationOutcome, OperationPhase, OutcomeStatus, SearchOutcome, SearchRequest,
    StoreOutcome, StoreRequest, SystemHealth, SystemStatus, UpdateRequest,
};
pub use routing::{AllBackends, BackendSelector, NamespaceRouter, RouteRule};
