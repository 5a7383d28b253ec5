//! Audit Chain
//!
//! Tamper-evident, hash-chained log of every federation operation:
//! - SHA3-256 entry hashes over a canonical form
//! - Serialized appends with gap-free indices
//! - Verification and signed forensic reports

pub mod chain;
pub mod entry;
pub mod filter;
pub mod report;

pub use chain::{AuditChain, ChainVerification};
pub use entry::{AuditEntry, EntryId, OperationKind, ResultStatus, GENESIS_PREVIOUS_HASH};
pub use filter::AuditFilter;
pub use report::{ForensicReport, HASH_ALGORITHM, REPORT_TAIL_LEN};
