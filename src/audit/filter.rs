//! Query filters for audit entries.

use crate::audit::entry::{AuditEntry, OperationKind, ResultStatus};
use crate::core::Timestamp;
use serde::{Deserialize, Serialize};

/// Filter for querying audit entries.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Filter by operation
    pub operation: Option<OperationKind>,
    /// Filter by result status
    pub status: Option<ResultStatus>,
    /// Filter by namespace
    pub namespace: Option<String>,
    /// Filter by date from
    pub date_from: Option<Timestamp>,
    /// Filter by date to
    pub date_to: Option<Timestamp>,
    /// Maximum results
    pub limit: Option<usize>,
    /// Offset for pagination
    pub offset: Option<usize>,
}

impl AuditFilter {
    /// Create a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by operation.
    pub fn by_operation(mut self, operation: OperationKind) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Filter by result status.
    pub fn by_status(mut self, status: ResultStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter by namespace.
    pub fn by_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Filter by date range.
    pub fn by_date_range(mut self, from: Timestamp, to: Timestamp) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    /// Set result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set pagination offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Check if an entry matches this filter.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(operation) = self.operation {
            if entry.operation != operation {
                return false;
            }
        }

        if let Some(status) = self.status {
            if entry.result_status != status {
                return false;
            }
        }

        if let Some(namespace) = &self.namespace {
            if &entry.namespace != namespace {
                return false;
            }
        }

        if let Some(from) = self.date_from {
            if entry.timestamp_utc < from {
                return false;
            }
        }

        if let Some(to) = self.date_to {
            if entry.timestamp_utc > to {
                return false;
            }
        }

        true
    }

    /// Apply matching, offset and limit to entries in chain order.
    pub fn apply<'a, I>(&self, entries: I) -> Vec<AuditEntry>
    where
        I: IntoIterator<Item = &'a AuditEntry>,
    {
        entries
            .into_iter()
            .filter(|e| self.matches(e))
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::crypto::sha3_256;
    use crate::core::{now, DisplayZone};
    use chrono::Duration;

    fn entry(operation: OperationKind, status: ResultStatus, namespace: &str) -> AuditEntry {
        let mut e = AuditEntry::new(
            operation,
            namespace,
            sha3_256(b"p"),
            0,
            "0",
            now(),
            &DisplayZone::default(),
            ResultStatus::Pending,
        )
        .unwrap();
        e.result_status = status;
        e
    }

    #[test]
    fn test_filter_builder() {
        let filter = AuditFilter::new()
            .by_operation(OperationKind::Search)
            .by_namespace("legal")
            .with_limit(10);

        assert_eq!(filter.operation, Some(OperationKind::Search));
        assert_eq!(filter.namespace.as_deref(), Some("legal"));
        assert_eq!(filter.limit, Some(10));
    }

    #[test]
    fn test_filter_matches() {
        let e = entry(OperationKind::Store, ResultStatus::Partial, "legal");

        assert!(AuditFilter::new().matches(&e));
        assert!(AuditFilter::new().by_status(ResultStatus::Partial).matches(&e));
        assert!(!AuditFilter::new().by_status(ResultStatus::Success).matches(&e));
        assert!(!AuditFilter::new().by_operation(OperationKind::Delete).matches(&e));
        assert!(!AuditFilter::new().by_namespace("other").matches(&e));
    }

    #[test]
    fn test_filter_date_range() {
        let e = entry(OperationKind::Store, ResultStatus::Success, "legal");
        let hour = Duration::hours(1);

        let around = AuditFilter::new().by_date_range(e.timestamp_utc - hour, e.timestamp_utc + hour);
        assert!(around.matches(&e));

        let before = AuditFilter::new().by_date_range(e.timestamp_utc - hour * 2, e.timestamp_utc - hour);
        assert!(!before.matches(&e));
    }

    #[test]
    fn test_apply_offset_and_limit() {
        let entries: Vec<AuditEntry> = (0..5)
            .map(|_| entry(OperationKind::Store, ResultStatus::Success, "legal"))
            .collect();

        let page = AuditFilter::new().with_offset(1).with_limit(2).apply(&entries);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].entry_id, entries[1].entry_id);
    }
}
