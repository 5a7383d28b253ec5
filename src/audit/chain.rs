//! Hash-linked audit chain.
//!
//! Append-only log of federation operations. Appends are serialized
//! under a write lock so `chain_index` and `previous_hash` are assigned
//! without gaps. The only post-append change is the single
//! `Pending` → terminal status transition, which is outside the hash.

use crate::audit::entry::{
    AuditEntry, EntryId, OperationKind, ResultStatus, GENESIS_PREVIOUS_HASH,
};
use crate::audit::filter::AuditFilter;
use crate::core::crypto::canonical_hash;
use crate::core::{now, DisplayZone, Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info};

/// Result of chain verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// Whether the chain is valid
    pub valid: bool,
    /// Entries checked before the first failure
    pub entries_verified: u64,
    /// Whether tampering was detected
    pub tamper_detected: bool,
    /// Index of the first invalid entry (if any)
    pub first_invalid_index: Option<u64>,
}

/// The audit chain.
pub struct AuditChain {
    entries: RwLock<Vec<AuditEntry>>,
    zone: DisplayZone,
}

impl AuditChain {
    /// Create an empty chain rendering display times in `zone`.
    pub fn new(zone: DisplayZone) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            zone,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<AuditEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<AuditEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an entry for `payload`.
    ///
    /// The payload digest is computed outside the lock; index assignment,
    /// hashing and the push happen under it.
    pub fn append<T: Serialize + ?Sized>(
        &self,
        operation: OperationKind,
        namespace: &str,
        payload: &T,
        status: ResultStatus,
    ) -> Result<AuditEntry> {
        let data_hash = canonical_hash(payload)?;

        let mut entries = self.write();
        let (chain_index, previous_hash) = match entries.last() {
            Some(last) => (last.chain_index + 1, last.entry_hash.to_hex()),
            None => (0, GENESIS_PREVIOUS_HASH.to_string()),
        };
        let entry = AuditEntry::new(
            operation,
            namespace,
            data_hash,
            chain_index,
            &previous_hash,
            now(),
            &self.zone,
            status,
        )?;
        entries.push(entry.clone());
        drop(entries);

        debug!(
            chain_index,
            %operation,
            entry_id = %entry.entry_id,
            entry_hash = %entry.entry_hash.short(),
            "audit entry appended"
        );
        Ok(entry)
    }

    /// Record the final status of a pending entry.
    ///
    /// Fails if the entry is unknown or was already finalized.
    pub fn finalize(&self, entry_id: &EntryId, status: ResultStatus) -> Result<AuditEntry> {
        if !status.is_terminal() {
            return Err(Error::InvalidRequest(
                "cannot finalize an entry as pending".into(),
            ));
        }

        let mut entries = self.write();
        let entry = entries
            .iter_mut()
            .rev()
            .find(|e| &e.entry_id == entry_id)
            .ok_or_else(|| Error::AuditEntryNotFound(entry_id.to_string()))?;
        if entry.result_status.is_terminal() {
            return Err(Error::AuditEntryFinalized(entry_id.to_string()));
        }
        entry.result_status = status;
        entry.finalized_at = Some(now());

        debug!(chain_index = entry.chain_index, %status, "audit entry finalized");
        Ok(entry.clone())
    }

    /// Whether every hash and link in the chain checks out.
    pub fn verify(&self) -> bool {
        self.verify_detailed().valid
    }

    /// Walk the chain, stopping at the first bad hash or link.
    pub fn verify_detailed(&self) -> ChainVerification {
        let entries = self.read();
        let mut previous: Option<&AuditEntry> = None;

        for (i, entry) in entries.iter().enumerate() {
            if !entry.verify_hash() || !entry.links_to(previous) {
                return ChainVerification {
                    valid: false,
                    entries_verified: i as u64,
                    tamper_detected: true,
                    first_invalid_index: Some(i as u64),
                };
            }
            previous = Some(entry);
        }

        ChainVerification {
            valid: true,
            entries_verified: entries.len() as u64,
            tamper_detected: false,
            first_invalid_index: None,
        }
    }

    /// Like [`verify_detailed`](Self::verify_detailed), but a broken chain
    /// is an error.
    pub fn ensure_intact(&self) -> Result<ChainVerification> {
        let verification = self.verify_detailed();
        match verification.first_invalid_index {
            Some(index) => {
                error!(chain_index = index, "audit chain integrity violated");
                Err(Error::ChainIntegrityViolated(index))
            }
            None => Ok(verification),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Hex hash the next entry will link to.
    pub fn head_hash(&self) -> String {
        self.read()
            .last()
            .map(|e| e.entry_hash.to_hex())
            .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string())
    }

    pub fn get(&self, entry_id: &EntryId) -> Option<AuditEntry> {
        self.read()
            .iter()
            .rev()
            .find(|e| &e.entry_id == entry_id)
            .cloned()
    }

    pub fn get_by_index(&self, index: u64) -> Option<AuditEntry> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.read().get(i).cloned())
    }

    /// The last `n` entries, oldest first.
    pub fn export_tail(&self, n: usize) -> Vec<AuditEntry> {
        let entries = self.read();
        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }

    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        filter.apply(self.read().iter())
    }

    /// Copy of the whole chain.
    pub fn snapshot(&self) -> Vec<AuditEntry> {
        self.read().clone()
    }

    /// Serialize the chain for an external store.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&*self.read())?)
    }

    /// Rebuild a chain from [`to_json`](Self::to_json) output.
    ///
    /// A chain that fails verification is rejected.
    pub fn from_json(json: &str, zone: DisplayZone) -> Result<Self> {
        let entries: Vec<AuditEntry> =
            serde_json::from_str(json).map_err(|e| Error::DeserializationError(e.to_string()))?;
        let chain = Self {
            entries: RwLock::new(entries),
            zone,
        };
        let verification = chain.ensure_intact()?;
        info!(entries = verification.entries_verified, "audit chain imported");
        Ok(chain)
    }
}

impl Default for AuditChain {
    fn default() -> Self {
        Self::new(DisplayZone::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn append(chain: &AuditChain, n: usize) -> Vec<AuditEntry> {
        (0..n)
            .map(|i| {
                chain
                    .append(
                        OperationKind::Store,
                        "legal",
                        &json!({ "content": format!("evidence-{}", i) }),
                        ResultStatus::Pending,
                    )
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_empty_chain() {
        let chain = AuditChain::default();
        assert!(chain.is_empty());
        assert!(chain.verify());
        assert_eq!(chain.head_hash(), "0");
        assert!(chain.export_tail(5).is_empty());
    }

    #[test]
    fn test_append_links_entries() {
        let chain = AuditChain::default();
        let entries = append(&chain, 3);

        assert_eq!(entries[0].previous_hash, "0");
        assert_eq!(entries[0].chain_index, 0);
        for i in 1..3 {
            assert_eq!(entries[i].chain_index, i as u64);
            assert_eq!(entries[i].previous_hash, entries[i - 1].entry_hash.to_hex());
        }
        assert_eq!(chain.head_hash(), entries[2].entry_hash.to_hex());
        assert!(chain.verify());
    }

    #[test]
    fn test_data_hash_is_canonical() {
        let chain = AuditChain::default();
        let a = chain
            .append(OperationKind::Search, "ns", &json!({"q": "x", "limit": 5}), ResultStatus::Pending)
            .unwrap();
        let b = chain
            .append(OperationKind::Search, "ns", &json!({"limit": 5, "q": "x"}), ResultStatus::Pending)
            .unwrap();
        assert_eq!(a.data_hash, b.data_hash);
    }

    #[test]
    fn test_finalize_once() {
        let chain = AuditChain::default();
        let entry = append(&chain, 1).remove(0);

        let finalized = chain.finalize(&entry.entry_id, ResultStatus::Partial).unwrap();
        assert_eq!(finalized.result_status, ResultStatus::Partial);
        assert!(finalized.finalized_at.is_some());
        assert_eq!(finalized.entry_hash, entry.entry_hash);
        assert!(chain.verify());

        let err = chain.finalize(&entry.entry_id, ResultStatus::Success).unwrap_err();
        assert!(matches!(err, Error::AuditEntryFinalized(_)));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_finalize_errors() {
        let chain = AuditChain::default();
        let entry = append(&chain, 1).remove(0);

        assert!(matches!(
            chain.finalize(&EntryId::new("missing"), ResultStatus::Failed),
            Err(Error::AuditEntryNotFound(_))
        ));
        assert!(matches!(
            chain.finalize(&entry.entry_id, ResultStatus::Pending),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_tampered_field_detected() {
        let chain = AuditChain::default();
        append(&chain, 5);

        chain.write()[2].namespace = "forged".into();

        let verification = chain.verify_detailed();
        assert!(!verification.valid);
        assert!(verification.tamper_detected);
        assert_eq!(verification.first_invalid_index, Some(2));
        assert_eq!(verification.entries_verified, 2);
        assert!(!chain.verify());
        assert!(matches!(
            chain.ensure_intact(),
            Err(Error::ChainIntegrityViolated(2))
        ));
    }

    #[test]
    fn test_rehashed_tamper_breaks_next_link() {
        let chain = AuditChain::default();
        append(&chain, 3);

        {
            let mut entries = chain.write();
            entries[1].namespace = "forged".into();
            entries[1].entry_hash = entries[1].compute_hash().unwrap();
        }

        assert_eq!(chain.verify_detailed().first_invalid_index, Some(2));
    }

    #[test]
    fn test_removed_entry_detected() {
        let chain = AuditChain::default();
        append(&chain, 4);
        chain.write().remove(1);
        assert!(!chain.verify());
    }

    #[test]
    fn test_export_tail_and_lookup() {
        let chain = AuditChain::default();
        let entries = append(&chain, 5);

        let tail = chain.export_tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].chain_index, 3);
        assert_eq!(tail[1].chain_index, 4);
        assert_eq!(chain.export_tail(100).len(), 5);

        assert_eq!(chain.get(&entries[1].entry_id).unwrap().chain_index, 1);
        assert_eq!(chain.get_by_index(4).unwrap().entry_id, entries[4].entry_id);
        assert!(chain.get_by_index(5).is_none());
    }

    #[test]
    fn test_query() {
        let chain = AuditChain::default();
        let entries = append(&chain, 3);
        chain.finalize(&entries[0].entry_id, ResultStatus::Failed).unwrap();
        chain
            .append(OperationKind::Search, "other", &json!({}), ResultStatus::Pending)
            .unwrap();

        let failed = chain.query(&AuditFilter::new().by_status(ResultStatus::Failed));
        assert_eq!(failed.len(), 1);

        let searches = chain.query(&AuditFilter::new().by_operation(OperationKind::Search));
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].namespace, "other");
    }

    #[test]
    fn test_json_roundtrip() {
        let chain = AuditChain::default();
        let entries = append(&chain, 3);
        chain.finalize(&entries[1].entry_id, ResultStatus::Success).unwrap();

        let restored = AuditChain::from_json(&chain.to_json().unwrap(), DisplayZone::default()).unwrap();
        assert_eq!(restored.len(), 3);
        assert!(restored.verify());
        assert_eq!(restored.head_hash(), chain.head_hash());

        // Appends continue from the restored head
        let next = restored
            .append(OperationKind::Delete, "legal", &json!({}), ResultStatus::Pending)
            .unwrap();
        assert_eq!(next.chain_index, 3);
        assert!(restored.verify());
    }

    #[test]
    fn test_from_json_rejects_broken_chain() {
        let chain = AuditChain::default();
        append(&chain, 3);
        chain.write()[0].previous_hash = "1".into();

        let result = AuditChain::from_json(&chain.to_json().unwrap(), DisplayZone::default());
        assert!(matches!(result, Err(Error::ChainIntegrityViolated(0))));
    }

    #[test]
    fn test_concurrent_appends_stay_linked() {
        let chain = Arc::new(AuditChain::default());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let chain = chain.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        chain
                            .append(
                                OperationKind::Store,
                                "load",
                                &json!({ "thread": t, "i": i }),
                                ResultStatus::Pending,
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(chain.len(), 400);
        assert!(chain.verify());
        let entries = chain.snapshot();
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.chain_index, i as u64);
        }
    }

    #[tokio::test]
    async fn test_concurrent_finalize_single_winner() {
        let chain = Arc::new(AuditChain::default());
        let entry = append(&chain, 1).remove(0);

        let attempts: Vec<_> = (0..10)
            .map(|_| {
                let chain = chain.clone();
                let id = entry.entry_id.clone();
                tokio::spawn(async move { chain.finalize(&id, ResultStatus::Success).is_ok() })
            })
            .collect();

        let mut winners = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
