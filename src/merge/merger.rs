//! Deduplicating merge of per-backend search results.

use crate::adapter::MemoryRecord;
use crate::core::Hash256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Optional per-record relevance signal used to re-rank merged output.
pub trait RelevanceScorer: Send + Sync {
    /// Score `record` for `query`; `None` leaves it unranked.
    fn score(&self, query: &str, record: &MemoryRecord) -> Option<f64>;
}

/// Reads a numeric metadata key as the score.
#[derive(Clone, Debug)]
pub struct MetadataScoreScorer {
    key: String,
}

impl MetadataScoreScorer {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
        }
    }
}

impl RelevanceScorer for MetadataScoreScorer {
    fn score(&self, _query: &str, record: &MemoryRecord) -> Option<f64> {
        record
            .metadata
            .get(&self.key)
            .and_then(|v| v.as_f64())
            .filter(|s| s.is_finite())
    }
}

/// One logical record after dedup across backends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    /// First-seen copy
    pub record: MemoryRecord,
    /// Backends that returned this content, in merge order
    pub source_backends: Vec<String>,
    /// Dedup key: full-content hash
    pub content_hash: Hash256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Stateless result merger.
pub struct ResultMerger;

impl ResultMerger {
    /// Merge per-backend result lists.
    ///
    /// Backends are walked in the order given. The first copy of each
    /// content hash is kept; later copies only add their backend name,
    /// except that a full copy replaces a truncated one.
    pub fn merge(per_backend: &[(String, Vec<MemoryRecord>)]) -> Vec<MergedResult> {
        let mut merged: Vec<MergedResult> = Vec::new();
        let mut index: HashMap<Hash256, usize> = HashMap::new();

        for (backend, records) in per_backend {
            for record in records {
                let hash = record.identity_hash();
                match index.get(&hash) {
                    Some(&i) => {
                        let entry = &mut merged[i];
                        if entry.record.content_truncated && !record.content_truncated {
                            entry.record = record.clone();
                        }
                        if !entry.source_backends.iter().any(|b| b == backend) {
                            entry.source_backends.push(backend.clone());
                        }
                    }
                    None => {
                        index.insert(hash.clone(), merged.len());
                        merged.push(MergedResult {
                            record: record.clone(),
                            source_backends: vec![backend.clone()],
                            content_hash: hash,
                            score: None,
                        });
                    }
                }
            }
        }

        merged
    }

    /// Score every result and stable-sort by descending score.
    ///
    /// Unscored results follow the scored ones in merge order.
    pub fn rank(
        mut results: Vec<MergedResult>,
        query: &str,
        scorer: &dyn RelevanceScorer,
    ) -> Vec<MergedResult> {
        for result in &mut results {
            result.score = scorer.score(query, &result.record);
        }
        results.sort_by(|a, b| match (a.score, b.score) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        results
    }
}
