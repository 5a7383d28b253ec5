//! Result Merger
//!
//! Dedups heterogeneous result sets by content hash and optionally
//! re-ranks them with a relevance signal.

pub mod merger;

pub use merger::{MergedResult, MetadataScoreScorer, RelevanceScorer, ResultMerger};
