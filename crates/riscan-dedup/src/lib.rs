//! Cross-source deduplication for riscan.
//!
//! Keyword matches and semantic matches often point at the same passage.
//! [`deduplicate`] merges every group of overlapping matches into one
//! [`riscan_core::CombinedMatch`] that records which methods found it and
//! which input records it absorbed.

mod merge;
mod overlap;
mod stats;

pub use merge::{deduplicate, deduplicate_records, rededuplicate, MatchRecord};
pub use overlap::{connects, overlap};
pub use stats::ProvenanceStats;
