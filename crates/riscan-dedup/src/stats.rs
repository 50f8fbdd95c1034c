//! Provenance statistics over a deduplicated collection.

use riscan_core::{CombinedMatch, FoundBy};
use serde::{Deserialize, Serialize};

/// How the combined matches of one document (or a whole corpus) were found.
///
/// # Examples
///
/// ```
/// use riscan_dedup::{deduplicate, ProvenanceStats};
///
/// let combined = deduplicate(&[], &[], 0.5).unwrap();
/// let stats = ProvenanceStats::from_matches(0, &combined);
/// assert_eq!(stats.total, 0);
/// assert_eq!(stats.overlap_rate, 0.0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceStats {
    /// Keyword plus semantic records fed to the deduplicator.
    pub inputs: usize,
    /// Combined matches produced.
    pub total: usize,
    /// Combined matches found only by keyword search.
    pub keyword_only: usize,
    /// Combined matches found only by semantic search.
    pub semantic_only: usize,
    /// Combined matches found by both methods.
    pub both: usize,
    /// `inputs - total`.
    pub duplicates_removed: usize,
    /// Share of combined matches found by both methods, in `[0, 1]`.
    pub overlap_rate: f64,
}

impl ProvenanceStats {
    /// Tally `combined`, produced from `inputs` records.
    pub fn from_matches(inputs: usize, combined: &[CombinedMatch]) -> Self {
        let mut stats = Self {
            inputs,
            total: combined.len(),
            ..Self::default()
        };
        for m in combined {
            match m.found_by {
                FoundBy::KeywordOnly => stats.keyword_only += 1,
                FoundBy::SemanticOnly => stats.semantic_only += 1,
                FoundBy::Both => stats.both += 1,
            }
        }
        stats.refresh();
        stats
    }

    /// Add another document's counts into this one.
    pub fn accumulate(&mut self, other: &ProvenanceStats) {
        self.inputs += other.inputs;
        self.total += other.total;
        self.keyword_only += other.keyword_only;
        self.semantic_only += other.semantic_only;
        self.both += other.both;
        self.refresh();
    }

    /// Share of combined matches that keyword search found.
    pub fn keyword_recall(&self) -> f64 {
        ratio(self.keyword_only + self.both, self.total)
    }

    /// Share of combined matches that semantic search found.
    pub fn semantic_recall(&self) -> f64 {
        ratio(self.semantic_only + self.both, self.total)
    }

    fn refresh(&mut self) {
        self.duplicates_removed = self.inputs.saturating_sub(self.total);
        self.overlap_rate = ratio(self.both, self.total);
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
