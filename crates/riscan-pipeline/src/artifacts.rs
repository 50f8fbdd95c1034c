//! Per-stage JSON result files.
//!
//! Each stage writes one JSON array with a record per document, so stages
//! can run separately: `keywords` and `semantic` produce their files, and
//! `dedup` pairs them back up by document id.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use riscan_core::{CombinedMatch, KeywordMatch, RiError, SemanticMatch};
use riscan_dedup::ProvenanceStats;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Lexical matcher output for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordResults {
    /// Document id.
    pub document_id: String,
    /// Hex SHA-256 of the document text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Number of matches.
    pub total_matches: usize,
    /// Matches per taxonomy keyword.
    pub keyword_counts: BTreeMap<String, usize>,
    /// Matches per taxonomy sector.
    pub sector_counts: BTreeMap<String, usize>,
    /// All matches, ordered by span.
    pub matches: Vec<KeywordMatch>,
}

/// Semantic ranker output for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticResults {
    /// Document id.
    pub document_id: String,
    /// Hex SHA-256 of the document text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Number of chunks the document was split into.
    pub total_chunks: usize,
    /// Top-K chunks per query.
    pub per_query: Vec<SemanticMatch>,
    /// Best query per chunk position; the deduplicator's input.
    pub matches: Vec<SemanticMatch>,
    /// Position-deduplicated matches per query sector.
    pub sector_counts: BTreeMap<String, usize>,
}

/// Deduplicated output for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedResults {
    /// Document id.
    pub document_id: String,
    /// Provenance counts.
    pub stats: ProvenanceStats,
    /// Combined matches, ordered by span.
    pub matches: Vec<CombinedMatch>,
}

/// Count occurrences of each key.
pub(crate) fn tally<'a>(keys: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for key in keys {
        *counts.entry(key.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Write `value` as pretty JSON, creating parent directories.
///
/// # Errors
///
/// Returns [`RiError::Io`] or [`RiError::Serialization`] on failure.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), RiError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    tracing::debug!(path = %path.display(), "wrote results");
    Ok(())
}

/// Read a JSON file written by [`write_json`].
///
/// # Errors
///
/// Returns [`RiError::FileNotFound`] if the file is missing, or
/// [`RiError::Serialization`] if it does not parse as `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, RiError> {
    if !path.exists() {
        return Err(RiError::FileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Pair keyword and semantic results by document id, keeping the keyword
/// file's order. Documents present in only one file are skipped with a
/// warning.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use riscan_pipeline::artifacts::{pair_by_document, KeywordResults, SemanticResults};
///
/// let kw = |id: &str| KeywordResults {
///     document_id: id.into(),
///     content_hash: None,
///     total_matches: 0,
///     keyword_counts: BTreeMap::new(),
///     sector_counts: BTreeMap::new(),
///     matches: vec![],
/// };
/// let sem = |id: &str| SemanticResults {
///     document_id: id.into(),
///     content_hash: None,
///     total_chunks: 0,
///     per_query: vec![],
///     matches: vec![],
///     sector_counts: BTreeMap::new(),
/// };
///
/// let pairs = pair_by_document(vec![kw("a"), kw("b")], vec![sem("b"), sem("c")]);
/// assert_eq!(pairs.len(), 1);
/// assert_eq!(pairs[0].0.document_id, "b");
/// ```
pub fn pair_by_document(
    keyword: Vec<KeywordResults>,
    semantic: Vec<SemanticResults>,
) -> Vec<(KeywordResults, SemanticResults)> {
    let mut by_id: HashMap<String, SemanticResults> = semantic
        .into_iter()
        .map(|s| (s.document_id.clone(), s))
        .collect();

    let mut pairs = Vec::new();
    for kw in keyword {
        match by_id.remove(&kw.document_id) {
            Some(sem) => {
                if let (Some(a), Some(b)) = (&kw.content_hash, &sem.content_hash) {
                    if a != b {
                        tracing::warn!(
                            document = %kw.document_id,
                            "keyword and semantic results were computed from different text"
                        );
                    }
                }
                pairs.push((kw, sem));
            }
            None => {
                tracing::warn!(document = %kw.document_id, "no semantic results for document, skipping");
            }
        }
    }
    let mut leftover: Vec<&String> = by_id.keys().collect();
    leftover.sort();
    for id in leftover {
        tracing::warn!(document = %id, "no keyword results for document, skipping");
    }
    pairs
}
