use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RiError;

/// A half-open character interval `[start, end)` into a document's text.
///
/// Offsets count characters (Unicode scalar values), not bytes, so spans
/// stay meaningful to consumers that re-read the text in another runtime.
///
/// # Examples
///
/// ```
/// use riscan_core::Span;
///
/// let a = Span::new(100, 110).unwrap();
/// let b = Span::new(105, 200).unwrap();
/// assert_eq!(a.len(), 10);
/// assert_eq!(a.intersection_len(&b), 5);
/// assert_eq!(a.union(&b), Span::new(100, 200).unwrap());
/// assert!(Span::new(5, 5).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    /// First character offset (inclusive).
    pub start: usize,
    /// One past the last character offset.
    pub end: usize,
}

impl Span {
    /// Create a span, rejecting empty or inverted intervals.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::InvalidParameter`] if `end <= start`.
    pub fn new(start: usize, end: usize) -> Result<Self, RiError> {
        if end <= start {
            return Err(RiError::InvalidParameter(format!(
                "span end ({end}) must be greater than start ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of characters covered.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// `true` for a degenerate span (only reachable through deserialization).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the intersection with `other` (0 when disjoint).
    pub fn intersection_len(&self, other: &Span) -> usize {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        end.saturating_sub(start)
    }

    /// Smallest span covering both `self` and `other`.
    pub fn union(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Retrieval method that discovered a match.
///
/// # Examples
///
/// ```
/// use riscan_core::Source;
///
/// let s: Source = serde_json::from_str("\"semantic\"").unwrap();
/// assert_eq!(s, Source::Semantic);
/// assert!(Source::Keyword < Source::Semantic);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Lemma-based keyword scan.
    Keyword,
    /// Embedding similarity ranking.
    Semantic,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Keyword => write!(f, "keyword"),
            Source::Semantic => write!(f, "semantic"),
        }
    }
}

/// Summary of a [`CombinedMatch`]'s provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoundBy {
    /// Only the keyword scan found this passage.
    KeywordOnly,
    /// Only semantic ranking found this passage.
    SemanticOnly,
    /// Both methods found overlapping evidence.
    Both,
}

impl FoundBy {
    /// Derive provenance from a source set. Returns `None` for an empty set.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::BTreeSet;
    /// use riscan_core::{FoundBy, Source};
    ///
    /// let sources: BTreeSet<Source> = [Source::Keyword, Source::Semantic].into();
    /// assert_eq!(FoundBy::from_sources(&sources), Some(FoundBy::Both));
    /// assert_eq!(FoundBy::from_sources(&BTreeSet::new()), None);
    /// ```
    pub fn from_sources(sources: &BTreeSet<Source>) -> Option<Self> {
        match (
            sources.contains(&Source::Keyword),
            sources.contains(&Source::Semantic),
        ) {
            (true, true) => Some(FoundBy::Both),
            (true, false) => Some(FoundBy::KeywordOnly),
            (false, true) => Some(FoundBy::SemanticOnly),
            (false, false) => None,
        }
    }
}

impl fmt::Display for FoundBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoundBy::KeywordOnly => write!(f, "keyword_only"),
            FoundBy::SemanticOnly => write!(f, "semantic_only"),
            FoundBy::Both => write!(f, "both"),
        }
    }
}

/// A loaded document: identifier plus raw text.
///
/// # Examples
///
/// ```
/// use riscan_core::Document;
///
/// let doc = Document::new("P123456", "Résilience matters.");
/// assert_eq!(doc.char_len(), 19);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Stable identifier (usually the file stem).
    pub id: String,
    /// Full document text.
    pub text: String,
}

impl Document {
    /// Create a document from an id and its text.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Length of the text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// `true` when there is nothing to scan.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A fixed-size slice of document text, the unit of semantic comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Position of this chunk in the chunk sequence.
    pub index: usize,
    /// Character offset of the first character.
    pub offset: usize,
    /// Chunk text.
    pub text: String,
}

impl Chunk {
    /// The character span `[offset, offset + len(text))`.
    ///
    /// # Examples
    ///
    /// ```
    /// use riscan_core::{Chunk, Span};
    ///
    /// let chunk = Chunk { index: 0, offset: 400, text: "dam safety".into() };
    /// assert_eq!(chunk.span(), Span { start: 400, end: 410 });
    /// ```
    pub fn span(&self) -> Span {
        Span {
            start: self.offset,
            end: self.offset + self.text.chars().count(),
        }
    }
}

/// A natural-language query for semantic ranking, labelled with a sector.
///
/// # Examples
///
/// ```
/// use riscan_core::SemanticQuery;
///
/// let q = SemanticQuery::new("flood_resilience", "infrastructure designed to withstand floods");
/// assert_eq!(q.sector, "flood_resilience");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticQuery {
    /// Sector label attached to every match of this query.
    pub sector: String,
    /// Query text sent to the embedder.
    pub query: String,
}

impl SemanticQuery {
    /// Create a query.
    pub fn new(sector: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            sector: sector.into(),
            query: query.into(),
        }
    }
}

/// A single keyword occurrence found by the lexical matcher.
///
/// The span covers the matched token(s) only; `context` carries the
/// surrounding sentences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordMatch {
    /// Identifier, unique within one document's results.
    pub id: String,
    /// Character span of the matched token(s).
    #[serde(flatten)]
    pub span: Span,
    /// Taxonomy entry that matched, as spelled in the taxonomy.
    pub keyword: String,
    /// Taxonomy sector the keyword belongs to.
    pub sector: String,
    /// The match plus surrounding sentences.
    pub context: String,
}

/// A chunk selected among the top-K for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticMatch {
    /// Identifier, unique within one document's results.
    pub id: String,
    /// Character span of the chunk.
    #[serde(flatten)]
    pub span: Span,
    /// Query text that selected this chunk.
    pub query: String,
    /// Sector label of that query.
    pub sector: String,
    /// Similarity score (higher is more similar).
    pub score: f64,
    /// Chunk text.
    pub text: String,
}

/// A deduplicated passage merged from one or more keyword/semantic matches.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeSet;
/// use riscan_core::{CombinedMatch, FoundBy, Source, Span};
///
/// let m = CombinedMatch {
///     id: "combined-0000".into(),
///     span: Span::new(10, 20).unwrap(),
///     sources: BTreeSet::from([Source::Keyword]),
///     found_by: FoundBy::KeywordOnly,
///     keywords: vec!["levee".into()],
///     sectors: vec!["water".into()],
///     queries: vec![],
///     best_score: None,
///     context: "The levee was raised.".into(),
///     members: vec!["kw-0000".into()],
/// };
/// let json = serde_json::to_value(&m).unwrap();
/// assert_eq!(json["start"], 10);
/// assert_eq!(json["foundBy"], "keyword_only");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedMatch {
    /// Identifier, unique within one document's results.
    pub id: String,
    /// Union of member spans.
    #[serde(flatten)]
    pub span: Span,
    /// Retrieval methods among the members. Never empty.
    pub sources: BTreeSet<Source>,
    /// Provenance summary derived from `sources`.
    pub found_by: FoundBy,
    /// Matched taxonomy keywords (sorted, unique).
    pub keywords: Vec<String>,
    /// Sectors from keyword and query members (sorted, unique).
    pub sectors: Vec<String>,
    /// Semantic queries that selected a member (sorted, unique).
    pub queries: Vec<String>,
    /// Highest semantic score among members.
    pub best_score: Option<f64>,
    /// Evidence text surfaced to reviewers and classifiers.
    pub context: String,
    /// Ids of every input record merged into this match.
    pub members: Vec<String>,
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use riscan_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_rejects_empty_and_inverted() {
        assert!(Span::new(3, 3).is_err());
        assert!(Span::new(4, 3).is_err());
        assert!(Span::new(0, 1).is_ok());
    }

    #[test]
    fn intersection_of_disjoint_spans_is_zero() {
        let a = Span::new(0, 10).unwrap();
        let b = Span::new(10, 20).unwrap();
        assert_eq!(a.intersection_len(&b), 0);
        assert_eq!(b.intersection_len(&a), 0);
    }

    #[test]
    fn keyword_match_serializes_flat() {
        let m = KeywordMatch {
            id: "kw-0000".into(),
            span: Span::new(4, 9).unwrap(),
            keyword: "flood".into(),
            sector: "hazards".into(),
            context: "The flood receded.".into(),
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["start"], 4);
        assert_eq!(json["end"], 9);
        assert!(json.get("span").is_none());

        let back: KeywordMatch = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn semantic_match_round_trips() {
        let m = SemanticMatch {
            id: "sem-0003".into(),
            span: Span::new(400, 900).unwrap(),
            query: "backup power".into(),
            sector: "energy_resilience".into(),
            score: 0.75,
            text: "Diesel generators provide backup power.".into(),
        };
        let json = serde_json::to_string(&m).unwrap();
        let back: SemanticMatch = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn found_by_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FoundBy::SemanticOnly).unwrap(),
            "\"semantic_only\""
        );
        assert_eq!(FoundBy::Both.to_string(), "both");
    }

    #[test]
    fn chunk_span_counts_characters() {
        let chunk = Chunk {
            index: 1,
            offset: 10,
            text: "déjà vu".into(),
        };
        assert_eq!(chunk.span(), Span { start: 10, end: 17 });
    }

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "markdown".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
