//! Cross-source merging of keyword and semantic matches.
//!
//! Every input becomes a node. Nodes whose spans connect (see
//! [`crate::connects`]) are unioned; each component collapses into one
//! group whose span is the union of its members. Union spans can grow into
//! new neighbours, so the grouping repeats over the groups until nothing
//! connects any more. The result has no connected pair left, which makes
//! deduplicating it again a no-op.

use std::collections::BTreeSet;

use petgraph::unionfind::UnionFind;
use riscan_core::{
    CombinedMatch, FoundBy, KeywordMatch, RiError, SemanticMatch, Source, Span,
};

use crate::overlap::{connects, validate_threshold};

/// Any record the deduplicator accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchRecord {
    /// Lexical matcher output.
    Keyword(KeywordMatch),
    /// Semantic ranker output (position-deduplicated).
    Semantic(SemanticMatch),
    /// Output of an earlier deduplication.
    Combined(CombinedMatch),
}

impl MatchRecord {
    /// Character span of the record.
    pub fn span(&self) -> Span {
        match self {
            MatchRecord::Keyword(m) => m.span,
            MatchRecord::Semantic(m) => m.span,
            MatchRecord::Combined(m) => m.span,
        }
    }

    /// Record id.
    pub fn id(&self) -> &str {
        match self {
            MatchRecord::Keyword(m) => &m.id,
            MatchRecord::Semantic(m) => &m.id,
            MatchRecord::Combined(m) => &m.id,
        }
    }
}

impl From<KeywordMatch> for MatchRecord {
    fn from(m: KeywordMatch) -> Self {
        MatchRecord::Keyword(m)
    }
}

impl From<SemanticMatch> for MatchRecord {
    fn from(m: SemanticMatch) -> Self {
        MatchRecord::Semantic(m)
    }
}

impl From<CombinedMatch> for MatchRecord {
    fn from(m: CombinedMatch) -> Self {
        MatchRecord::Combined(m)
    }
}

// Ordering key for the context shown on a merged group: keyword evidence
// first, then earliest start, earliest end, lexical text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ContextKey {
    semantic_only: bool,
    start: usize,
    end: usize,
    text: String,
}

#[derive(Debug, Clone)]
struct Group {
    span: Span,
    sources: BTreeSet<Source>,
    keywords: BTreeSet<String>,
    sectors: BTreeSet<String>,
    queries: BTreeSet<String>,
    best_score: Option<f64>,
    context: ContextKey,
    members: BTreeSet<String>,
}

impl Group {
    fn from_record(record: MatchRecord) -> Result<Self, RiError> {
        let group = match record {
            MatchRecord::Keyword(m) => Group {
                span: m.span,
                sources: BTreeSet::from([Source::Keyword]),
                keywords: BTreeSet::from([m.keyword]),
                sectors: BTreeSet::from([m.sector]),
                queries: BTreeSet::new(),
                best_score: None,
                context: ContextKey {
                    semantic_only: false,
                    start: m.span.start,
                    end: m.span.end,
                    text: m.context,
                },
                members: BTreeSet::from([m.id]),
            },
            MatchRecord::Semantic(m) => Group {
                span: m.span,
                sources: BTreeSet::from([Source::Semantic]),
                keywords: BTreeSet::new(),
                sectors: BTreeSet::from([m.sector]),
                queries: BTreeSet::from([m.query]),
                best_score: Some(m.score),
                context: ContextKey {
                    semantic_only: true,
                    start: m.span.start,
                    end: m.span.end,
                    text: m.text,
                },
                members: BTreeSet::from([m.id]),
            },
            MatchRecord::Combined(m) => {
                if m.sources.is_empty() {
                    return Err(RiError::InvalidParameter(format!(
                        "combined match {} has no sources",
                        m.id
                    )));
                }
                let members = if m.members.is_empty() {
                    BTreeSet::from([m.id])
                } else {
                    m.members.into_iter().collect()
                };
                Group {
                    span: m.span,
                    context: ContextKey {
                        semantic_only: !m.sources.contains(&Source::Keyword),
                        start: m.span.start,
                        end: m.span.end,
                        text: m.context,
                    },
                    sources: m.sources,
                    keywords: m.keywords.into_iter().collect(),
                    sectors: m.sectors.into_iter().collect(),
                    queries: m.queries.into_iter().collect(),
                    best_score: m.best_score,
                    members,
                }
            }
        };
        Ok(group)
    }

    fn absorb(&mut self, other: Group) {
        self.span = self.span.union(&other.span);
        self.sources.extend(other.sources);
        self.keywords.extend(other.keywords);
        self.sectors.extend(other.sectors);
        self.queries.extend(other.queries);
        self.best_score = match (self.best_score, other.best_score) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        if other.context < self.context {
            self.context = other.context;
        }
        self.members.extend(other.members);
    }

    fn into_combined(self, i: usize) -> Result<CombinedMatch, RiError> {
        let found_by = FoundBy::from_sources(&self.sources).ok_or_else(|| {
            RiError::InvalidParameter("merged match has no sources".into())
        })?;
        Ok(CombinedMatch {
            id: format!("combined-{i:04}"),
            span: self.span,
            found_by,
            sources: self.sources,
            keywords: self.keywords.into_iter().collect(),
            sectors: self.sectors.into_iter().collect(),
            queries: self.queries.into_iter().collect(),
            best_score: self.best_score,
            context: self.context.text,
            members: self.members.into_iter().collect(),
        })
    }

    fn sort_key(&self) -> (Span, &str) {
        (self.span, &self.context.text)
    }
}

/// Merge keyword and semantic matches into deduplicated combined matches.
///
/// Two matches are duplicates when their spans share at least one
/// character and `overlap >= threshold`. The output is ordered by span and
/// no two outputs are duplicates of each other.
///
/// # Errors
///
/// Returns [`RiError::InvalidParameter`] if `threshold` is outside `[0, 1]`.
///
/// # Examples
///
/// ```
/// use riscan_core::{FoundBy, KeywordMatch, SemanticMatch, Span};
/// use riscan_dedup::deduplicate;
///
/// let kw = KeywordMatch {
///     id: "kw-0000".into(),
///     span: Span { start: 120, end: 128 },
///     keyword: "flood".into(),
///     sector: "hazards".into(),
///     context: "Flooding damaged the roads.".into(),
/// };
/// let sem = SemanticMatch {
///     id: "sem-0000".into(),
///     span: Span { start: 100, end: 600 },
///     query: "flood protection".into(),
///     sector: "flood_resilience".into(),
///     score: 0.81,
///     text: "...".into(),
/// };
///
/// let combined = deduplicate(&[kw], &[sem], 0.5).unwrap();
/// assert_eq!(combined.len(), 1);
/// assert_eq!(combined[0].found_by, FoundBy::Both);
/// assert_eq!(combined[0].span, Span { start: 100, end: 600 });
/// assert_eq!(combined[0].context, "Flooding damaged the roads.");
/// assert_eq!(combined[0].members, ["kw-0000", "sem-0000"]);
/// ```
pub fn deduplicate(
    keyword: &[KeywordMatch],
    semantic: &[SemanticMatch],
    threshold: f64,
) -> Result<Vec<CombinedMatch>, RiError> {
    let records = keyword
        .iter()
        .cloned()
        .map(MatchRecord::from)
        .chain(semantic.iter().cloned().map(MatchRecord::from));
    deduplicate_records(records, threshold)
}

/// Deduplicate an earlier result again, e.g. after concatenating result files.
///
/// Applied to a single deduplication output this returns it unchanged.
///
/// # Errors
///
/// Returns [`RiError::InvalidParameter`] if `threshold` is outside `[0, 1]`
/// or an input has no sources.
pub fn rededuplicate(
    combined: &[CombinedMatch],
    threshold: f64,
) -> Result<Vec<CombinedMatch>, RiError> {
    deduplicate_records(combined.iter().cloned().map(MatchRecord::from), threshold)
}

/// Deduplicate any mix of records.
///
/// # Errors
///
/// Returns [`RiError::InvalidParameter`] if `threshold` is outside `[0, 1]`
/// or a combined input has no sources.
pub fn deduplicate_records(
    records: impl IntoIterator<Item = MatchRecord>,
    threshold: f64,
) -> Result<Vec<CombinedMatch>, RiError> {
    validate_threshold(threshold)?;

    let mut groups = records
        .into_iter()
        .map(Group::from_record)
        .collect::<Result<Vec<_>, _>>()?;
    let inputs = groups.len();

    let mut rounds = 0;
    loop {
        rounds += 1;
        let before = groups.len();
        groups = merge_round(groups, threshold);
        if groups.len() == before {
            break;
        }
    }

    groups.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    let combined = groups
        .into_iter()
        .enumerate()
        .map(|(i, g)| g.into_combined(i))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        inputs,
        outputs = combined.len(),
        rounds,
        threshold,
        "deduplication complete"
    );
    Ok(combined)
}

/// One union-find pass: connect overlapping groups, collapse components.
fn merge_round(mut groups: Vec<Group>, threshold: f64) -> Vec<Group> {
    groups.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let mut uf = UnionFind::new(groups.len());
    for i in 0..groups.len() {
        for j in (i + 1)..groups.len() {
            // Sorted by start: nothing further right can intersect `i`.
            if groups[j].span.start >= groups[i].span.end {
                break;
            }
            if connects(&groups[i].span, &groups[j].span, threshold) {
                uf.union(i, j);
            }
        }
    }

    let mut merged: Vec<Option<Group>> = vec![None; groups.len()];
    for (i, group) in groups.into_iter().enumerate() {
        let root = uf.find(i);
        match &mut merged[root] {
            Some(existing) => existing.absorb(group),
            slot => *slot = Some(group),
        }
    }
    merged.into_iter().flatten().collect()
}
