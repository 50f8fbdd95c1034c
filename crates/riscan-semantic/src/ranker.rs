//! Query-by-chunk similarity scoring and top-K selection.
//!
//! A [`ScoreMatrix`] holds one similarity per (query, chunk) pair. Both the
//! per-query detail list and the position-deduplicated list are views over
//! the same matrix, so they can never disagree about a score.

use rayon::prelude::*;
use riscan_core::{Chunk, RiError, SearchConfig, SemanticMatch, SemanticQuery};

use crate::embedding::Embedder;

/// Similarity between two embeddings; higher is more similar.
pub type Similarity = fn(&[f32], &[f32]) -> f64;

/// Cosine similarity. Returns `0.0` for empty, zero or mismatched vectors.
///
/// # Examples
///
/// ```
/// use riscan_semantic::ranker::cosine_similarity;
///
/// assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-9);
/// assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
/// assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}

/// Top-K selection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankParams {
    /// Chunks kept per query. Must be positive.
    pub top_k: usize,
    /// Pairs scoring below this are dropped.
    pub min_score: Option<f64>,
}

impl Default for RankParams {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for RankParams {
    fn from(config: &SearchConfig) -> Self {
        Self {
            top_k: config.top_k,
            min_score: config.min_score,
        }
    }
}

impl RankParams {
    fn validate(&self) -> Result<(), RiError> {
        if self.top_k == 0 {
            return Err(RiError::InvalidParameter(
                "top_k must be greater than zero".into(),
            ));
        }
        if self.min_score.is_some_and(f64::is_nan) {
            return Err(RiError::InvalidParameter("min_score must be a number".into()));
        }
        Ok(())
    }
}

/// Similarity of every query against every chunk.
///
/// Row `q`, column `c` holds `similarity(embed(query q), embed(chunk c))`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    scores: Vec<Vec<f64>>,
    chunks: usize,
}

impl ScoreMatrix {
    /// Embed queries and chunks with `embedder` and score every pair.
    ///
    /// Embedding and scoring run in parallel. The first embedder failure
    /// aborts the whole matrix.
    ///
    /// # Errors
    ///
    /// Propagates embedder failures.
    pub fn compute<E: Embedder + ?Sized>(
        chunks: &[Chunk],
        queries: &[SemanticQuery],
        embedder: &E,
        similarity: Similarity,
    ) -> Result<Self, RiError> {
        if chunks.is_empty() || queries.is_empty() {
            return Ok(Self::empty(queries.len(), chunks.len()));
        }

        let query_vectors = queries
            .par_iter()
            .map(|q| embedder.embed(&q.query))
            .collect::<Result<Vec<_>, _>>()?;
        let chunk_vectors = chunks
            .par_iter()
            .map(|c| embedder.embed(&c.text))
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_embeddings(&query_vectors, &chunk_vectors, similarity)
    }

    /// Score precomputed embeddings.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::ExternalDependency`] if vectors disagree on
    /// dimension or a pair scores NaN, both of which mean the embedder or the
    /// similarity function returned malformed output.
    ///
    /// # Examples
    ///
    /// ```
    /// use riscan_semantic::ranker::{cosine_similarity, ScoreMatrix};
    ///
    /// let queries = vec![vec![1.0, 0.0]];
    /// let chunks = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
    /// let matrix = ScoreMatrix::from_embeddings(&queries, &chunks, cosine_similarity).unwrap();
    /// assert_eq!(matrix.score(0, 0), Some(1.0));
    /// assert_eq!(matrix.score(0, 1), Some(0.0));
    /// ```
    pub fn from_embeddings(
        query_vectors: &[Vec<f32>],
        chunk_vectors: &[Vec<f32>],
        similarity: Similarity,
    ) -> Result<Self, RiError> {
        if let Some(first) = query_vectors.first().or(chunk_vectors.first()) {
            let dims = first.len();
            if let Some(bad) = query_vectors
                .iter()
                .chain(chunk_vectors)
                .find(|v| v.len() != dims)
            {
                return Err(RiError::external(
                    "embedder",
                    format!("inconsistent embedding dimensions: {} and {}", dims, bad.len()),
                ));
            }
        }

        let scores: Vec<Vec<f64>> = query_vectors
            .par_iter()
            .map(|q| chunk_vectors.iter().map(|c| similarity(q, c)).collect())
            .collect();

        let nan = scores
            .iter()
            .enumerate()
            .find_map(|(q, row)| row.iter().position(|s| s.is_nan()).map(|c| (q, c)));
        if let Some((q, c)) = nan {
            return Err(RiError::external(
                "similarity",
                format!("score of query {q} against chunk {c} is NaN"),
            ));
        }

        tracing::debug!(
            queries = query_vectors.len(),
            chunks = chunk_vectors.len(),
            "computed score matrix"
        );
        Ok(Self {
            scores,
            chunks: chunk_vectors.len(),
        })
    }

    fn empty(queries: usize, chunks: usize) -> Self {
        Self {
            scores: vec![Vec::new(); queries],
            chunks,
        }
    }

    /// Number of query rows.
    pub fn queries(&self) -> usize {
        self.scores.len()
    }

    /// Number of chunk columns.
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Score of `query` against `chunk`.
    pub fn score(&self, query: usize, chunk: usize) -> Option<f64> {
        self.scores.get(query)?.get(chunk).copied()
    }

    /// The top `k` chunk indices for `query`, best first.
    ///
    /// Equal scores keep chunk order, so the earliest offset wins ties.
    pub fn top_k(&self, query: usize, k: usize, min_score: Option<f64>) -> Vec<(usize, f64)> {
        let Some(row) = self.scores.get(query) else {
            return Vec::new();
        };
        let mut ranked: Vec<(usize, f64)> = row
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, s)| min_score.map_or(true, |min| *s >= min))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);
        ranked
    }

    /// Per-query detail: the top-K chunks of every query, in query order
    /// then rank order. Ids are `sem-0000`, `sem-0001`, ... in that order.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::InvalidParameter`] if `top_k == 0`.
    pub fn per_query(
        &self,
        chunks: &[Chunk],
        queries: &[SemanticQuery],
        params: RankParams,
    ) -> Result<Vec<SemanticMatch>, RiError> {
        params.validate()?;
        let mut matches = Vec::new();
        for (q, query) in queries.iter().enumerate() {
            for (c, score) in self.top_k(q, params.top_k, params.min_score) {
                if let Some(chunk) = chunks.get(c) {
                    matches.push(semantic_match(matches.len(), chunk, query, score));
                }
            }
        }
        Ok(matches)
    }

    /// Position-deduplicated view: of the per-query top-K pairs, keep the
    /// highest-scoring one per chunk (ties go to the earliest query).
    /// Output is ordered by chunk offset with ids `sem-0000`, ...
    ///
    /// # Errors
    ///
    /// Returns [`RiError::InvalidParameter`] if `top_k == 0`.
    pub fn by_position(
        &self,
        chunks: &[Chunk],
        queries: &[SemanticQuery],
        params: RankParams,
    ) -> Result<Vec<SemanticMatch>, RiError> {
        params.validate()?;
        // best[c] = (query, score)
        let mut best: Vec<Option<(usize, f64)>> = vec![None; chunks.len()];
        for q in 0..queries.len() {
            for (c, score) in self.top_k(q, params.top_k, params.min_score) {
                let Some(slot) = best.get_mut(c) else {
                    continue;
                };
                match slot {
                    Some((_, current)) if score <= *current => {}
                    _ => *slot = Some((q, score)),
                }
            }
        }

        let mut matches = Vec::new();
        for (c, entry) in best.into_iter().enumerate() {
            if let Some((q, score)) = entry {
                matches.push(semantic_match(matches.len(), &chunks[c], &queries[q], score));
            }
        }
        Ok(matches)
    }
}

fn semantic_match(i: usize, chunk: &Chunk, query: &SemanticQuery, score: f64) -> SemanticMatch {
    SemanticMatch {
        id: format!("sem-{i:04}"),
        span: chunk.span(),
        query: query.query.clone(),
        sector: query.sector.clone(),
        score,
        text: chunk.text.clone(),
    }
}

/// Both views of one ranking run.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticRanking {
    /// Top-K per query, query order then rank order.
    pub per_query: Vec<SemanticMatch>,
    /// One best pair per chunk, in offset order. This is the deduplicator's input.
    pub deduplicated: Vec<SemanticMatch>,
}

/// Rank `chunks` against `queries`, scoring pairs with `similarity`
/// (usually [`cosine_similarity`]).
///
/// # Errors
///
/// Returns [`RiError::InvalidParameter`] if `top_k == 0`, or propagates
/// embedder failures and NaN scores.
///
/// # Examples
///
/// ```
/// use riscan_core::SemanticQuery;
/// use riscan_semantic::chunker::chunk_text;
/// use riscan_semantic::embedding::HashingEmbedder;
/// use riscan_semantic::ranker::{cosine_similarity, rank_semantic, RankParams};
///
/// let text = "Quarterly budget tables. Substations were raised above flood level.";
/// let chunks = chunk_text(text, 30, 5).unwrap();
/// let queries = vec![SemanticQuery::new("energy", "substations raised above flood level")];
/// let embedder = HashingEmbedder::new(256).unwrap();
///
/// let params = RankParams { top_k: 1, min_score: None };
/// let ranking =
///     rank_semantic(&chunks, &queries, &embedder, cosine_similarity, params).unwrap();
/// assert_eq!(ranking.per_query.len(), 1);
/// assert!(ranking.per_query[0].text.contains("raised"));
/// ```
pub fn rank_semantic<E: Embedder + ?Sized>(
    chunks: &[Chunk],
    queries: &[SemanticQuery],
    embedder: &E,
    similarity: Similarity,
    params: RankParams,
) -> Result<SemanticRanking, RiError> {
    params.validate()?;
    let matrix = ScoreMatrix::compute(chunks, queries, embedder, similarity)?;
    let ranking = SemanticRanking {
        per_query: matrix.per_query(chunks, queries, params)?,
        deduplicated: matrix.by_position(chunks, queries, params)?,
    };
    tracing::debug!(
        per_query = ranking.per_query.len(),
        deduplicated = ranking.deduplicated.len(),
        "semantic ranking complete"
    );
    Ok(ranking)
}
