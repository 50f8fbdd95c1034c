//! Keyword, semantic and dedup stages for one document at a time.

use riscan_core::{Chunk, Document, RiConfig, RiError};
use riscan_dedup::{deduplicate, rededuplicate, ProvenanceStats};
use riscan_lexical::{
    keyword_counts, CompiledTaxonomy, Lemmatizer, MatchParams, SnowballLemmatizer,
};
use riscan_semantic::cache::{embed_with_cache, EmbeddingCache};
use riscan_semantic::{
    chunk_text, cosine_similarity, Embedder, EmbeddingClient, HashingEmbedder, RankParams,
    ScoreMatrix,
};
use serde::{Deserialize, Serialize};

use crate::artifacts::{tally, CombinedResults, KeywordResults, SemanticResults};
use crate::corpus::content_hash;

/// All three stage results for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReport {
    /// Lexical matcher output.
    pub keywords: KeywordResults,
    /// Semantic ranker output.
    pub semantic: SemanticResults,
    /// Deduplicated output.
    pub combined: CombinedResults,
}

/// Runs the stages with one configuration, lemmatizer and embedder.
///
/// The configuration is validated once at construction; stages never see
/// bad parameters.
///
/// # Examples
///
/// ```
/// use riscan_core::{Document, RiConfig};
/// use riscan_pipeline::Pipeline;
///
/// let pipeline = Pipeline::new(RiConfig::builtin().unwrap()).unwrap();
/// let doc = Document::new("pad-001", "Backup generators protect the substation from outages.");
/// let report = pipeline.run(&doc).unwrap();
///
/// assert!(report.keywords.total_matches >= 2);
/// assert!(!report.combined.matches.is_empty());
/// ```
pub struct Pipeline {
    config: RiConfig,
    taxonomy: CompiledTaxonomy,
    lemmatizer: Box<dyn Lemmatizer>,
    embedder: Box<dyn Embedder>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("search", &self.config.search)
            .field("sectors", &self.config.taxonomy.len())
            .field("keywords", &self.taxonomy.len())
            .field("queries", &self.config.queries.len())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Build a pipeline with the Snowball lemmatizer and the offline hashing
    /// embedder sized from `config.embedding.dimensions`.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::InvalidParameter`] if the configuration is invalid.
    pub fn new(config: RiConfig) -> Result<Self, RiError> {
        config.validate()?;
        let embedder = HashingEmbedder::new(config.embedding.dimensions)?;
        let lemmatizer = SnowballLemmatizer::new();
        let taxonomy = CompiledTaxonomy::new(&config.taxonomy, &lemmatizer)?;
        Ok(Self {
            config,
            taxonomy,
            lemmatizer: Box::new(lemmatizer),
            embedder: Box::new(embedder),
        })
    }

    /// Replace the lemmatizer, recompiling the taxonomy with it.
    ///
    /// # Errors
    ///
    /// Propagates lemmatizer failures on taxonomy keywords.
    pub fn with_lemmatizer(
        mut self,
        lemmatizer: impl Lemmatizer + 'static,
    ) -> Result<Self, RiError> {
        self.taxonomy = CompiledTaxonomy::new(&self.config.taxonomy, &lemmatizer)?;
        self.lemmatizer = Box::new(lemmatizer);
        Ok(self)
    }

    /// Replace the embedder used by [`Pipeline::semantic`] and [`Pipeline::run`].
    pub fn with_embedder(mut self, embedder: impl Embedder + 'static) -> Self {
        self.embedder = Box::new(embedder);
        self
    }

    /// The validated configuration.
    pub fn config(&self) -> &RiConfig {
        &self.config
    }

    /// Keyword stage.
    ///
    /// # Errors
    ///
    /// Propagates lemmatizer failures.
    pub fn keywords(&self, doc: &Document) -> Result<KeywordResults, RiError> {
        let params = MatchParams::from(&self.config.search);
        let matches = self.taxonomy.find(&doc.text, &*self.lemmatizer, params)?;
        Ok(KeywordResults {
            document_id: doc.id.clone(),
            content_hash: Some(content_hash(&doc.text)),
            total_matches: matches.len(),
            keyword_counts: keyword_counts(&matches),
            sector_counts: tally(matches.iter().map(|m| m.sector.as_str())),
            matches,
        })
    }

    /// Semantic stage with the pipeline's synchronous embedder.
    ///
    /// # Errors
    ///
    /// Propagates embedder failures.
    pub fn semantic(&self, doc: &Document) -> Result<SemanticResults, RiError> {
        let search = &self.config.search;
        let chunks = chunk_text(&doc.text, search.chunk_size, search.chunk_overlap)?;
        let matrix = ScoreMatrix::compute(
            &chunks,
            &self.config.queries,
            &*self.embedder,
            cosine_similarity,
        )?;
        self.semantic_results(doc, chunks.len(), &matrix, &chunks)
    }

    /// Semantic stage with a remote embedding API, optionally cached.
    ///
    /// # Errors
    ///
    /// Propagates API and cache failures.
    pub async fn semantic_remote(
        &self,
        doc: &Document,
        client: &EmbeddingClient,
        cache: Option<&EmbeddingCache>,
    ) -> Result<SemanticResults, RiError> {
        let search = &self.config.search;
        let chunks = chunk_text(&doc.text, search.chunk_size, search.chunk_overlap)?;
        if chunks.is_empty() || self.config.queries.is_empty() {
            let matrix = ScoreMatrix::from_embeddings(&[], &[], cosine_similarity)?;
            return self.semantic_results(doc, chunks.len(), &matrix, &chunks);
        }

        let mut query_vectors = Vec::with_capacity(self.config.queries.len());
        for query in &self.config.queries {
            query_vectors.push(client.embed_query(&query.query).await?);
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let chunk_vectors = embed_with_cache(client, cache, &texts).await?;

        let matrix = ScoreMatrix::from_embeddings(&query_vectors, &chunk_vectors, cosine_similarity)?;
        self.semantic_results(doc, chunks.len(), &matrix, &chunks)
    }

    fn semantic_results(
        &self,
        doc: &Document,
        total_chunks: usize,
        matrix: &ScoreMatrix,
        chunks: &[Chunk],
    ) -> Result<SemanticResults, RiError> {
        let params = RankParams::from(&self.config.search);
        let per_query = matrix.per_query(chunks, &self.config.queries, params)?;
        let matches = matrix.by_position(chunks, &self.config.queries, params)?;
        Ok(SemanticResults {
            document_id: doc.id.clone(),
            content_hash: Some(content_hash(&doc.text)),
            total_chunks,
            sector_counts: tally(matches.iter().map(|m| m.sector.as_str())),
            per_query,
            matches,
        })
    }

    /// Dedup stage over previously computed keyword and semantic results.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::InvalidParameter`] if the threshold is invalid.
    pub fn combine(
        &self,
        keywords: &KeywordResults,
        semantic: &SemanticResults,
    ) -> Result<CombinedResults, RiError> {
        let threshold = self.config.search.overlap_threshold;
        let matches = deduplicate(&keywords.matches, &semantic.matches, threshold)?;
        let inputs = keywords.matches.len() + semantic.matches.len();
        Ok(CombinedResults {
            document_id: keywords.document_id.clone(),
            stats: ProvenanceStats::from_matches(inputs, &matches),
            matches,
        })
    }

    /// Deduplicate an existing combined result again, e.g. after a threshold
    /// change or after concatenating result files.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::InvalidParameter`] on an invalid threshold or a
    /// combined record without sources.
    pub fn recombine(&self, combined: &CombinedResults) -> Result<CombinedResults, RiError> {
        let matches = rededuplicate(&combined.matches, self.config.search.overlap_threshold)?;
        Ok(CombinedResults {
            document_id: combined.document_id.clone(),
            stats: ProvenanceStats::from_matches(combined.stats.inputs, &matches),
            matches,
        })
    }

    /// All three stages with the synchronous embedder.
    ///
    /// # Errors
    ///
    /// The first failing stage aborts the document.
    pub fn run(&self, doc: &Document) -> Result<DocumentReport, RiError> {
        let keywords = self.keywords(doc)?;
        let semantic = self.semantic(doc)?;
        let combined = self.combine(&keywords, &semantic)?;
        Ok(report(keywords, semantic, combined))
    }

    /// All three stages with a remote embedding API.
    ///
    /// # Errors
    ///
    /// The first failing stage aborts the document.
    pub async fn run_remote(
        &self,
        doc: &Document,
        client: &EmbeddingClient,
        cache: Option<&EmbeddingCache>,
    ) -> Result<DocumentReport, RiError> {
        let keywords = self.keywords(doc)?;
        let semantic = self.semantic_remote(doc, client, cache).await?;
        let combined = self.combine(&keywords, &semantic)?;
        Ok(report(keywords, semantic, combined))
    }
}

fn report(
    keywords: KeywordResults,
    semantic: SemanticResults,
    combined: CombinedResults,
) -> DocumentReport {
    let stats = &combined.stats;
    tracing::info!(
        document = %keywords.document_id,
        keyword_matches = keywords.total_matches,
        semantic_matches = semantic.matches.len(),
        combined = stats.total,
        both = stats.both,
        duplicates_removed = stats.duplicates_removed,
        "document processed"
    );
    DocumentReport {
        keywords,
        semantic,
        combined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riscan_core::{SearchConfig, SemanticQuery, Taxonomy};

    fn config() -> RiConfig {
        let mut taxonomy = Taxonomy::new();
        taxonomy.insert("hazards".into(), vec!["flood".into()]);
        taxonomy.insert("water".into(), vec!["levee".into()]);
        RiConfig {
            search: SearchConfig {
                chunk_size: 40,
                chunk_overlap: 10,
                top_k: 2,
                ..SearchConfig::default()
            },
            taxonomy,
            queries: vec![SemanticQuery::new("flood_resilience", "levee flood protection")],
            ..RiConfig::default()
        }
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut bad = config();
        bad.search.chunk_overlap = 40;
        let err = Pipeline::new(bad).unwrap_err();
        assert_eq!(err.kind(), riscan_core::ErrorKind::InvalidParameter);
    }

    #[test]
    fn empty_document_produces_empty_results() {
        let pipeline = Pipeline::new(config()).unwrap();
        let report = pipeline.run(&Document::new("empty", "")).unwrap();
        assert_eq!(report.keywords.total_matches, 0);
        assert_eq!(report.semantic.total_chunks, 0);
        assert!(report.combined.matches.is_empty());
        assert_eq!(report.combined.stats.total, 0);
    }

    #[test]
    fn report_counts_are_consistent() {
        let pipeline = Pipeline::new(config()).unwrap();
        let text = "The levee failed during the flood. Budget tables follow. \
                    Floods returned and the levees were raised.";
        let report = pipeline.run(&Document::new("pad", text)).unwrap();

        assert_eq!(report.keywords.keyword_counts["flood"], 2);
        assert_eq!(report.keywords.keyword_counts["levee"], 2);
        assert_eq!(report.keywords.sector_counts["hazards"], 2);
        assert_eq!(
            report.combined.stats.inputs,
            report.keywords.matches.len() + report.semantic.matches.len()
        );
        let members: usize = report.combined.matches.iter().map(|m| m.members.len()).sum();
        assert_eq!(members, report.combined.stats.inputs);
        assert_eq!(
            report.keywords.content_hash,
            report.semantic.content_hash
        );
    }

    #[test]
    fn lemmatizer_failure_aborts_the_document() {
        let failing = |w: &str| -> Result<String, RiError> {
            if w == "offline" {
                Err(RiError::external("lemmatizer", "offline"))
            } else {
                Ok(w.to_string())
            }
        };
        let pipeline = Pipeline::new(config())
            .unwrap()
            .with_lemmatizer(failing)
            .unwrap();
        let err = pipeline
            .run(&Document::new("pad", "flood went offline"))
            .unwrap_err();
        assert_eq!(err.kind(), riscan_core::ErrorKind::ExternalDependency);
    }

    #[test]
    fn lemmatizer_failing_on_the_taxonomy_is_rejected_up_front() {
        let failing = |_: &str| -> Result<String, RiError> {
            Err(RiError::external("lemmatizer", "offline"))
        };
        let err = Pipeline::new(config())
            .unwrap()
            .with_lemmatizer(failing)
            .unwrap_err();
        assert_eq!(err.kind(), riscan_core::ErrorKind::ExternalDependency);
    }

    #[test]
    fn taxonomy_is_compiled_once_for_all_documents() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = std::sync::Arc::clone(&calls);
        let counting = move |w: &str| -> Result<String, RiError> {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(w.to_string())
        };
        let pipeline = Pipeline::new(config())
            .unwrap()
            .with_lemmatizer(counting)
            .unwrap();
        // One call per taxonomy keyword.
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);

        for id in ["a", "b", "c"] {
            pipeline.keywords(&Document::new(id, "levee")).unwrap();
        }
        // Each document adds only its single token.
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 5);
    }

    #[test]
    fn custom_embedder_is_used() {
        let constant = |_: &str| -> Result<Vec<f32>, RiError> { Ok(vec![1.0, 0.0]) };
        let pipeline = Pipeline::new(config()).unwrap().with_embedder(constant);
        let text = "a".repeat(100);
        let semantic = pipeline.semantic(&Document::new("pad", text)).unwrap();
        // All scores tie at 1.0: the first two chunks win.
        assert_eq!(semantic.total_chunks, 3);
        let starts: Vec<usize> = semantic.per_query.iter().map(|m| m.span.start).collect();
        assert_eq!(starts, [0, 30]);
        assert!(semantic.per_query.iter().all(|m| m.score == 1.0));
    }

    #[test]
    fn recombine_is_stable() {
        let pipeline = Pipeline::new(config()).unwrap();
        let text = "The levee failed during the flood. Floods returned later that year.";
        let report = pipeline.run(&Document::new("pad", text)).unwrap();
        let again = pipeline.recombine(&report.combined).unwrap();
        assert_eq!(again.matches, report.combined.matches);
    }
}
