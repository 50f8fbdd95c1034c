//! Semantic retrieval for riscan.
//!
//! Text is split into overlapping character windows ([`chunker`]), each
//! window and each query is embedded ([`embedding`]), and the score matrix
//! between them yields the top-K chunks per query plus a one-pair-per-chunk
//! view ([`ranker`]). Remote embeddings can be cached on disk ([`cache`]).

pub mod cache;
pub mod chunker;
pub mod embedding;
pub mod ranker;

pub use chunker::chunk_text;
pub use embedding::{Embedder, EmbeddingClient, HashingEmbedder};
pub use ranker::{cosine_similarity, rank_semantic, RankParams, ScoreMatrix, SemanticRanking};
