//! Core types, configuration, and error handling for riscan.
//!
//! This crate provides the shared foundation used by all other riscan crates:
//! - [`RiError`]: unified error type using `thiserror` and `miette`
//! - [`RiConfig`]: configuration loaded from `.riscan.toml`
//! - Match records: [`KeywordMatch`], [`SemanticMatch`], [`CombinedMatch`]
//! - Offsets: [`Span`] and the [`CharIndex`] character/byte translator

mod config;
mod error;
mod text;
mod types;

pub use config::{EmbeddingConfig, RiConfig, SearchConfig, Taxonomy, BUILTIN_CONFIG};
pub use error::{ErrorKind, RiError};
pub use text::CharIndex;
pub use types::{
    Chunk, CombinedMatch, Document, FoundBy, KeywordMatch, OutputFormat, SemanticMatch,
    SemanticQuery, Source, Span,
};

/// A convenience `Result` type for riscan operations.
pub type Result<T> = std::result::Result<T, RiError>;
