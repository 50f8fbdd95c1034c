//! Document-level orchestration for riscan.
//!
//! - [`corpus`] loads `.txt` / `.md` documents from disk.
//! - [`Pipeline`] runs the keyword, semantic and dedup stages per document.
//! - [`artifacts`] reads and writes the per-stage JSON result files.

pub mod artifacts;
pub mod corpus;
mod pipeline;

pub use artifacts::{CombinedResults, KeywordResults, SemanticResults};
pub use corpus::{load_documents, CorpusDocument};
pub use pipeline::{DocumentReport, Pipeline};
