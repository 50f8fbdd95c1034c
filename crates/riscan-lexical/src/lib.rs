//! Keyword matching for riscan.
//!
//! Finds every occurrence of a sector taxonomy's keywords in a document,
//! normalizing both sides through a [`lemma::Lemmatizer`] so inflected forms
//! (`"flooding"`, `"floods"`) match their canonical keyword (`"flood"`).
//! Each match carries a character span and the surrounding sentences.

pub mod lemma;
pub mod matcher;
pub mod tokenize;

pub use lemma::{Lemmatizer, SnowballLemmatizer};
pub use matcher::{
    find_keyword_matches, keyword_counts, CompiledTaxonomy, KeywordMatcher, MatchParams,
};
