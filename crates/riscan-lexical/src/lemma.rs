//! Lemmatizer seam.
//!
//! The matcher never normalizes words itself; it asks a [`Lemmatizer`].
//! [`SnowballLemmatizer`] is the bundled English implementation, and any
//! `Fn(&str) -> Result<String>` closure works as well.

use riscan_core::RiError;
use rust_stemmers::{Algorithm, Stemmer};

/// Maps a lowercased word to its canonical form.
///
/// Implementations must be deterministic: the same word always yields the
/// same lemma. Failures surface as [`RiError::ExternalDependency`] and are
/// propagated unchanged by the matcher.
pub trait Lemmatizer: Send + Sync {
    /// Canonical form of `word`.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::ExternalDependency`] if the underlying service fails.
    fn lemmatize(&self, word: &str) -> Result<String, RiError>;
}

impl<F> Lemmatizer for F
where
    F: Fn(&str) -> Result<String, RiError> + Send + Sync,
{
    fn lemmatize(&self, word: &str) -> Result<String, RiError> {
        self(word)
    }
}

/// English Snowball stemmer used as a lemmatizer.
///
/// Words shorter than four characters are returned unchanged so short
/// acronyms (`"UPS"`) do not collapse onto common words (`"up"`).
///
/// # Examples
///
/// ```
/// use riscan_lexical::lemma::{Lemmatizer, SnowballLemmatizer};
///
/// let lemmatizer = SnowballLemmatizer::new();
/// assert_eq!(lemmatizer.lemmatize("flooding").unwrap(), "flood");
/// assert_eq!(lemmatizer.lemmatize("floods").unwrap(), "flood");
/// assert_eq!(lemmatizer.lemmatize("ups").unwrap(), "ups");
/// ```
pub struct SnowballLemmatizer {
    stemmer: Stemmer,
}

const MIN_STEM_LEN: usize = 4;

impl std::fmt::Debug for SnowballLemmatizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowballLemmatizer")
            .field("algorithm", &"english")
            .finish_non_exhaustive()
    }
}

impl Default for SnowballLemmatizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SnowballLemmatizer {
    /// Create an English stemmer.
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
        }
    }
}

impl Lemmatizer for SnowballLemmatizer {
    fn lemmatize(&self, word: &str) -> Result<String, RiError> {
        let lower = word.to_lowercase();
        if lower.chars().count() < MIN_STEM_LEN {
            return Ok(lower);
        }
        Ok(self.stemmer.stem(&lower).into_owned())
    }
}
