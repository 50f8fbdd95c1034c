use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RiError;
use crate::types::SemanticQuery;

/// Sector name → keywords and phrases belonging to it.
///
/// A `BTreeMap` keeps iteration (and therefore match ids) deterministic.
pub type Taxonomy = BTreeMap<String, Vec<String>>;

/// The bundled resilient-infrastructure configuration, as written by `riscan init`.
pub const BUILTIN_CONFIG: &str = include_str!("builtin.toml");

/// Top-level configuration loaded from `.riscan.toml`.
///
/// Every stage receives the pieces it needs at call time; nothing here is
/// process-wide state.
///
/// # Examples
///
/// ```
/// use riscan_core::RiConfig;
///
/// let config = RiConfig::default();
/// assert_eq!(config.search.chunk_size, 500);
/// assert!(config.taxonomy.is_empty());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiConfig {
    /// Matching, chunking, ranking and deduplication parameters.
    #[serde(default)]
    pub search: SearchConfig,
    /// Embedding provider settings for semantic ranking.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Keyword taxonomy for the lexical matcher.
    #[serde(default)]
    pub taxonomy: Taxonomy,
    /// Queries for the semantic ranker.
    #[serde(default)]
    pub queries: Vec<SemanticQuery>,
}

impl RiConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::FileNotFound`] if the file does not exist,
    /// [`RiError::Io`] if it cannot be read, or [`RiError::Toml`] if the
    /// content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use riscan_core::RiConfig;
    /// use std::path::Path;
    ///
    /// let config = RiConfig::from_file(Path::new(".riscan.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, RiError> {
        if !path.exists() {
            return Err(RiError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use riscan_core::RiConfig;
    ///
    /// let toml = r#"
    /// [search]
    /// top_k = 5
    ///
    /// [taxonomy]
    /// hazards = ["flood", "storm surge"]
    ///
    /// [[queries]]
    /// sector = "flood_resilience"
    /// query = "elevated substations"
    /// "#;
    /// let config = RiConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.search.top_k, 5);
    /// assert_eq!(config.taxonomy["hazards"].len(), 2);
    /// assert_eq!(config.queries[0].sector, "flood_resilience");
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, RiError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// The bundled taxonomy and query set with default parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::Toml`] if the bundled file fails to parse.
    ///
    /// # Examples
    ///
    /// ```
    /// use riscan_core::RiConfig;
    ///
    /// let config = RiConfig::builtin().unwrap();
    /// assert!(config.taxonomy.contains_key("hazards"));
    /// assert_eq!(config.queries.len(), 8);
    /// ```
    pub fn builtin() -> Result<Self, RiError> {
        Self::from_toml(BUILTIN_CONFIG)
    }

    /// Check every numeric parameter before any processing starts.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::InvalidParameter`] describing the first bad value.
    pub fn validate(&self) -> Result<(), RiError> {
        self.search.validate()
    }
}

/// Parameters for the four core stages.
///
/// # Examples
///
/// ```
/// use riscan_core::SearchConfig;
///
/// let config = SearchConfig::default();
/// assert_eq!(config.context_sentences, 3);
/// assert_eq!(config.max_context_chars, Some(1000));
/// assert_eq!(config.chunk_overlap, 100);
/// assert_eq!(config.top_k, 10);
/// assert_eq!(config.overlap_threshold, 0.5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Sentences of context before and after a keyword match (default: 3).
    #[serde(default = "default_context_sentences")]
    pub context_sentences: usize,
    /// Cap on keyword context length in characters, centred on the match
    /// (default: 1000). Never cuts into the match itself.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: Option<usize>,
    /// Chunk size in characters (default: 500).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters (default: 100).
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Chunks kept per query (default: 10).
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum span overlap ratio for deduplication (default: 0.5).
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f64,
    /// Drop semantic pairs scoring below this floor.
    #[serde(default)]
    pub min_score: Option<f64>,
}

fn default_context_sentences() -> usize {
    3
}

fn default_max_context_chars() -> Option<usize> {
    Some(1000)
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_top_k() -> usize {
    10
}

fn default_overlap_threshold() -> f64 {
    0.5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            context_sentences: default_context_sentences(),
            max_context_chars: default_max_context_chars(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            overlap_threshold: default_overlap_threshold(),
            min_score: None,
        }
    }
}

impl SearchConfig {
    /// Reject out-of-range parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::InvalidParameter`] describing the first bad value.
    pub fn validate(&self) -> Result<(), RiError> {
        if self.chunk_size == 0 {
            return Err(RiError::InvalidParameter(
                "chunk_size must be greater than 0".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RiError::InvalidParameter(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RiError::InvalidParameter(
                "top_k must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.overlap_threshold) {
            return Err(RiError::InvalidParameter(format!(
                "overlap_threshold must be within [0, 1], got {}",
                self.overlap_threshold
            )));
        }
        if self.max_context_chars == Some(0) {
            return Err(RiError::InvalidParameter(
                "max_context_chars must be greater than 0".into(),
            ));
        }
        if let Some(floor) = self.min_score {
            if floor.is_nan() {
                return Err(RiError::InvalidParameter("min_score must be a number".into()));
            }
        }
        Ok(())
    }
}

/// Configuration for the embedding provider used by semantic ranking.
///
/// # Examples
///
/// ```
/// use riscan_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, "hashing");
/// assert_eq!(config.dimensions, 384);
/// assert_eq!(config.model_name(), "hashing-384");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: `"hashing"` (offline), `"openai"` or `"voyage"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// API key for remote providers.
    pub api_key: Option<String>,
    /// Model name; each provider has its own default.
    pub model: Option<String>,
    /// Custom base URL for OpenAI-compatible endpoints.
    pub base_url: Option<String>,
    /// Vector dimensions for the hashing embedder (default: 384).
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    /// SQLite file caching remote embeddings between runs.
    pub cache_path: Option<PathBuf>,
}

fn default_embedding_provider() -> String {
    "hashing".into()
}

fn default_embedding_dimensions() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            model: None,
            base_url: None,
            dimensions: default_embedding_dimensions(),
            cache_path: None,
        }
    }
}

impl EmbeddingConfig {
    /// Resolved model name, used as the embedding cache namespace.
    pub fn model_name(&self) -> String {
        if let Some(model) = &self.model {
            return model.clone();
        }
        match self.provider.as_str() {
            "openai" => "text-embedding-3-small".into(),
            "voyage" => "voyage-3".into(),
            _ => format!("hashing-{}", self.dimensions),
        }
    }

    /// Environment variable holding the API key for this provider.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "openai" => Some("OPENAI_API_KEY"),
            "voyage" => Some("VOYAGE_API_KEY"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = RiConfig::default();
        assert_eq!(config.search.context_sentences, 3);
        assert_eq!(config.search.chunk_size, 500);
        assert_eq!(config.search.chunk_overlap, 100);
        assert_eq!(config.search.top_k, 10);
        assert_eq!(config.search.overlap_threshold, 0.5);
        assert_eq!(config.search.max_context_chars, Some(1000));
        assert!(config.search.min_score.is_none());
        assert_eq!(config.embedding.provider, "hashing");
        assert!(config.queries.is_empty());
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = RiConfig::from_toml("").unwrap();
        assert_eq!(config.search.top_k, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_toml_returns_error() {
        assert!(RiConfig::from_toml("{{invalid}}").is_err());
    }

    #[test]
    fn builtin_config_parses_and_validates() {
        let config = RiConfig::builtin().unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.search.max_context_chars, Some(1000));
        assert!(config.taxonomy["hazards"].contains(&"flood".to_string()));
        assert!(config.taxonomy.contains_key("energy"));
        assert!(config
            .queries
            .iter()
            .any(|q| q.sector == "seismic_resilience"));
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let config = SearchConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..SearchConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = SearchConfig {
            chunk_size: 0,
            chunk_overlap: 0,
            ..SearchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let config = SearchConfig {
            overlap_threshold: -0.1,
            ..SearchConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SearchConfig {
            overlap_threshold: f64::NAN,
            ..SearchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn provider_defaults_resolve_model_names() {
        let openai = EmbeddingConfig {
            provider: "openai".into(),
            ..EmbeddingConfig::default()
        };
        assert_eq!(openai.model_name(), "text-embedding-3-small");
        assert_eq!(openai.api_key_env(), Some("OPENAI_API_KEY"));

        let custom = EmbeddingConfig {
            provider: "voyage".into(),
            model: Some("voyage-3-large".into()),
            ..EmbeddingConfig::default()
        };
        assert_eq!(custom.model_name(), "voyage-3-large");
    }

    #[test]
    fn from_file_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = RiConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, RiError::FileNotFound(_)));
    }
}
