//! Text embedders.
//!
//! [`Embedder`] is the synchronous seam the ranker uses. [`HashingEmbedder`]
//! is the offline default; [`EmbeddingClient`] talks to OpenAI-compatible
//! and Voyage `/embeddings` endpoints and feeds the ranker through
//! [`crate::ranker::ScoreMatrix::from_embeddings`].

use riscan_core::{EmbeddingConfig, RiError};
use riscan_lexical::tokenize::word_tokens;
use riscan_lexical::{Lemmatizer, SnowballLemmatizer};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maps text to a dense vector.
///
/// Implementations must be deterministic and thread-safe; the ranker embeds
/// chunks in parallel.
pub trait Embedder: Send + Sync {
    /// Embed one text.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::ExternalDependency`] if the model fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>, RiError>;
}

impl<F> Embedder for F
where
    F: Fn(&str) -> Result<Vec<f32>, RiError> + Send + Sync,
{
    fn embed(&self, text: &str) -> Result<Vec<f32>, RiError> {
        self(text)
    }
}

/// Offline feature-hashing embedder.
///
/// Each lemmatized word token is hashed (SHA-256) into one of `dimensions`
/// buckets with a hash-derived sign; the bucket counts are L2-normalized.
/// Texts sharing vocabulary get high cosine similarity, which is enough to
/// rank passages without a model server.
///
/// # Examples
///
/// ```
/// use riscan_semantic::embedding::{Embedder, HashingEmbedder};
/// use riscan_semantic::ranker::cosine_similarity;
///
/// let embedder = HashingEmbedder::new(256).unwrap();
/// let a = embedder.embed("flood protection for substations").unwrap();
/// let b = embedder.embed("substations protected against flooding").unwrap();
/// let c = embedder.embed("quarterly budget tables").unwrap();
/// assert_eq!(a.len(), 256);
/// assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
/// ```
pub struct HashingEmbedder {
    dimensions: usize,
    lemmatizer: SnowballLemmatizer,
}

impl std::fmt::Debug for HashingEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashingEmbedder")
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl HashingEmbedder {
    /// Create an embedder producing `dimensions`-long vectors.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::InvalidParameter`] if `dimensions == 0`.
    pub fn new(dimensions: usize) -> Result<Self, RiError> {
        if dimensions == 0 {
            return Err(RiError::InvalidParameter(
                "embedding dimensions must be greater than zero".into(),
            ));
        }
        Ok(Self {
            dimensions,
            lemmatizer: SnowballLemmatizer::new(),
        })
    }

    /// Vector length.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RiError> {
        let mut vector = vec![0.0f32; self.dimensions];
        let index = riscan_core::CharIndex::new(text);
        for token in word_tokens(text, &index) {
            let lemma = self.lemmatizer.lemmatize(&token.lower)?;
            let digest = Sha256::digest(lemma.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(head) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// Client for OpenAI-compatible and Voyage embedding APIs.
///
/// # Examples
///
/// ```
/// use riscan_semantic::embedding::EmbeddingClient;
///
/// let client = EmbeddingClient::new("voyage", "test-key");
/// assert_eq!(client.model(), "voyage-3");
/// ```
pub struct EmbeddingClient {
    client: reqwest::Client,
    provider: String,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const VOYAGE_BASE_URL: &str = "https://api.voyageai.com/v1";
const BATCH_SIZE: usize = 64;
const BATCH_DELAY_MS: u64 = 200;

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl EmbeddingClient {
    /// Create a client for `provider` (`"openai"` or `"voyage"`) with the
    /// provider's default model and endpoint.
    pub fn new(provider: &str, api_key: &str) -> Self {
        let config = EmbeddingConfig {
            provider: provider.to_string(),
            ..EmbeddingConfig::default()
        };
        Self {
            client: reqwest::Client::new(),
            provider: provider.to_string(),
            api_key: api_key.to_string(),
            base_url: default_base_url(provider).to_string(),
            model: config.model_name(),
        }
    }

    /// Create a client from an [`EmbeddingConfig`].
    ///
    /// Falls back to the provider's API key environment variable
    /// (`OPENAI_API_KEY` or `VOYAGE_API_KEY`) if the config has no key.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::Config`] if the provider is not a remote provider
    /// or no API key is available.
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, RiError> {
        let env_var = config.api_key_env().ok_or_else(|| {
            RiError::Config(format!(
                "embedding provider '{}' has no remote API; use \"openai\" or \"voyage\"",
                config.provider
            ))
        })?;
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .ok_or_else(|| {
                RiError::Config(format!(
                    "embedding API key not found: set embedding.api_key in .riscan.toml or {env_var} env var"
                ))
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            provider: config.provider.clone(),
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base_url(&config.provider).to_string()),
            model: config.model_name(),
        })
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed document texts. Returns vectors in input order.
    ///
    /// Splits into batches of 64 with a 200ms pause between batches.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::ExternalDependency`] if the API call fails or
    /// returns a different number of vectors than requested.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            if i > 0 {
                tokio::time::sleep(tokio::time::Duration::from_millis(BATCH_DELAY_MS)).await;
            }
            let request = self.build_request(batch, "document");
            let vectors = self.send(&request).await?;
            if vectors.len() != batch.len() {
                return Err(RiError::external(
                    "embedding API",
                    format!("requested {} embeddings, got {}", batch.len(), vectors.len()),
                ));
            }
            all_embeddings.extend(vectors);
            tracing::debug!(batch = i, size = batch.len(), "embedded batch");
        }
        Ok(all_embeddings)
    }

    /// Embed a single query.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::ExternalDependency`] if the API call fails.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RiError> {
        let request = self.build_request(&[query.to_string()], "query");
        self.send(&request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RiError::external("embedding API", "empty response"))
    }

    fn build_request(&self, texts: &[String], input_type: &str) -> EmbedRequest {
        EmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
            input_type: (self.provider == "voyage").then(|| input_type.to_string()),
        }
    }

    async fn send(&self, request: &EmbedRequest) -> Result<Vec<Vec<f32>>, RiError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| RiError::external("embedding API", format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(RiError::external(
                "embedding API",
                format!("{} returned {status}: {body}", self.provider),
            ));
        }

        let embed_response: EmbedResponse = response.json().await.map_err(|e| {
            RiError::external("embedding API", format!("failed to parse response: {e}"))
        })?;
        Ok(into_ordered_vectors(embed_response))
    }
}

fn default_base_url(provider: &str) -> &'static str {
    match provider {
        "voyage" => VOYAGE_BASE_URL,
        _ => OPENAI_BASE_URL,
    }
}

fn into_ordered_vectors(response: EmbedResponse) -> Vec<Vec<f32>> {
    let mut data = response.data;
    // Stable: responses without `index` keep their order.
    data.sort_by_key(|item| item.index);
    data.into_iter().map(|item| item.embedding).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::cosine_similarity;

    #[test]
    fn hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64).unwrap();
        let a = embedder.embed("Raised embankments protect the rail line").unwrap();
        let b = embedder.embed("Raised embankments protect the rail line").unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hashing_embedder_normalizes_inflections() {
        let embedder = HashingEmbedder::new(128).unwrap();
        let a = embedder.embed("flooding").unwrap();
        let b = embedder.embed("floods").unwrap();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn hashing_embedder_handles_empty_text() {
        let embedder = HashingEmbedder::new(16).unwrap();
        let v = embedder.embed("").unwrap();
        assert_eq!(v, vec![0.0; 16]);
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[test]
    fn closures_are_embedders() {
        let constant = |_: &str| -> Result<Vec<f32>, RiError> { Ok(vec![1.0, 0.0]) };
        assert_eq!(constant.embed("anything").unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn voyage_request_carries_input_type() {
        let client = EmbeddingClient::new("voyage", "test-key");
        let request = client.build_request(&["dam safety".to_string()], "query");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "voyage-3");
        assert_eq!(json["input_type"], "query");
    }

    #[test]
    fn openai_request_omits_input_type() {
        let client = EmbeddingClient::new("openai", "test-key");
        let texts = vec!["a".to_string(), "b".to_string()];
        let request = client.build_request(&texts, "document");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "text-embedding-3-small");
        assert!(json.get("input_type").is_none());
        assert_eq!(json["input"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn response_vectors_follow_index() {
        let json = r#"{
            "data": [
                {"embedding": [0.4, 0.5], "index": 1},
                {"embedding": [0.1, 0.2], "index": 0}
            ]
        }"#;
        let response: EmbedResponse = serde_json::from_str(json).unwrap();
        let vectors = into_ordered_vectors(response);
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.4, 0.5]]);
    }

    #[test]
    fn response_without_index_keeps_order() {
        let json = r#"{"data": [{"embedding": [1.0]}, {"embedding": [2.0]}]}"#;
        let response: EmbedResponse = serde_json::from_str(json).unwrap();
        assert_eq!(into_ordered_vectors(response), vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn hashing_provider_has_no_client() {
        let err = EmbeddingClient::with_config(&EmbeddingConfig::default()).unwrap_err();
        assert!(err.to_string().contains("no remote API"));
    }

    #[test]
    fn config_key_and_base_url_are_used() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            api_key: Some("sk-test".into()),
            base_url: Some("http://localhost:8080/v1".into()),
            model: Some("local-embed".into()),
            ..EmbeddingConfig::default()
        };
        let client = EmbeddingClient::with_config(&config).unwrap();
        assert_eq!(client.model(), "local-embed");
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }
}
