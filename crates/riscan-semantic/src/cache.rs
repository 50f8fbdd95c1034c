//! SQLite cache of remote embeddings.
//!
//! Vectors are stored as little-endian `f32` BLOBs keyed by model name and
//! the SHA-256 of the embedded text, so re-running a corpus only pays for
//! chunks that changed.

use std::path::Path;

use riscan_core::RiError;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::embedding::EmbeddingClient;

/// Persistent `(model, text) → vector` store.
///
/// # Examples
///
/// ```
/// use riscan_semantic::cache::EmbeddingCache;
///
/// let cache = EmbeddingCache::in_memory().unwrap();
/// cache.put("voyage-3", "levee", &[0.5, -0.25]).unwrap();
/// assert_eq!(cache.get("voyage-3", "levee").unwrap(), Some(vec![0.5, -0.25]));
/// assert_eq!(cache.get("text-embedding-3-small", "levee").unwrap(), None);
/// ```
pub struct EmbeddingCache {
    conn: Connection,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache").finish_non_exhaustive()
    }
}

impl EmbeddingCache {
    /// Open or create a cache database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::Database`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, RiError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RiError::Database(format!("failed to create cache directory: {e}"))
                })?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| RiError::Database(format!("failed to open database: {e}")))?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, RiError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            RiError::Database(format!("failed to create in-memory database: {e}"))
        })?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<(), RiError> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS embeddings (
                    model TEXT NOT NULL,
                    content_hash TEXT NOT NULL,
                    dimensions INTEGER NOT NULL,
                    embedding BLOB NOT NULL,
                    PRIMARY KEY (model, content_hash)
                );
                ",
            )
            .map_err(|e| RiError::Database(format!("failed to create schema: {e}")))?;
        Ok(())
    }

    /// Cached vector for `text` under `model`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::Database`] on query failure.
    pub fn get(&self, model: &str, text: &str) -> Result<Option<Vec<f32>>, RiError> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT embedding FROM embeddings WHERE model = ?1 AND content_hash = ?2",
                params![model, content_hash(text)],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RiError::Database(format!("failed to read embedding: {e}")))?;
        Ok(bytes.map(|b| bytes_to_floats(&b)))
    }

    /// Store `vector` for `text` under `model`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::Database`] on insert failure.
    pub fn put(&self, model: &str, text: &str, vector: &[f32]) -> Result<(), RiError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO embeddings (model, content_hash, dimensions, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    model,
                    content_hash(text),
                    vector.len() as i64,
                    floats_to_bytes(vector)
                ],
            )
            .map_err(|e| RiError::Database(format!("failed to store embedding: {e}")))?;
        Ok(())
    }

    /// Number of cached vectors across all models.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::Database`] on query failure.
    pub fn len(&self) -> Result<usize, RiError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
            .map_err(|e| RiError::Database(format!("failed to count embeddings: {e}")))?;
        Ok(count as usize)
    }

    /// `true` if nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns [`RiError::Database`] on query failure.
    pub fn is_empty(&self) -> Result<bool, RiError> {
        Ok(self.len()? == 0)
    }
}

/// Embed `texts` through `client`, serving hits from `cache` and storing misses.
///
/// Returns vectors in input order.
///
/// # Errors
///
/// Propagates API and cache failures.
pub async fn embed_with_cache(
    client: &EmbeddingClient,
    cache: Option<&EmbeddingCache>,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, RiError> {
    let Some(cache) = cache else {
        return client.embed_batch(texts).await;
    };

    let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
    let mut missing: Vec<usize> = Vec::new();
    for (i, text) in texts.iter().enumerate() {
        let hit = cache.get(client.model(), text)?;
        if hit.is_none() {
            missing.push(i);
        }
        vectors.push(hit);
    }

    tracing::debug!(
        total = texts.len(),
        cached = texts.len() - missing.len(),
        "embedding cache lookup"
    );

    if !missing.is_empty() {
        let to_embed: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
        let fresh = client.embed_batch(&to_embed).await?;
        for (&i, vector) in missing.iter().zip(fresh) {
            cache.put(client.model(), &texts[i], &vector)?;
            vectors[i] = Some(vector);
        }
    }

    vectors
        .into_iter()
        .map(|v| v.ok_or_else(|| RiError::external("embedding API", "missing embedding in response")))
        .collect()
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    floats.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
