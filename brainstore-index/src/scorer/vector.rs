// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Embedding scorer
//!
//! Embeds the query and the record, then scores on clamped cosine
//! similarity. Record vectors come from `metadata.embedding` when a
//! compatible one is cached there, otherwise the record text is embedded on
//! the fly.

use super::{record_text, RelevanceScorer};
use crate::embedding::{
    cosine_similarity, l2_normalize, EmbeddingBackend, EmbeddingError, HashedEmbedder,
};
use brainstore_core::{Record, EMBEDDING_MODEL_KEY};
use moka::sync::Cache;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bonus for records whose kind matches the recall mode
pub const VECTOR_MODE_BONUS: f64 = 0.05;

/// Entries kept in the in-process embedding cache
const EMBEDDING_CACHE_CAPACITY: u64 = 10_000;

/// (model name, dimension, text)
type CacheKey = (String, usize, String);

/// Cosine-similarity scorer over a real model or the hashed fallback
pub struct VectorScorer {
    dim: usize,
    backend: Option<Arc<dyn EmbeddingBackend>>,
    fallback: HashedEmbedder,
    cache: Cache<CacheKey, Arc<Vec<f32>>>,
}

impl VectorScorer {
    /// Scorer on hashed embeddings only
    pub fn new(dim: usize) -> Self {
        let fallback = HashedEmbedder::new(dim);
        Self {
            dim: fallback.dim(),
            backend: None,
            fallback,
            cache: Cache::new(EMBEDDING_CACHE_CAPACITY),
        }
    }

    /// Scorer on a real model. The dimension follows the model.
    pub fn with_backend(backend: Arc<dyn EmbeddingBackend>) -> Self {
        let fallback = HashedEmbedder::new(backend.dimension());
        Self {
            dim: fallback.dim(),
            backend: Some(backend),
            fallback,
            cache: Cache::new(EMBEDDING_CACHE_CAPACITY),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Whether a real model is loaded
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Name recorded as embedding provenance
    pub fn model_name(&self) -> &str {
        match &self.backend {
            Some(backend) => backend.model_name(),
            None => self.fallback.model_name(),
        }
    }

    /// Embed with the real model, without falling back.
    ///
    /// Used where a hashed vector must never be persisted as if it came from
    /// the model.
    pub fn try_embed_with_backend(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| EmbeddingError::ModelInit("No embedding backend loaded".into()))?;

        let key = (backend.model_name().to_string(), self.dim, text.to_string());
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.as_ref().clone());
        }

        let mut vector = backend.encode(text)?;
        if vector.len() != self.dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        l2_normalize(&mut vector);
        self.cache.insert(key, Arc::new(vector.clone()));
        Ok(vector)
    }

    /// Embed with the real model when possible, otherwise the hashed fallback.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        if self.backend.is_some() {
            match self.try_embed_with_backend(text) {
                Ok(vector) => return vector,
                Err(e) => {
                    warn!(error = %e, "Embedding backend failed, using hashed fallback");
                }
            }
        }

        let key = (self.fallback.model_name().to_string(), self.dim, text.to_string());
        if let Some(hit) = self.cache.get(&key) {
            return hit.as_ref().clone();
        }
        let vector = self.fallback.embed(text);
        self.cache.insert(key, Arc::new(vector.clone()));
        vector
    }

    /// Vector for a record: its cached embedding when compatible, else computed
    fn record_vector(&self, record: &Record) -> Vec<f32> {
        if let Some(stored) = record.embedding() {
            let model_matches = record
                .metadata
                .get(EMBEDDING_MODEL_KEY)
                .and_then(|v| v.as_str())
                .map_or(true, |model| model == self.model_name());
            if stored.len() == self.dim && model_matches {
                return stored;
            }
            debug!(
                record_id = %record.id,
                stored_dim = stored.len(),
                dim = self.dim,
                "Ignoring incompatible stored embedding"
            );
        }
        self.embed(&record_text(record))
    }

    /// Number of cached embeddings
    pub fn cache_len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl RelevanceScorer for VectorScorer {
    fn name(&self) -> &'static str {
        "vector"
    }

    fn base_similarity(&self, query: &str, record: &Record) -> f64 {
        let query_vec = self.embed(query);
        let record_vec = self.record_vector(record);
        (cosine_similarity(&query_vec, &record_vec) as f64).clamp(0.0, 1.0)
    }

    fn mode_bonus(&self) -> f64 {
        VECTOR_MODE_BONUS
    }
}
