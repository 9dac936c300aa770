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

//! Embedding backends
//!
//! - **Real backends** implement [`EmbeddingBackend`] (a local ONNX model via
//!   `fastembed` behind the `fastembed-embeddings` feature, or anything the
//!   host injects).
//! - **Hashed fallback**: [`HashedEmbedder`] is a deterministic bag-of-words
//!   projection with no external dependency. It is always available, so vector
//!   scoring keeps working when no model can be loaded.

use ndarray::{ArrayView1, ArrayViewMut1};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

/// Provenance kind stamped on embeddings produced by a real model
pub const MODEL_EMBEDDING_KIND: &str = "sentence-transformers";

/// Model name reported by the hashed fallback
pub const HASHED_MODEL_NAME: &str = "hashed-bow";

/// Default embedding dimension (all-MiniLM-L6-v2)
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Errors from embedding backends
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Model could not be loaded
    #[error("Failed to initialize embedding model: {0}")]
    ModelInit(String),

    /// Model failed to encode
    #[error("Failed to generate embeddings: {0}")]
    Generation(String),

    /// Model returned a vector of the wrong size
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// A real text embedding model
pub trait EmbeddingBackend: Send + Sync {
    /// Model identifier, recorded as embedding provenance
    fn model_name(&self) -> &str;

    /// Output dimension
    fn dimension(&self) -> usize;

    /// Encode one text. Output need not be normalized.
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Hashed bag-of-words embedder
///
/// Each whitespace token (lowercased) is hashed with SHA-256; the first four
/// digest bytes, read big-endian, select a bucket modulo `dim`. The bucket
/// counts are L2-normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashedEmbedder {
    dim: usize,
}

impl HashedEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for token in text.split_whitespace() {
            vector[self.bucket(&token.to_lowercase())] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        head as usize % self.dim
    }
}

impl EmbeddingBackend for HashedEmbedder {
    fn model_name(&self) -> &str {
        HASHED_MODEL_NAME
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed(text))
    }
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let mut view = ArrayViewMut1::from(vector);
    let norm = view.dot(&view).sqrt();
    if norm > 0.0 && norm.is_finite() {
        view.mapv_inplace(|x| x / norm);
    }
}

/// Cosine similarity; 0.0 for empty, zero or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let cosine = a.dot(&b) / (norm_a * norm_b);
    if cosine.is_finite() {
        cosine
    } else {
        0.0
    }
}

/// Try to load the default local model.
///
/// Returns `None` when the model fails to load; callers fall back to hashed
/// embeddings.
#[cfg(feature = "fastembed-embeddings")]
pub fn load_default_backend(model_name: &str) -> Option<Arc<dyn EmbeddingBackend>> {
    match local::FastEmbedBackend::try_new(model_name) {
        Ok(backend) => Some(Arc::new(backend)),
        Err(e) => {
            tracing::warn!(model = model_name, error = %e, "Embedding model unavailable, using hashed fallback");
            None
        }
    }
}

/// Built without a model backend: always `None`.
#[cfg(not(feature = "fastembed-embeddings"))]
pub fn load_default_backend(model_name: &str) -> Option<Arc<dyn EmbeddingBackend>> {
    tracing::debug!(
        model = model_name,
        "Built without a model backend, using hashed fallback"
    );
    None
}

#[cfg(feature = "fastembed-embeddings")]
pub mod local {
    //! Local ONNX embeddings through fastembed

    use super::{EmbeddingBackend, EmbeddingError};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use tracing::info;

    pub struct FastEmbedBackend {
        model_name: String,
        dimension: usize,
        model: TextEmbedding,
    }

    impl FastEmbedBackend {
        /// Load a model by its sentence-transformers name
        pub fn try_new(model_name: &str) -> Result<Self, EmbeddingError> {
            let (model, dimension) = match model_name {
                "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
                    (EmbeddingModel::AllMiniLML6V2, 384)
                }
                "all-MiniLM-L12-v2" | "sentence-transformers/all-MiniLM-L12-v2" => {
                    (EmbeddingModel::AllMiniLML12V2, 384)
                }
                "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
                "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
                other => {
                    return Err(EmbeddingError::ModelInit(format!(
                        "Unknown embedding model: '{}'",
                        other
                    )))
                }
            };

            info!(model = model_name, dimension, "Initializing embedding model");
            let model = TextEmbedding::try_new(InitOptions::new(model))
                .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;

            Ok(Self {
                model_name: model_name.to_string(),
                dimension,
                model,
            })
        }
    }

    impl EmbeddingBackend for FastEmbedBackend {
        fn model_name(&self) -> &str {
            &self.model_name
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.model
                .embed(vec![text], None)
                .map_err(|e| EmbeddingError::Generation(e.to_string()))?
                .into_iter()
                .next()
                .ok_or_else(|| EmbeddingError::Generation("Empty embedding result".into()))
        }
    }
}
