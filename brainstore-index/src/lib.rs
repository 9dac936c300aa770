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

//! Brainstore Index
//!
//! Relevance scoring for brainstore records.
//!
//! ## Scorers
//!
//! - [`KeywordScorer`]: fraction of query tokens found in the record text
//! - [`VectorScorer`]: cosine similarity over a real embedding model, or the
//!   deterministic [`HashedEmbedder`] when no model is available
//!
//! Both are wrapped by the [`Scorer`] union chosen from a [`ScorerType`] at
//! configuration time, and share the composite formula in [`scorer`].

pub mod embedding;
pub mod mode;
pub mod scorer;

pub use embedding::{
    cosine_similarity, l2_normalize, load_default_backend, EmbeddingBackend, EmbeddingError,
    HashedEmbedder, DEFAULT_EMBEDDING_DIM, HASHED_MODEL_NAME, MODEL_EMBEDDING_KIND,
};
pub use mode::RecallMode;
pub use scorer::{
    composite_score, decay_weight, priority_weight, record_text, KeywordScorer,
    RelevanceScorer, Scorer, ScorerType, UnknownScorerType, VectorScorer,
};
