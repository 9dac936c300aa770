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

//! Relevance scoring
//!
//! Both scorers share one composite formula:
//!
//! ```text
//! score = min(1, (base + mode_bonus) · w_priority · √w_decay)
//! ```
//!
//! Where:
//! - `base` = scorer-specific similarity in [0, 1]
//! - `mode_bonus` = paid when the record kind belongs to the recall mode
//! - `w_priority` = P0 → 1.2, P1 → 1.0, P2 → 0.8
//! - `w_decay` = record decay, floored at 0.1 when non-positive

mod keyword;
mod vector;

pub use keyword::KeywordScorer;
pub use vector::VectorScorer;

use crate::embedding::{load_default_backend, EmbeddingBackend};
use crate::mode::RecallMode;
use brainstore_core::{Priority, Record};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Decay weight used when a record's decay is zero or negative
pub const DECAY_FLOOR_WEIGHT: f64 = 0.1;

/// Weight applied per priority tier
pub fn priority_weight(priority: Priority) -> f64 {
    match priority {
        Priority::P0 => 1.2,
        Priority::P1 => 1.0,
        Priority::P2 => 0.8,
    }
}

/// Decay multiplier input, floored so a zero decay never extinguishes a record
pub fn decay_weight(decay: f64) -> f64 {
    if decay > 0.0 {
        decay
    } else {
        DECAY_FLOOR_WEIGHT
    }
}

/// Apply the composite formula. Result is always in [0, 1].
pub fn composite_score(base: f64, mode_bonus: f64, record: &Record) -> f64 {
    let raw = (base + mode_bonus)
        * priority_weight(record.priority)
        * decay_weight(record.decay).sqrt();
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Canonical text of a record for matching and embedding
pub fn record_text(record: &Record) -> String {
    format!(
        "{} {} {} {}",
        record.kind,
        record.source,
        record.content,
        record.tags.join(" ")
    )
}

/// Capability shared by every scorer
pub trait RelevanceScorer: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Raw similarity between query and record in [0, 1]
    fn base_similarity(&self, query: &str, record: &Record) -> f64;

    /// Bonus paid when the record kind matches the recall mode
    fn mode_bonus(&self) -> f64;

    /// Composite relevance in [0, 1]
    fn score(&self, query: &str, record: &Record, mode: RecallMode) -> f64 {
        let bonus = if mode.matches_kind(&record.kind) {
            self.mode_bonus()
        } else {
            0.0
        };
        composite_score(self.base_similarity(query, record), bonus, record)
    }
}

/// Invalid scorer selection
#[derive(Debug, Error)]
#[error("Unknown scorer type: {0:?} (expected keyword, vector, sentence-transformers, hashed-vector or bow)")]
pub struct UnknownScorerType(pub String);

/// Scorer selection as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScorerType {
    /// Token-overlap scorer
    #[default]
    Keyword,
    /// Embedding scorer backed by a real model when one loads
    Vector,
    /// Embedding scorer pinned to the hashed fallback
    HashedVector,
}

impl ScorerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScorerType::Keyword => "keyword",
            ScorerType::Vector => "vector",
            ScorerType::HashedVector => "hashed-vector",
        }
    }
}

impl FromStr for ScorerType {
    type Err = UnknownScorerType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyword" | "lexical" => Ok(ScorerType::Keyword),
            "vector" | "sentence-transformers" => Ok(ScorerType::Vector),
            "hashed-vector" | "bow" => Ok(ScorerType::HashedVector),
            _ => Err(UnknownScorerType(s.to_string())),
        }
    }
}

impl TryFrom<String> for ScorerType {
    type Error = UnknownScorerType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScorerType> for String {
    fn from(value: ScorerType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ScorerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The configured scorer
pub enum Scorer {
    Keyword(KeywordScorer),
    Vector(VectorScorer),
}

impl Scorer {
    /// Build the scorer for a configuration.
    ///
    /// For [`ScorerType::Vector`] the injected backend wins; otherwise the
    /// default local model is tried, and the hashed fallback is used when none
    /// loads.
    pub fn build(
        scorer_type: ScorerType,
        embedding_model: &str,
        embedding_dim: usize,
        backend: Option<Arc<dyn EmbeddingBackend>>,
    ) -> Self {
        match scorer_type {
            ScorerType::Keyword => Scorer::Keyword(KeywordScorer::new()),
            ScorerType::HashedVector => Scorer::Vector(VectorScorer::new(embedding_dim)),
            ScorerType::Vector => {
                match backend.or_else(|| load_default_backend(embedding_model)) {
                    Some(backend) => Scorer::Vector(VectorScorer::with_backend(backend)),
                    None => {
                        tracing::warn!(
                            model = embedding_model,
                            dim = embedding_dim,
                            "No embedding model loaded, vector scorer degrades to hashed embeddings"
                        );
                        Scorer::Vector(VectorScorer::new(embedding_dim))
                    }
                }
            }
        }
    }

    /// The vector scorer, if that is what is configured
    pub fn as_vector(&self) -> Option<&VectorScorer> {
        match self {
            Scorer::Vector(v) => Some(v),
            Scorer::Keyword(_) => None,
        }
    }

    /// Vector scorer with a real model behind it
    pub fn model_backed(&self) -> Option<&VectorScorer> {
        self.as_vector().filter(|v| v.has_backend())
    }
}

impl RelevanceScorer for Scorer {
    fn name(&self) -> &'static str {
        match self {
            Scorer::Keyword(s) => s.name(),
            Scorer::Vector(s) => s.name(),
        }
    }

    fn base_similarity(&self, query: &str, record: &Record) -> f64 {
        match self {
            Scorer::Keyword(s) => s.base_similarity(query, record),
            Scorer::Vector(s) => s.base_similarity(query, record),
        }
    }

    fn mode_bonus(&self) -> f64 {
        match self {
            Scorer::Keyword(s) => s.mode_bonus(),
            Scorer::Vector(s) => s.mode_bonus(),
        }
    }
}

impl fmt::Debug for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scorer::Keyword(_) => f.write_str("Scorer::Keyword"),
            Scorer::Vector(v) => f
                .debug_struct("Scorer::Vector")
                .field("model", &v.model_name())
                .field("dim", &v.dim())
                .field("model_backed", &v.has_backend())
                .finish(),
        }
    }
}
