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

//! Brainstore Memory
//!
//! The orchestration layer of the brainstore engine. A [`Brain`] is built
//! once from a [`BrainConfig`] and offers:
//!
//! - `write`: validate, embed, novelty-gate and persist a record
//! - `retrieve`: score, select (flat or tiered), dedupe and log usage
//! - `checkpoint`, `rollback`, `list_versions`: store pass-throughs
//! - `backfill_embeddings`: attach model embeddings to older records
//!
//! ## Example
//!
//! ```rust,no_run
//! use brainstore_memory::{Brain, BrainConfig, RecallQuery};
//! use brainstore_core::RecordDraft;
//!
//! let brain = Brain::configure(BrainConfig::load(None)?)?;
//! brain.write(RecordDraft::new("Use jsonl for append-only storage").tags(vec!["storage"]))?;
//! let hits = brain.retrieve(&RecallQuery::new("append-only storage").limit(3))?;
//! # Ok::<(), brainstore_memory::MemoryError>(())
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod recall;

pub use config::BrainConfig;
pub use engine::{BackfillSummary, Brain, BrainStats};
pub use error::{MemoryError, MemoryResult};
pub use recall::{RecallQuery, ScoredRecord};

pub use brainstore_core::{Priority, Record, RecordDraft};
pub use brainstore_index::{EmbeddingBackend, EmbeddingError, RecallMode, ScorerType};
pub use brainstore_storage::CheckpointSummary;
