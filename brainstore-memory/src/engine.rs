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

//! Brain orchestrator
//!
//! Owns the configured store and scorer. Writes pass through embedding
//! attachment and the novelty gate before reaching the store; recall scores
//! the logical state, selects flat or by tier, and optionally collapses
//! duplicates and logs usage.

use crate::config::BrainConfig;
use crate::error::MemoryResult;
use crate::recall::{dedupe_results, select_flat, select_tiered, RecallQuery, ScoredRecord};
use brainstore_core::{
    time, Record, RecordDraft, EMBEDDING_DIM_KEY, EMBEDDING_HASH_KEY, EMBEDDING_KEY,
    EMBEDDING_KIND_KEY, EMBEDDING_MODEL_KEY,
};
use brainstore_index::{
    record_text, EmbeddingBackend, RecallMode, RelevanceScorer, Scorer, VectorScorer,
    MODEL_EMBEDDING_KIND,
};
use brainstore_storage::{
    latest_by_hash, BrainStore, CheckpointSummary, StoreStats, WriteOutcome,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Longest novelty window honoured (about 100 years)
const MAX_NOVELTY_WINDOW_SECS: u64 = 3_153_600_000;

/// Counters returned by [`Brain::backfill_embeddings`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillSummary {
    pub scanned: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Engine-level counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrainStats {
    pub enabled: bool,
    pub scorer: String,
    pub embedding_model: Option<String>,
    pub store: StoreStats,
}

/// Why the novelty gate refused a write
#[derive(Debug, Clone, PartialEq)]
enum NoveltyConflict {
    SameHash { existing_id: String },
    TooSimilar { existing_id: String, similarity: f64 },
}

/// The memory engine
///
/// Built once by [`Brain::configure`] and passed by reference to callers.
pub struct Brain {
    config: BrainConfig,
    scorer: Scorer,
    /// `None` when the brain is disabled
    store: Option<BrainStore>,
}

impl Brain {
    /// Build from configuration, loading an embedding model if one is needed
    pub fn configure(config: BrainConfig) -> MemoryResult<Self> {
        Self::build(config, None)
    }

    /// Build with an injected embedding model
    pub fn with_backend(
        config: BrainConfig,
        backend: Arc<dyn EmbeddingBackend>,
    ) -> MemoryResult<Self> {
        Self::build(config, Some(backend))
    }

    fn build(
        config: BrainConfig,
        backend: Option<Arc<dyn EmbeddingBackend>>,
    ) -> MemoryResult<Self> {
        config.validate()?;

        let scorer = Scorer::build(
            config.scorer_type,
            &config.embedding_model,
            config.embedding_dim,
            backend,
        );

        let store = if config.enabled {
            Some(BrainStore::open(&config.base_path, config.store_config())?)
        } else {
            info!("Brain disabled, every operation is a no-op");
            None
        };

        info!(
            base_path = %config.base_path.display(),
            scorer = ?scorer,
            novelty = config.novelty_enabled,
            tiered = config.tiered_recall,
            "Brain configured"
        );

        Ok(Self {
            config,
            scorer,
            store,
        })
    }

    pub fn config(&self) -> &BrainConfig {
        &self.config
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Underlying store, absent when disabled
    pub fn store(&self) -> Option<&BrainStore> {
        self.store.as_ref()
    }

    /// Persist a record.
    ///
    /// Returns `None` when disabled, when the novelty gate rejects the write,
    /// or when the store already holds the hash in its recent window. A
    /// returned record is always on disk. An invalid priority is the only
    /// validation error.
    pub fn write(&self, draft: impl Into<RecordDraft>) -> MemoryResult<Option<Record>> {
        let Some(store) = self.store.as_ref() else {
            return Ok(None);
        };

        let mut record = Record::from_draft(draft.into())?;
        let now = time::now();
        record.touch(now);
        record.refresh_hash();

        self.attach_embedding(&mut record);

        if let Some(conflict) = self.novelty_conflict(store, &record, now)? {
            info!(record_id = %record.id, conflict = ?conflict, "Write rejected by novelty gate");
            return Ok(None);
        }

        match store.write(&mut record)? {
            WriteOutcome::Appended => {
                debug!(record_id = %record.id, "Record stored");
                Ok(Some(record))
            }
            WriteOutcome::Deduplicated => {
                debug!(record_id = %record.id, hash = %record.hash, "Record matched a recent write");
                Ok(None)
            }
        }
    }

    /// Persist a record given as a JSON map
    pub fn write_value(&self, value: Value) -> MemoryResult<Option<Record>> {
        let draft: RecordDraft =
            serde_json::from_value(value).map_err(brainstore_core::RecordError::from)?;
        self.write(draft)
    }

    /// Score, select and return records for a query
    #[instrument(skip(self, query), fields(mode = %query.mode, limit = query.limit))]
    pub fn retrieve(&self, query: &RecallQuery) -> MemoryResult<Vec<ScoredRecord>> {
        let Some(store) = self.store.as_ref() else {
            return Ok(Vec::new());
        };

        let candidates: Vec<(Record, f64)> = store
            .read_all()?
            .into_iter()
            .filter(|r| query.admits(r.priority))
            .filter_map(|r| {
                let score = self.scorer.score(&query.query, &r, query.mode);
                (score >= query.min_score).then_some((r, score))
            })
            .collect();
        let considered = candidates.len();

        let mut selected = if self.config.tiered_recall {
            select_tiered(
                candidates,
                query.limit,
                &self.config.tiered_order,
                &self.config.tiered_limits,
            )
        } else {
            select_flat(candidates, query.limit)
        };

        if self.config.dedupe_on_recall {
            selected = dedupe_results(selected);
        }

        if self.config.track_usage && !selected.is_empty() {
            store.log_usage(selected.iter().map(|(r, _)| r.id.as_str()));
        }

        debug!(considered, returned = selected.len(), "Recall complete");
        Ok(selected
            .into_iter()
            .map(|(record, score)| ScoredRecord::new(record, score))
            .collect())
    }

    /// Compact the store; `None` when disabled
    pub fn checkpoint(&self) -> MemoryResult<Option<CheckpointSummary>> {
        match self.store.as_ref() {
            Some(store) => Ok(Some(store.checkpoint()?)),
            None => Ok(None),
        }
    }

    /// Roll back to `version`; `false` when disabled or unknown
    pub fn rollback(&self, version: &str) -> MemoryResult<bool> {
        match self.store.as_ref() {
            Some(store) => Ok(store.rollback(version)?),
            None => Ok(false),
        }
    }

    /// Known versions, newest first
    pub fn list_versions(&self) -> MemoryResult<Vec<String>> {
        match self.store.as_ref() {
            Some(store) => Ok(store.list_versions()?),
            None => Ok(Vec::new()),
        }
    }

    /// Attach model embeddings to records that lack a current one.
    ///
    /// A no-op unless the vector scorer runs on a real model. Refreshed
    /// records are appended; the stale copies are reconciled at the next
    /// checkpoint. Scanning stops after `limit` records when given.
    #[instrument(skip(self))]
    pub fn backfill_embeddings(&self, limit: Option<usize>) -> MemoryResult<BackfillSummary> {
        let mut summary = BackfillSummary::default();
        let (Some(store), Some(vector)) = (self.store.as_ref(), self.scorer.model_backed()) else {
            debug!("Backfill skipped: no embedding model loaded");
            return Ok(summary);
        };

        for mut record in latest_by_hash(store.read_all()?) {
            if limit.is_some_and(|limit| summary.scanned >= limit) {
                break;
            }
            summary.scanned += 1;

            if embedding_is_current(&record, vector) {
                summary.skipped += 1;
                continue;
            }

            record.touch(time::now());
            record.refresh_hash();
            match vector.try_embed_with_backend(&record_text(&record)) {
                Ok(embedding) => {
                    stamp_embedding(&mut record, vector, &embedding);
                    store.append(&mut record)?;
                    summary.updated += 1;
                }
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "Backfill embedding failed");
                    summary.skipped += 1;
                }
            }
        }

        info!(
            scanned = summary.scanned,
            updated = summary.updated,
            skipped = summary.skipped,
            "Backfill complete"
        );
        Ok(summary)
    }

    pub fn stats(&self) -> MemoryResult<BrainStats> {
        let store = match self.store.as_ref() {
            Some(store) => store.stats()?,
            None => StoreStats::default(),
        };
        Ok(BrainStats {
            enabled: self.store.is_some(),
            scorer: self.scorer.name().to_string(),
            embedding_model: self.scorer.as_vector().map(|v| v.model_name().to_string()),
            store,
        })
    }

    /// Best-effort: attach a model embedding unless a current one is present
    fn attach_embedding(&self, record: &mut Record) {
        let Some(vector) = self.scorer.model_backed() else {
            return;
        };
        if embedding_is_current(record, vector) {
            return;
        }
        match vector.try_embed_with_backend(&record_text(record)) {
            Ok(embedding) => stamp_embedding(record, vector, &embedding),
            Err(e) => warn!(record_id = %record.id, error = %e, "Embedding attach failed"),
        }
    }

    /// First recent record that makes `record` redundant, if any
    fn novelty_conflict(
        &self,
        store: &BrainStore,
        record: &Record,
        now: DateTime<Utc>,
    ) -> MemoryResult<Option<NoveltyConflict>> {
        let window = self.config.novelty_window_seconds.min(MAX_NOVELTY_WINDOW_SECS);
        if !self.config.novelty_enabled || window == 0 {
            return Ok(None);
        }

        let cutoff = now - Duration::seconds(window as i64);
        let threshold = self.config.novelty_min_similarity;
        let mode = RecallMode::for_kind(&record.kind);

        for existing in store.read_all()? {
            if existing.updated_at < cutoff {
                continue;
            }
            if existing.hash == record.hash {
                return Ok(Some(NoveltyConflict::SameHash {
                    existing_id: existing.id,
                }));
            }
            if threshold > 0.0 {
                let similarity = self.scorer.score(&record.content, &existing, mode);
                if similarity >= threshold {
                    return Ok(Some(NoveltyConflict::TooSimilar {
                        existing_id: existing.id,
                        similarity,
                    }));
                }
            }
        }
        Ok(None)
    }
}

/// Whether the cached embedding was produced by this model for this hash
fn embedding_is_current(record: &Record, vector: &VectorScorer) -> bool {
    let meta = &record.metadata;
    record.has_embedding()
        && meta.get(EMBEDDING_MODEL_KEY).and_then(Value::as_str) == Some(vector.model_name())
        && meta.get(EMBEDDING_DIM_KEY).and_then(Value::as_u64) == Some(vector.dim() as u64)
        && meta.get(EMBEDDING_KIND_KEY).and_then(Value::as_str) == Some(MODEL_EMBEDDING_KIND)
        && meta.get(EMBEDDING_HASH_KEY).and_then(Value::as_str) == Some(record.hash.as_str())
}

fn stamp_embedding(record: &mut Record, vector: &VectorScorer, embedding: &[f32]) {
    let values: Vec<Value> = embedding.iter().map(|x| Value::from(*x as f64)).collect();
    let meta = &mut record.metadata;
    meta.insert(EMBEDDING_KEY.to_string(), Value::Array(values));
    meta.insert(
        EMBEDDING_MODEL_KEY.to_string(),
        Value::from(vector.model_name().to_string()),
    );
    meta.insert(EMBEDDING_DIM_KEY.to_string(), Value::from(vector.dim() as u64));
    meta.insert(EMBEDDING_KIND_KEY.to_string(), Value::from(MODEL_EMBEDDING_KIND));
    meta.insert(EMBEDDING_HASH_KEY.to_string(), Value::from(record.hash.clone()));
}
