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

//! Brain configuration
//!
//! Loaded with priority: environment > TOML file > defaults.
//!
//! Supported environment variables:
//! - BRAINSTORE_ENABLED
//! - BRAINSTORE_BASE_PATH
//! - BRAINSTORE_SCORER_TYPE: keyword | vector | sentence-transformers | hashed-vector | bow
//! - BRAINSTORE_EMBEDDING_MODEL, BRAINSTORE_EMBEDDING_DIM
//! - BRAINSTORE_MAX_SNAPSHOTS
//! - BRAINSTORE_DEDUPE_ON_WRITE, BRAINSTORE_DEDUPE_RECENT_MAX
//! - BRAINSTORE_FSYNC_WRITES
//! - BRAINSTORE_TRACK_USAGE
//! - BRAINSTORE_DECAY_ON_CHECKPOINT_DAYS, BRAINSTORE_DECAY_FLOOR, BRAINSTORE_DECAY_STEP
//! - BRAINSTORE_NOVELTY_ENABLED, BRAINSTORE_NOVELTY_MIN_SIMILARITY,
//!   BRAINSTORE_NOVELTY_WINDOW_SECONDS
//! - BRAINSTORE_TIERED_RECALL, BRAINSTORE_TIERED_ORDER (e.g. `P0,P1,P2`),
//!   BRAINSTORE_TIERED_LIMITS (e.g. `3,2,1`)
//! - BRAINSTORE_DEDUPE_ON_RECALL

use crate::error::{MemoryError, MemoryResult};
use brainstore_core::Priority;
use brainstore_index::{ScorerType, DEFAULT_EMBEDDING_DIM};
use brainstore_storage::{DecayPolicy, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const ENV_PREFIX: &str = "BRAINSTORE_";

/// Configuration for a [`Brain`](crate::Brain)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    /// Master switch; a disabled brain answers every call with an empty result
    pub enabled: bool,

    /// Storage root
    pub base_path: PathBuf,

    pub scorer_type: ScorerType,

    /// Model tried for the vector scorer
    pub embedding_model: String,

    /// Dimension of hashed embeddings when no model is loaded
    pub embedding_dim: usize,

    /// Versioned snapshots kept by retention
    pub max_snapshots: usize,

    pub dedupe_on_write: bool,
    pub dedupe_recent_max: usize,
    pub fsync_writes: bool,

    /// Log an access for every recalled record
    pub track_usage: bool,

    /// Age after which checkpoints lower decay; 0 disables aging
    pub decay_on_checkpoint_days: f64,
    pub decay_floor: f64,
    pub decay_step: f64,

    /// Reject writes too close to a recent record
    pub novelty_enabled: bool,
    /// Similarity at or above which a write is rejected; 0 checks hashes only
    pub novelty_min_similarity: f64,
    /// How far back the novelty gate looks
    pub novelty_window_seconds: u64,

    /// Allocate the recall budget per priority tier
    pub tiered_recall: bool,
    pub tiered_order: Vec<Priority>,
    /// Per-tier caps, aligned with `tiered_order`
    pub tiered_limits: Vec<usize>,

    /// Collapse recalled records sharing a hash
    pub dedupe_on_recall: bool,
}

impl Default for BrainConfig {
    fn default() -> Self {
        let store = StoreConfig::default();
        Self {
            enabled: true,
            base_path: default_base_path(),
            scorer_type: ScorerType::Keyword,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            max_snapshots: store.max_snapshots,
            dedupe_on_write: store.dedupe_on_write,
            dedupe_recent_max: store.dedupe_recent_max,
            fsync_writes: store.fsync_writes,
            track_usage: true,
            decay_on_checkpoint_days: store.decay.after_days,
            decay_floor: store.decay.floor,
            decay_step: store.decay.step,
            novelty_enabled: false,
            novelty_min_similarity: 0.9,
            novelty_window_seconds: 3600,
            tiered_recall: false,
            tiered_order: Priority::ALL.to_vec(),
            tiered_limits: vec![3, 2, 1],
            dedupe_on_recall: true,
        }
    }
}

fn default_base_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("brainstore")
}

impl BrainConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> MemoryResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults overridden by `BRAINSTORE_*` environment variables
    pub fn from_env() -> Self {
        Self::merge_with_env(Self::default())
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> MemoryResult<Self> {
        let config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        Ok(Self::merge_with_env(config))
    }

    /// Override fields whose environment variable is set
    pub fn merge_with_env(mut config: Self) -> Self {
        config.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok());
        config
    }

    /// Apply overrides from a lookup keyed by the variable name without prefix.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        if let Some(v) = get("ENABLED") {
            set_parsed(&mut self.enabled, "ENABLED", parse_bool(&v));
        }
        if let Some(v) = get("BASE_PATH") {
            self.base_path = PathBuf::from(v);
        }
        if let Some(v) = get("SCORER_TYPE") {
            set_parsed(&mut self.scorer_type, "SCORER_TYPE", v.parse().ok());
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding_model = v;
        }
        if let Some(v) = get("EMBEDDING_DIM") {
            set_parsed(&mut self.embedding_dim, "EMBEDDING_DIM", v.parse().ok());
        }
        if let Some(v) = get("MAX_SNAPSHOTS") {
            set_parsed(&mut self.max_snapshots, "MAX_SNAPSHOTS", v.parse().ok());
        }
        if let Some(v) = get("DEDUPE_ON_WRITE") {
            set_parsed(&mut self.dedupe_on_write, "DEDUPE_ON_WRITE", parse_bool(&v));
        }
        if let Some(v) = get("DEDUPE_RECENT_MAX") {
            set_parsed(&mut self.dedupe_recent_max, "DEDUPE_RECENT_MAX", v.parse().ok());
        }
        if let Some(v) = get("FSYNC_WRITES") {
            set_parsed(&mut self.fsync_writes, "FSYNC_WRITES", parse_bool(&v));
        }
        if let Some(v) = get("TRACK_USAGE") {
            set_parsed(&mut self.track_usage, "TRACK_USAGE", parse_bool(&v));
        }
        if let Some(v) = get("DECAY_ON_CHECKPOINT_DAYS") {
            set_parsed(
                &mut self.decay_on_checkpoint_days,
                "DECAY_ON_CHECKPOINT_DAYS",
                v.parse().ok(),
            );
        }
        if let Some(v) = get("DECAY_FLOOR") {
            set_parsed(&mut self.decay_floor, "DECAY_FLOOR", v.parse().ok());
        }
        if let Some(v) = get("DECAY_STEP") {
            set_parsed(&mut self.decay_step, "DECAY_STEP", v.parse().ok());
        }
        if let Some(v) = get("NOVELTY_ENABLED") {
            set_parsed(&mut self.novelty_enabled, "NOVELTY_ENABLED", parse_bool(&v));
        }
        if let Some(v) = get("NOVELTY_MIN_SIMILARITY") {
            set_parsed(
                &mut self.novelty_min_similarity,
                "NOVELTY_MIN_SIMILARITY",
                v.parse().ok(),
            );
        }
        if let Some(v) = get("NOVELTY_WINDOW_SECONDS") {
            set_parsed(
                &mut self.novelty_window_seconds,
                "NOVELTY_WINDOW_SECONDS",
                v.parse().ok(),
            );
        }
        if let Some(v) = get("TIERED_RECALL") {
            set_parsed(&mut self.tiered_recall, "TIERED_RECALL", parse_bool(&v));
        }
        if let Some(v) = get("TIERED_ORDER") {
            set_parsed(&mut self.tiered_order, "TIERED_ORDER", parse_list(&v));
        }
        if let Some(v) = get("TIERED_LIMITS") {
            set_parsed(&mut self.tiered_limits, "TIERED_LIMITS", parse_list(&v));
        }
        if let Some(v) = get("DEDUPE_ON_RECALL") {
            set_parsed(&mut self.dedupe_on_recall, "DEDUPE_ON_RECALL", parse_bool(&v));
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> MemoryResult<()> {
        if self.max_snapshots < 1 {
            return Err(MemoryError::Config("max_snapshots must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.novelty_min_similarity) {
            return Err(MemoryError::Config(format!(
                "novelty_min_similarity must be within [0, 1], got {}",
                self.novelty_min_similarity
            )));
        }
        if !(0.0..=1.0).contains(&self.decay_floor) {
            return Err(MemoryError::Config(format!(
                "decay_floor must be within [0, 1], got {}",
                self.decay_floor
            )));
        }
        if !(self.decay_step >= 0.0) {
            return Err(MemoryError::Config(format!(
                "decay_step must not be negative, got {}",
                self.decay_step
            )));
        }
        if !self.decay_on_checkpoint_days.is_finite() {
            return Err(MemoryError::Config(
                "decay_on_checkpoint_days must be finite".into(),
            ));
        }
        if self.embedding_dim == 0 {
            return Err(MemoryError::Config("embedding_dim must be positive".into()));
        }
        Ok(())
    }

    /// Storage knobs for the engine
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_snapshots: self.max_snapshots,
            dedupe_on_write: self.dedupe_on_write,
            dedupe_recent_max: self.dedupe_recent_max,
            fsync_writes: self.fsync_writes,
            decay: DecayPolicy {
                after_days: self.decay_on_checkpoint_days,
                floor: self.decay_floor,
                step: self.decay_step,
            },
        }
    }

    /// Cap for the tier at `index` in `tiered_order`, if configured
    pub fn tier_limit(&self, index: usize) -> Option<usize> {
        self.tiered_limits.get(index).copied()
    }
}

fn set_parsed<T>(field: &mut T, key: &str, parsed: Option<T>) {
    match parsed {
        Some(value) => *field = value,
        None => tracing::warn!("Ignoring invalid value for {}{}", ENV_PREFIX, key),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_list<T: FromStr>(raw: &str) -> Option<Vec<T>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect()
}
