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

//! Brainstore Storage
//!
//! File-based durable engine for brainstore records: an append-only log,
//! checkpoint compaction into versioned snapshots, rollback, retention and an
//! audit changelog. No external database is involved.

pub mod changelog;
pub mod config;
pub mod error;
pub mod jsonl;
pub mod store;

pub use changelog::{ChangelogEntry, ChangelogEvent, UsageEntry, UsageSummary};
pub use config::{DecayPolicy, StoreConfig, HOT_USAGE_THRESHOLD, WARM_USAGE_THRESHOLD};
pub use error::{StoreError, StoreResult};
pub use store::{
    latest_by_hash, BrainStore, CheckpointSummary, StoreStats, WriteOutcome, ARCHIVE_PREFIX,
    LAST_ACCESSED_KEY, USAGE_COUNT_KEY,
};
