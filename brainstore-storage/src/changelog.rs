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

//! Audit trail and access log entries
//!
//! `changelog.log` lines look like
//! `{"ts": "...", "event": "checkpoint", "version": "...", ...}` and
//! `usage.log` lines like `{"id": "...", "ts": "..."}`.

use brainstore_core::time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of `changelog.log`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    #[serde(with = "time::iso")]
    pub ts: DateTime<Utc>,
    /// Snapshot version the event refers to
    pub version: String,
    #[serde(flatten)]
    pub event: ChangelogEvent,
}

/// Event-specific fields, tagged by `event`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangelogEvent {
    Checkpoint {
        /// Records in the new snapshot
        snapshot_count: usize,
        /// Records read before deduplication
        compacted_from: usize,
        /// Entries folded in from `records.log`
        log_entries: usize,
        usage: UsageSummary,
        /// Records lowered by age decay
        aged: usize,
        /// Versions removed by retention
        retention_deleted: usize,
    },
    Rollback {
        /// Archive file holding the discarded log, if there was one
        archived: Option<String>,
    },
    RetentionCleanup {
        deleted: Vec<String>,
    },
}

impl ChangelogEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChangelogEvent::Checkpoint { .. } => "checkpoint",
            ChangelogEvent::Rollback { .. } => "rollback",
            ChangelogEvent::RetentionCleanup { .. } => "retention_cleanup",
        }
    }
}

/// Effect of folding `usage.log` into a checkpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub records_touched: usize,
    pub promoted: usize,
    pub decay_raised: usize,
}

/// One line of `usage.log`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub id: String,
    #[serde(with = "time::iso")]
    pub ts: DateTime<Utc>,
}

/// Loose view of a changelog line, tolerant of unknown event kinds
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ChangelogProbe {
    pub event: Option<String>,
    pub version: Option<String>,
    pub deleted: Option<Vec<String>>,
}
