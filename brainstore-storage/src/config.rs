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

//! Store configuration

use serde::{Deserialize, Serialize};

/// Usage count at which a record is forced to P0
pub const HOT_USAGE_THRESHOLD: u64 = 10;

/// Usage count at which a P2 record is promoted to P1
pub const WARM_USAGE_THRESHOLD: u64 = 3;

/// Knobs consumed by [`BrainStore`](crate::BrainStore)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Versioned snapshots kept by retention (at least 1)
    pub max_snapshots: usize,
    /// Skip appends whose hash was seen recently
    pub dedupe_on_write: bool,
    /// Size of the recent-hash window; 0 disables it
    pub dedupe_recent_max: usize,
    /// Sync every acknowledged append and rewrite to disk
    pub fsync_writes: bool,
    pub decay: DecayPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_snapshots: 10,
            dedupe_on_write: true,
            dedupe_recent_max: 1000,
            fsync_writes: true,
            decay: DecayPolicy::default(),
        }
    }
}

/// Age-based decay applied at checkpoint
///
/// A record not updated for more than `after_days` loses `step` of decay per
/// checkpoint, never going below `floor`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayPolicy {
    /// Staleness threshold in days; 0 disables aging
    pub after_days: f64,
    pub floor: f64,
    pub step: f64,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self {
            after_days: 30.0,
            floor: 0.1,
            step: 0.1,
        }
    }
}

impl DecayPolicy {
    pub fn enabled(&self) -> bool {
        self.after_days > 0.0 && self.step > 0.0
    }

    /// Decay after one aging step, or `None` when nothing changes
    pub fn apply(&self, decay: f64) -> Option<f64> {
        if decay <= self.floor {
            return None;
        }
        let next = (decay - self.step).max(self.floor);
        (next < decay).then_some(next)
    }
}
