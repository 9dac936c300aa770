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

//! Recall modes

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// What the caller is recalling; records of the expected kinds get a bonus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallMode {
    /// Facts and factual notes
    #[default]
    Facts,
    /// Strategies and plans
    Strategy,
    /// Anything else; no kind bonus
    General,
}

impl RecallMode {
    /// Kinds that earn the mode bonus
    pub fn expected_kinds(&self) -> &'static [&'static str] {
        match self {
            RecallMode::Facts => &["fact", "facts"],
            RecallMode::Strategy => &["strategy", "plan"],
            RecallMode::General => &[],
        }
    }

    /// Whether `kind` belongs to this mode's kind-set
    pub fn matches_kind(&self, kind: &str) -> bool {
        let kind = kind.trim().to_lowercase();
        self.expected_kinds().contains(&kind.as_str())
    }

    /// Mode used when comparing a record against its own kind
    pub fn for_kind(kind: &str) -> Self {
        if RecallMode::Strategy.matches_kind(kind) {
            RecallMode::Strategy
        } else {
            RecallMode::Facts
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecallMode::Facts => "facts",
            RecallMode::Strategy => "strategy",
            RecallMode::General => "general",
        }
    }
}

impl FromStr for RecallMode {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "facts" | "fact" => RecallMode::Facts,
            "strategy" | "strategies" | "plan" | "plans" => RecallMode::Strategy,
            _ => RecallMode::General,
        })
    }
}

impl fmt::Display for RecallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
