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

//! Record validation errors

use thiserror::Error;

/// Result type for record construction
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors raised while building or decoding a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Priority outside of P0 | P1 | P2
    #[error("Invalid priority: {0:?} (expected one of P0, P1, P2)")]
    InvalidPriority(String),

    /// Timestamp that is not ISO-8601
    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// Map form could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RecordError {
    fn from(e: serde_json::Error) -> Self {
        RecordError::Serialization(e.to_string())
    }
}
