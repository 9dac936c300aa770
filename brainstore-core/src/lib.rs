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

//! Brainstore Core
//!
//! The record data model shared by every brainstore layer: priorities,
//! tag normalization, content fingerprinting and the canonical timestamp form.

pub mod error;
pub mod record;
pub mod time;

pub use error::{RecordError, RecordResult};
pub use record::{
    fingerprint, normalize_tags, Priority, Record, RecordDraft, DEFAULT_KIND, DEFAULT_SOURCE,
    EMBEDDING_DIM_KEY, EMBEDDING_HASH_KEY, EMBEDDING_KEY, EMBEDDING_KIND_KEY,
    EMBEDDING_MODEL_KEY,
};
