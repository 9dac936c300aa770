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

//! Record types
//!
//! A record is the atomic unit of long-term memory: a fact, strategy, plan or
//! guide together with its priority, provenance and retrieval weight.
//!
//! Identity is content-addressed. The fingerprint covers `kind`, `priority`,
//! `source`, `tags` and `content`, never `id`, timestamps or `metadata`, so the
//! same knowledge written twice has the same hash no matter when or with which
//! embedding it was written.

use crate::error::{RecordError, RecordResult};
use crate::time::{self, parse_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Default kind for records built without one
pub const DEFAULT_KIND: &str = "fact";

/// Default source label
pub const DEFAULT_SOURCE: &str = "unknown";

/// Separator between fingerprint fields (ASCII unit separator)
const FIELD_SEPARATOR: char = '\u{1f}';

/// Record priority tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    /// Critical knowledge, always surfaced first
    P0,
    /// Regular knowledge
    P1,
    /// Low-value or speculative knowledge
    P2,
}

impl Priority {
    /// All tiers, highest first
    pub const ALL: [Priority; 3] = [Priority::P0, Priority::P1, Priority::P2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
        }
    }

    /// Coerce an arbitrary JSON value to a priority.
    ///
    /// Non-string values are stringified first, so `1` fails while `"p1"` passes.
    pub fn from_value(value: &Value) -> RecordResult<Self> {
        match value {
            Value::String(s) => s.parse(),
            other => other.to_string().parse(),
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::P1
    }
}

impl FromStr for Priority {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P0" => Ok(Priority::P0),
            "P1" => Ok(Priority::P1),
            "P2" => Ok(Priority::P2),
            _ => Err(RecordError::InvalidPriority(s.to_string())),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted unit of knowledge
///
/// Serializes to the one-object-per-line JSON schema used by every log file.
/// Deserialization goes through [`RecordDraft`], so anything read back from
/// disk is validated and normalized exactly like caller input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordDraft")]
pub struct Record {
    /// Opaque identifier
    pub id: String,
    /// Free-text category ("fact", "strategy", "plan", "guide", ...)
    pub kind: String,
    /// Priority tier
    pub priority: Priority,
    /// Origin label
    pub source: String,
    /// Creation time
    #[serde(with = "time::iso")]
    pub created_at: DateTime<Utc>,
    /// Last logical update
    #[serde(with = "time::iso")]
    pub updated_at: DateTime<Utc>,
    /// Lowercased, trimmed, deduplicated, sorted
    pub tags: Vec<String>,
    /// Advisory time-to-live, not enforced by the engine
    pub ttl_seconds: Option<i64>,
    /// Retrieval weight multiplier
    pub decay: f64,
    /// Text body
    pub content: String,
    /// Open key/value map; may carry a cached embedding and its provenance
    pub metadata: Map<String, Value>,
    /// Content fingerprint
    pub hash: String,
}

impl Record {
    /// Create a record with defaults for everything but the content
    pub fn new(content: impl Into<String>) -> Self {
        let now = time::now();
        let mut record = Self {
            id: new_record_id(),
            kind: DEFAULT_KIND.to_string(),
            priority: Priority::default(),
            source: DEFAULT_SOURCE.to_string(),
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
            ttl_seconds: None,
            decay: 1.0,
            content: content.into(),
            metadata: Map::new(),
            hash: String::new(),
        };
        record.refresh_hash();
        record
    }

    /// Build a record from its map form, filling defaults and validating.
    pub fn from_draft(draft: RecordDraft) -> RecordResult<Self> {
        let priority = match &draft.priority {
            None | Some(Value::Null) => Priority::default(),
            Some(value) => Priority::from_value(value)?,
        };

        let now = time::now();
        let created_at = match draft.created_at.as_deref() {
            Some(raw) => parse_timestamp(raw)?,
            None => now,
        };
        let updated_at = match draft.updated_at.as_deref() {
            Some(raw) => parse_timestamp(raw)?,
            None => created_at,
        };

        let mut record = Self {
            id: draft
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(new_record_id),
            kind: draft.kind.unwrap_or_else(|| DEFAULT_KIND.to_string()),
            priority,
            source: draft.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            created_at,
            updated_at,
            tags: normalize_tags(draft.tags.unwrap_or_default()),
            ttl_seconds: draft.ttl_seconds,
            decay: draft.decay.filter(|d| d.is_finite()).unwrap_or(1.0),
            content: draft.content.unwrap_or_default(),
            metadata: draft.metadata.unwrap_or_default(),
            hash: String::new(),
        };

        match draft.hash.filter(|h| !h.is_empty()) {
            Some(hash) => record.hash = hash,
            None => {
                record.refresh_hash();
            }
        }

        Ok(record)
    }

    /// Build a record from an arbitrary JSON map
    pub fn from_value(value: Value) -> RecordResult<Self> {
        let draft: RecordDraft = serde_json::from_value(value)?;
        Self::from_draft(draft)
    }

    /// JSON map form
    pub fn to_value(&self) -> Value {
        // Serializing plain strings, numbers and maps cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Fingerprint of the identity-bearing fields.
    pub fn compute_hash(&self) -> String {
        fingerprint(&self.kind, self.priority, &self.source, &self.tags, &self.content)
    }

    /// Recompute and store the hash. Returns true when it changed.
    pub fn refresh_hash(&mut self) -> bool {
        let hash = self.compute_hash();
        let changed = hash != self.hash;
        self.hash = hash;
        changed
    }

    /// Replace tags with their normalized form
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = normalize_tags(tags);
    }

    /// Stamp `updated_at`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Whether the metadata carries an embedding vector
    pub fn has_embedding(&self) -> bool {
        matches!(self.metadata.get(EMBEDDING_KEY), Some(Value::Array(v)) if !v.is_empty())
    }

    /// Stored embedding, if present and numeric
    pub fn embedding(&self) -> Option<Vec<f32>> {
        let values = self.metadata.get(EMBEDDING_KEY)?.as_array()?;
        if values.is_empty() {
            return None;
        }
        values
            .iter()
            .map(|v| v.as_f64().map(|x| x as f32))
            .collect()
    }

    /// Integer metadata value, if present
    pub fn metadata_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(Value::as_u64)
    }
}

impl TryFrom<RecordDraft> for Record {
    type Error = RecordError;

    fn try_from(draft: RecordDraft) -> Result<Self, Self::Error> {
        Record::from_draft(draft)
    }
}

/// Metadata key holding the cached embedding vector
pub const EMBEDDING_KEY: &str = "embedding";

/// Metadata key holding the embedding model name
pub const EMBEDDING_MODEL_KEY: &str = "embedding_model";

/// Metadata key holding the embedding dimension
pub const EMBEDDING_DIM_KEY: &str = "embedding_dim";

/// Metadata key holding the embedding backend kind
pub const EMBEDDING_KIND_KEY: &str = "embedding_kind";

/// Metadata key holding the record hash the embedding was computed for
pub const EMBEDDING_HASH_KEY: &str = "embedding_hash";

/// Map form of a record: every field optional, unknown keys ignored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decay: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl RecordDraft {
    /// Start a draft with the given content
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Set the id
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the kind
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Set the priority
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(Value::String(priority.as_str().to_string()));
        self
    }

    /// Set a raw priority value, validated at build time
    pub fn raw_priority(mut self, priority: impl Into<Value>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    /// Set the source
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set tags
    pub fn tags(mut self, tags: Vec<impl Into<String>>) -> Self {
        self.tags = Some(tags.into_iter().map(|t| t.into()).collect());
        self
    }

    /// Set the advisory TTL
    pub fn ttl_seconds(mut self, ttl: i64) -> Self {
        self.ttl_seconds = Some(ttl);
        self
    }

    /// Set the decay weight
    pub fn decay(mut self, decay: f64) -> Self {
        self.decay = Some(decay);
        self
    }

    /// Set `updated_at` from an ISO-8601 string
    pub fn updated_at(mut self, ts: impl Into<String>) -> Self {
        self.updated_at = Some(ts.into());
        self
    }

    /// Set `created_at` from an ISO-8601 string
    pub fn created_at(mut self, ts: impl Into<String>) -> Self {
        self.created_at = Some(ts.into());
        self
    }

    /// Insert a metadata entry
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Validate and build
    pub fn build(self) -> RecordResult<Record> {
        Record::from_draft(self)
    }
}

impl From<Record> for RecordDraft {
    fn from(record: Record) -> Self {
        Self {
            id: Some(record.id),
            kind: Some(record.kind),
            priority: Some(Value::String(record.priority.as_str().to_string())),
            source: Some(record.source),
            created_at: Some(time::format_timestamp(&record.created_at)),
            updated_at: Some(time::format_timestamp(&record.updated_at)),
            tags: Some(record.tags),
            ttl_seconds: record.ttl_seconds,
            decay: Some(record.decay),
            content: Some(record.content),
            metadata: Some(record.metadata),
            hash: Some(record.hash),
        }
    }
}

/// Lowercase, trim, drop empties, deduplicate and sort
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tags.into_iter()
        .map(|t| t.into().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Content fingerprint over the identity-bearing fields.
///
/// `tags` must already be normalized.
pub fn fingerprint(
    kind: &str,
    priority: Priority,
    source: &str,
    tags: &[String],
    content: &str,
) -> String {
    let mut sorted: Vec<&str> = tags.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let payload = [
        kind.to_lowercase(),
        priority.as_str().to_string(),
        source.to_lowercase(),
        sorted.join(" "),
        content.trim().to_string(),
    ]
    .join(&FIELD_SEPARATOR.to_string());

    hex::encode(blake3::hash(payload.as_bytes()).as_bytes())
}

fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scenario_a() -> Record {
        RecordDraft::new("Use jsonl for append-only storage")
            .kind("fact")
            .priority(Priority::P1)
            .source("t")
            .tags(vec!["Python", "Memory"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_tag_order_and_case_do_not_change_hash() {
        let a = scenario_a();
        let b = RecordDraft::new("Use jsonl for append-only storage")
            .kind("fact")
            .priority(Priority::P1)
            .source("t")
            .tags(vec!["memory", "python"])
            .build()
            .unwrap();

        assert_eq!(a.tags, vec!["memory", "python"]);
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_hash_ignores_id_timestamps_and_metadata() {
        let a = scenario_a();
        let b = RecordDraft::new("  Use jsonl for append-only storage  ")
            .id("other-id")
            .kind("FACT")
            .priority(Priority::P1)
            .source("T")
            .tags(vec!["memory", "python", "python"])
            .updated_at("2020-01-01T00:00:00Z")
            .meta("embedding", json!([0.1, 0.2]))
            .build()
            .unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_hash_covers_priority_and_content() {
        let a = scenario_a();
        let mut b = a.clone();
        b.priority = Priority::P0;
        assert_ne!(a.hash, b.compute_hash());

        let mut c = a.clone();
        c.content.push_str(" and snapshots");
        assert!(c.refresh_hash());
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_invalid_priority() {
        let err = RecordDraft::new("x").raw_priority("P7").build().unwrap_err();
        assert_eq!(err, RecordError::InvalidPriority("P7".to_string()));

        let err = RecordDraft::new("x").raw_priority(1).build().unwrap_err();
        assert_eq!(err, RecordError::InvalidPriority("1".to_string()));

        let ok = RecordDraft::new("x").raw_priority("p2").build().unwrap();
        assert_eq!(ok.priority, Priority::P2);
    }

    #[test]
    fn test_from_value_defaults() {
        let record = Record::from_value(json!({
            "content": "remember the milk",
            "tags": [" Errands ", "errands", ""],
        }))
        .unwrap();

        assert!(!record.id.is_empty());
        assert_eq!(record.kind, DEFAULT_KIND);
        assert_eq!(record.priority, Priority::P1);
        assert_eq!(record.tags, vec!["errands"]);
        assert_eq!(record.decay, 1.0);
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(record.hash, record.compute_hash());
    }

    #[test]
    fn test_missing_updated_at_falls_back_to_created_at() {
        let record = Record::from_value(json!({
            "content": "old note",
            "created_at": "2020-05-01 08:00:00",
        }))
        .unwrap();
        assert_eq!(time::format_timestamp(&record.updated_at), "2020-05-01T08:00:00.000000Z");
    }

    #[test]
    fn test_stored_hash_is_kept() {
        let record = Record::from_value(json!({"content": "x", "hash": "abc"})).unwrap();
        assert_eq!(record.hash, "abc");
    }

    #[test]
    fn test_line_roundtrip() {
        let mut record = scenario_a();
        record.metadata.insert("embedding".into(), json!([0.5, 0.5]));
        record.ttl_seconds = Some(3600);

        let line = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&line).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.embedding(), Some(vec![0.5, 0.5]));
        assert!(back.has_embedding());
    }

    #[test]
    fn test_draft_from_record_keeps_identity() {
        let record = scenario_a();
        let rebuilt = RecordDraft::from(record.clone()).build().unwrap();
        assert_eq!(rebuilt, record);
    }
}
