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

//! Timestamp helpers
//!
//! Every timestamp that reaches disk is UTC, RFC 3339, microsecond precision,
//! `Z` suffix. With a fixed width the string order equals chronological order,
//! which is what checkpoint reconciliation and snapshot versions rely on.

use crate::error::{RecordError, RecordResult};
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, SubsecRound, TimeZone, Utc};

/// Version string layout, e.g. `20250301T101500123456Z`.
const VERSION_FORMAT: &str = "%Y%m%dT%H%M%S%6fZ";

/// Current UTC time truncated to the on-disk precision.
///
/// Truncation keeps in-memory records equal to their re-read form.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Format a timestamp in the canonical sortable form.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an ISO-8601 timestamp. Zone-less values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> RecordResult<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc).trunc_subsecs(6));
    }

    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| Utc.from_utc_datetime(&naive).trunc_subsecs(6))
        .map_err(|_| RecordError::InvalidTimestamp(raw.to_string()))
}

/// Snapshot version string for a point in time.
pub fn version_string(ts: &DateTime<Utc>) -> String {
    ts.format(VERSION_FORMAT).to_string()
}

/// Point in time encoded by a version string, if it is one.
pub fn parse_version(version: &str) -> Option<DateTime<Utc>> {
    let body = version.strip_suffix('Z')?;
    if body.len() != 21 || !body.is_char_boundary(15) {
        return None;
    }
    let (secs, micros) = body.split_at(15);
    if !micros.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(secs, "%Y%m%dT%H%M%S").ok()?;
    let micros: i64 = micros.parse().ok()?;
    Some(Utc.from_utc_datetime(&naive) + Duration::microseconds(micros))
}

/// Serde adapter for `DateTime<Utc>` fields in the canonical form.
pub mod iso {
    use super::{format_timestamp, parse_timestamp};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}
