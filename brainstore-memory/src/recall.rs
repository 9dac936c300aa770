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

//! Recall selection
//!
//! Scoring happens in the engine; this module decides which scored records
//! are returned: flat top-k or a per-priority tier budget, then optional
//! collapsing of results that share a hash.

use brainstore_core::{Priority, Record};
use brainstore_index::RecallMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decimal places kept on returned scores
const SCORE_DECIMALS: i32 = 4;

/// A recall request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallQuery {
    /// Caller-owned query text
    pub query: String,

    #[serde(default)]
    pub mode: RecallMode,

    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Minimum composite score (0.0 - 1.0)
    #[serde(default)]
    pub min_score: f64,

    /// Only consider these priorities
    #[serde(default)]
    pub priorities: Option<Vec<Priority>>,
}

fn default_limit() -> usize {
    5
}

impl RecallQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: RecallMode::default(),
            limit: default_limit(),
            min_score: 0.0,
            priorities: None,
        }
    }

    pub fn mode(mut self, mode: RecallMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn priorities(mut self, priorities: Vec<Priority>) -> Self {
        self.priorities = Some(priorities);
        self
    }

    /// Whether `priority` passes the filter
    pub fn admits(&self, priority: Priority) -> bool {
        self.priorities
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&priority))
    }
}

/// A recalled record with its score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: Record,
    pub score: f64,
}

impl ScoredRecord {
    pub fn new(record: Record, score: f64) -> Self {
        Self {
            record,
            score: round_score(score),
        }
    }
}

/// Round to the precision returned to callers
pub fn round_score(score: f64) -> f64 {
    let factor = 10f64.powi(SCORE_DECIMALS);
    (score * factor).round() / factor
}

/// Highest scores first, ties keep input order
fn sort_by_score(candidates: &mut [(Record, f64)]) {
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
}

/// Top `limit` by score
pub fn select_flat(mut candidates: Vec<(Record, f64)>, limit: usize) -> Vec<(Record, f64)> {
    sort_by_score(&mut candidates);
    candidates.truncate(limit);
    candidates
}

/// Fill the budget tier by tier.
///
/// Tiers are visited in `order`; each contributes its best records up to its
/// cap from `limits` (same index), or up to the remaining budget when no cap
/// is configured. Priorities missing from `order` are never returned.
pub fn select_tiered(
    candidates: Vec<(Record, f64)>,
    limit: usize,
    order: &[Priority],
    limits: &[usize],
) -> Vec<(Record, f64)> {
    let mut tiers: HashMap<Priority, Vec<(Record, f64)>> = HashMap::new();
    for candidate in candidates {
        tiers.entry(candidate.0.priority).or_default().push(candidate);
    }

    let mut selected = Vec::with_capacity(limit);
    for (index, priority) in order.iter().enumerate() {
        let remaining = limit.saturating_sub(selected.len());
        if remaining == 0 {
            break;
        }
        // A repeated tier has already been drained
        let Some(mut tier) = tiers.remove(priority) else {
            continue;
        };
        sort_by_score(&mut tier);
        let take = limits.get(index).map_or(remaining, |cap| (*cap).min(remaining));
        selected.extend(tier.into_iter().take(take));
    }
    selected
}

/// Collapse results that share a hash (or id when the hash is empty).
///
/// The first occurrence keeps its position. A later duplicate replaces it when
/// it carries a stored embedding and the kept one does not, or, with equal
/// embedding status, when its `updated_at` is strictly newer.
pub fn dedupe_results(results: Vec<(Record, f64)>) -> Vec<(Record, f64)> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(results.len());
    let mut kept: Vec<(Record, f64)> = Vec::with_capacity(results.len());

    for item in results {
        let key = if item.0.hash.is_empty() {
            item.0.id.clone()
        } else {
            item.0.hash.clone()
        };

        match index.get(&key) {
            Some(&i) => {
                if supersedes(&item.0, &kept[i].0) {
                    kept[i] = item;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(item);
            }
        }
    }
    kept
}

fn supersedes(candidate: &Record, kept: &Record) -> bool {
    match (candidate.has_embedding(), kept.has_embedding()) {
        (true, false) => true,
        (false, true) => false,
        _ => candidate.updated_at > kept.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainstore_core::{RecordDraft, EMBEDDING_KEY};

    fn scored(content: &str, priority: Priority, score: f64) -> (Record, f64) {
        let record = RecordDraft::new(content)
            .priority(priority)
            .build()
            .unwrap();
        (record, score)
    }

    #[test]
    fn test_flat_orders_and_truncates() {
        let picked = select_flat(
            vec![
                scored("a", Priority::P1, 0.2),
                scored("b", Priority::P1, 0.9),
                scored("c", Priority::P1, 0.5),
            ],
            2,
        );
        let contents: Vec<_> = picked.iter().map(|(r, _)| r.content.as_str()).collect();
        assert_eq!(contents, vec!["b", "c"]);
    }

    #[test]
    fn test_tiered_respects_caps_and_order() {
        let candidates = vec![
            scored("p2-high", Priority::P2, 0.99),
            scored("p0-a", Priority::P0, 0.5),
            scored("p0-b", Priority::P0, 0.6),
            scored("p1-a", Priority::P1, 0.4),
            scored("p1-b", Priority::P1, 0.7),
            scored("p1-c", Priority::P1, 0.8),
        ];
        let picked = select_tiered(candidates, 10, &Priority::ALL, &[1, 2, 1]);
        let contents: Vec<_> = picked.iter().map(|(r, _)| r.content.as_str()).collect();
        assert_eq!(contents, vec!["p0-b", "p1-c", "p1-b", "p2-high"]);
    }

    #[test]
    fn test_tiered_stops_at_limit_and_uses_remaining_budget() {
        let candidates = vec![
            scored("p0", Priority::P0, 0.1),
            scored("p1-a", Priority::P1, 0.3),
            scored("p1-b", Priority::P1, 0.2),
            scored("p1-c", Priority::P1, 0.1),
            scored("p2", Priority::P2, 0.9),
        ];
        let picked = select_tiered(candidates, 3, &[Priority::P0, Priority::P1], &[1]);
        let contents: Vec<_> = picked.iter().map(|(r, _)| r.content.as_str()).collect();
        assert_eq!(contents, vec!["p0", "p1-a", "p1-b"]);
    }

    #[test]
    fn test_dedupe_prefers_embedding_then_recency() {
        let plain = RecordDraft::new("same")
            .id("plain")
            .updated_at("2025-01-03T00:00:00Z")
            .build()
            .unwrap();
        let embedded = RecordDraft::new("same")
            .id("embedded")
            .updated_at("2025-01-01T00:00:00Z")
            .meta(EMBEDDING_KEY, vec![0.1, 0.2])
            .build()
            .unwrap();
        let newer_embedded = RecordDraft::new("same")
            .id("newer-embedded")
            .updated_at("2025-01-02T00:00:00Z")
            .meta(EMBEDDING_KEY, vec![0.1, 0.2])
            .build()
            .unwrap();
        let other = RecordDraft::new("other").id("other").build().unwrap();

        let out = dedupe_results(vec![
            (plain, 0.9),
            (other, 0.8),
            (embedded, 0.7),
            (newer_embedded, 0.6),
        ]);
        let ids: Vec<_> = out.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["newer-embedded", "other"]);
    }

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(0.123456), 0.1235);
        assert_eq!(round_score(1.0), 1.0);
    }

    #[test]
    fn test_query_filter() {
        let query = RecallQuery::new("q").priorities(vec![Priority::P0]);
        assert!(query.admits(Priority::P0));
        assert!(!query.admits(Priority::P2));
        assert!(RecallQuery::new("q").admits(Priority::P2));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn candidates(specs: &[(usize, f64, usize)]) -> Vec<(Record, f64)> {
            specs
                .iter()
                .map(|&(p, score, n)| {
                    scored(&format!("item {}", n), Priority::ALL[p], score)
                })
                .collect()
        }

        proptest! {
            #[test]
            fn prop_tiered_respects_limit_and_caps(
                specs in prop::collection::vec((0usize..3, 0.0f64..1.0, 0usize..6), 0..30),
                limit in 0usize..10,
                caps in prop::collection::vec(0usize..4, 0..4),
            ) {
                let picked = select_tiered(candidates(&specs), limit, &Priority::ALL, &caps);
                prop_assert!(picked.len() <= limit);
                for (index, priority) in Priority::ALL.iter().enumerate() {
                    if let Some(cap) = caps.get(index) {
                        let taken = picked.iter().filter(|(r, _)| r.priority == *priority).count();
                        prop_assert!(taken <= *cap);
                    }
                }
            }

            #[test]
            fn prop_dedupe_leaves_unique_hashes(
                specs in prop::collection::vec((0usize..3, 0.0f64..1.0, 0usize..4), 0..30),
            ) {
                let kept = dedupe_results(candidates(&specs));
                let mut hashes: Vec<_> = kept.iter().map(|(r, _)| r.hash.clone()).collect();
                let total = hashes.len();
                hashes.sort();
                hashes.dedup();
                prop_assert_eq!(hashes.len(), total);
            }
        }
    }
}
