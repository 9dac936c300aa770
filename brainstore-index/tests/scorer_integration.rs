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

//! Integration tests for the scorers

use brainstore_core::{Priority, Record, RecordDraft};
use brainstore_index::{
    EmbeddingBackend, EmbeddingError, RecallMode, RelevanceScorer, Scorer, ScorerType,
};
use proptest::prelude::*;
use std::sync::Arc;

fn record(kind: &str, priority: Priority, decay: f64, content: &str) -> Record {
    RecordDraft::new(content)
        .kind(kind)
        .priority(priority)
        .decay(decay)
        .build()
        .unwrap()
}

/// "python list" against a python fact clamps to 1.0
#[test]
fn test_keyword_python_list() {
    let scorer = Scorer::build(ScorerType::Keyword, "", 384, None);
    let record = RecordDraft::new("Python lists are great")
        .kind("fact")
        .raw_priority("P1")
        .tags(vec!["python"])
        .decay(1.0)
        .build()
        .unwrap();

    assert_eq!(scorer.base_similarity("python list", &record), 1.0);
    assert_eq!(scorer.score("python list", &record, RecallMode::Facts), 1.0);
}

/// Priority and decay order otherwise-equal records
#[test]
fn test_priority_and_decay_ordering() {
    let scorer = Scorer::build(ScorerType::Keyword, "", 384, None);
    let query = "retention canary";

    let p0 = record("guide", Priority::P0, 1.0, "retention window for snapshots");
    let p1 = record("guide", Priority::P1, 1.0, "retention window for snapshots");
    let p2 = record("guide", Priority::P2, 1.0, "retention window for snapshots");
    let stale = record("guide", Priority::P1, 0.25, "retention window for snapshots");
    let dead = record("guide", Priority::P1, 0.0, "retention window for snapshots");

    let s = |r: &Record| scorer.score(query, r, RecallMode::General);
    assert!(s(&p0) > s(&p1));
    assert!(s(&p1) > s(&p2));
    assert!((s(&p0) - 0.6).abs() < 1e-9);
    assert!((s(&p2) - 0.4).abs() < 1e-9);
    assert!((s(&stale) - 0.25).abs() < 1e-9);
    assert!(s(&dead) > 0.0);
}

/// Strategy records earn the bonus only in strategy mode
#[test]
fn test_mode_bonus_by_kind() {
    let scorer = Scorer::build(ScorerType::Keyword, "", 384, None);
    let plan = record("plan", Priority::P2, 1.0, "rollout in three phases");

    let general = scorer.score("rollout canary", &plan, RecallMode::General);
    let strategy = scorer.score("rollout canary", &plan, RecallMode::Strategy);
    let facts = scorer.score("rollout canary", &plan, RecallMode::Facts);

    assert!((strategy - general - 0.1 * 0.8).abs() < 1e-9);
    assert_eq!(general, facts);
}

struct FailingBackend;

impl EmbeddingBackend for FailingBackend {
    fn model_name(&self) -> &str {
        "broken"
    }

    fn dimension(&self) -> usize {
        32
    }

    fn encode(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Generation("offline".into()))
    }
}

/// A failing model degrades to hashed vectors instead of failing the score
#[test]
fn test_vector_scorer_survives_backend_failure() {
    let scorer = Scorer::build(ScorerType::Vector, "broken", 32, Some(Arc::new(FailingBackend)));
    assert!(scorer.model_backed().is_some());

    let record = record("fact", Priority::P1, 1.0, "hashed fallback keeps working");
    let score = scorer.score("hashed fallback keeps working", &record, RecallMode::Facts);
    assert!(score > 0.0 && score <= 1.0);
}

/// Without an injected backend or model feature, "vector" still scores
#[cfg(not(feature = "fastembed-embeddings"))]
#[test]
fn test_vector_without_model_degrades() {
    let scorer = Scorer::build(ScorerType::Vector, "all-MiniLM-L6-v2", 64, None);
    assert!(scorer.model_backed().is_none());
    assert_eq!(scorer.as_vector().unwrap().dim(), 64);
}

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![Just(Priority::P0), Just(Priority::P1), Just(Priority::P2)]
}

proptest! {
    #[test]
    fn prop_scores_are_bounded(
        query in "[a-zA-Z ,.!?-]{0,40}",
        content in "[a-zA-Z ,.!?-]{0,80}",
        kind in prop_oneof![Just("fact"), Just("plan"), Just("guide"), Just("strategy")],
        priority in arb_priority(),
        decay in -2.0f64..5.0,
        mode in prop_oneof![Just(RecallMode::Facts), Just(RecallMode::Strategy), Just(RecallMode::General)],
    ) {
        let record = record(kind, priority, decay, &content);
        for scorer_type in [ScorerType::Keyword, ScorerType::HashedVector] {
            let scorer = Scorer::build(scorer_type, "", 48, None);
            let score = scorer.score(&query, &record, mode);
            prop_assert!((0.0..=1.0).contains(&score), "{} scored {}", scorer_type, score);
        }
    }
}
