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

//! Integration tests for checkpoint, retention and rollback

use brainstore_core::{Priority, Record, RecordDraft};
use brainstore_storage::{
    BrainStore, ChangelogEvent, DecayPolicy, StoreConfig, WriteOutcome, ARCHIVE_PREFIX,
    LAST_ACCESSED_KEY, USAGE_COUNT_KEY,
};
use std::fs;
use tempfile::tempdir;

fn config() -> StoreConfig {
    StoreConfig {
        fsync_writes: false,
        ..StoreConfig::default()
    }
}

fn open(dir: &std::path::Path, config: StoreConfig) -> BrainStore {
    BrainStore::open(dir, config).unwrap()
}

fn fact(content: &str) -> Record {
    RecordDraft::new(content).kind("fact").build().unwrap()
}

fn snapshot_files(store: &BrainStore) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(store.snapshots_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| !n.starts_with(ARCHIVE_PREFIX))
        .collect();
    names.sort();
    names
}

#[test]
fn test_write_then_read_back() {
    let dir = tempdir().unwrap();
    let store = open(dir.path(), config());

    let mut record = RecordDraft::new("Use jsonl for append-only storage")
        .kind("fact")
        .source("t")
        .tags(vec!["Python", "Memory"])
        .meta("note", "kept")
        .build()
        .unwrap();
    store.write(&mut record).unwrap();

    let all = store.read_all().unwrap();
    assert_eq!(all, vec![record]);
}

#[test]
fn test_checkpoint_keeps_latest_duplicate() {
    let dir = tempdir().unwrap();
    let store = open(
        dir.path(),
        StoreConfig {
            dedupe_on_write: false,
            ..config()
        },
    );

    let mut newer = RecordDraft::new("same knowledge")
        .id("newer")
        .updated_at("2030-01-02T00:00:00Z")
        .build()
        .unwrap();
    let mut older = RecordDraft::new("same knowledge")
        .id("older")
        .updated_at("2030-01-01T00:00:00Z")
        .build()
        .unwrap();
    // Newest first in file order; the timestamp decides
    store.write(&mut newer).unwrap();
    store.write(&mut older).unwrap();

    let summary = store.checkpoint().unwrap();
    assert_eq!(summary.compacted_from, 2);
    assert_eq!(summary.snapshot_count, 1);

    let all = store.read_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "newer");
}

#[test]
fn test_checkpoint_empties_log_and_copies_snapshot() {
    let dir = tempdir().unwrap();
    let store = open(dir.path(), config());

    store.write(&mut fact("alpha")).unwrap();
    store.write(&mut fact("beta")).unwrap();
    let summary = store.checkpoint().unwrap();

    assert_eq!(fs::read(store.records_path()).unwrap().len(), 0);
    assert_eq!(
        fs::read(store.snapshot_path()).unwrap(),
        fs::read(store.version_path(&summary.version)).unwrap()
    );
    assert_eq!(store.read_all().unwrap().len(), 2);

    let stats = store.stats().unwrap();
    assert_eq!(stats.snapshot_records, 2);
    assert_eq!(stats.pending_records, 0);
    assert_eq!(stats.versions, 1);
}

#[test]
fn test_checkpoint_forgets_write_dedupe_window() {
    let dir = tempdir().unwrap();
    let store = open(dir.path(), config());

    store.write(&mut fact("repeat me")).unwrap();
    store.checkpoint().unwrap();
    assert_eq!(
        store.write(&mut fact("repeat me")).unwrap(),
        WriteOutcome::Appended
    );

    // The next checkpoint still collapses them
    let summary = store.checkpoint().unwrap();
    assert_eq!(summary.compacted_from, 2);
    assert_eq!(summary.snapshot_count, 1);
}

#[test]
fn test_retention_keeps_most_recent() {
    let dir = tempdir().unwrap();
    let store = open(
        dir.path(),
        StoreConfig {
            max_snapshots: 2,
            ..config()
        },
    );

    let mut versions = Vec::new();
    for round in 0..3 {
        store.write(&mut fact(&format!("round {}", round))).unwrap();
        versions.push(store.checkpoint().unwrap().version);
    }

    let files = snapshot_files(&store);
    assert_eq!(
        files,
        vec![format!("{}.log", versions[1]), format!("{}.log", versions[2])]
    );

    let listed = store.list_versions().unwrap();
    assert_eq!(listed, vec![versions[2].clone(), versions[1].clone()]);
    assert!(!listed.contains(&versions[0]));

    let cleanup: Vec<_> = store
        .changelog()
        .unwrap()
        .into_iter()
        .filter_map(|e| match e.event {
            ChangelogEvent::RetentionCleanup { deleted } => Some(deleted),
            _ => None,
        })
        .collect();
    assert_eq!(cleanup, vec![vec![versions[0].clone()]]);
}

#[test]
fn test_rollback_restores_snapshot_and_archives_log() {
    let dir = tempdir().unwrap();
    let store = open(dir.path(), config());

    let mut first = fact("first record");
    store.write(&mut first).unwrap();
    let v1 = store.checkpoint().unwrap().version;

    store.write(&mut fact("second record")).unwrap();
    store.write(&mut fact("third record")).unwrap();
    store.checkpoint().unwrap();
    store.write(&mut fact("pending record")).unwrap();

    assert!(store.rollback(&v1).unwrap());

    let all = store.read_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].content, "first record");
    assert_eq!(
        fs::read(store.snapshot_path()).unwrap(),
        fs::read(store.version_path(&v1)).unwrap()
    );

    let archives: Vec<_> = fs::read_dir(store.snapshots_dir())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(ARCHIVE_PREFIX)
        })
        .collect();
    assert_eq!(archives.len(), 1);
    assert!(fs::read_to_string(&archives[0])
        .unwrap()
        .contains("pending record"));

    // Archives are not versions
    assert_eq!(store.list_versions().unwrap().len(), 2);
    assert_eq!(store.stats().unwrap().archives, 1);

    let last = store.changelog().unwrap().pop().unwrap();
    assert_eq!(last.version, v1);
    assert!(matches!(last.event, ChangelogEvent::Rollback { archived: Some(_) }));
}

#[test]
fn test_rollback_scenario_with_second_record() {
    let dir = tempdir().unwrap();
    let store = open(dir.path(), config());

    store.write(&mut fact("only the first")).unwrap();
    let v1 = store.checkpoint().unwrap().version;
    store.write(&mut fact("a distinguishable second")).unwrap();

    assert!(store.rollback(&v1).unwrap());
    let contents: Vec<_> = store
        .read_all()
        .unwrap()
        .into_iter()
        .map(|r| r.content)
        .collect();
    assert_eq!(contents, vec!["only the first"]);

    // Content discarded by rollback can be written again
    assert_eq!(
        store.write(&mut fact("a distinguishable second")).unwrap(),
        WriteOutcome::Appended
    );
}

#[test]
fn test_rollback_unknown_or_unsafe_version() {
    let dir = tempdir().unwrap();
    let store = open(dir.path(), config());
    store.write(&mut fact("x")).unwrap();

    assert!(!store.rollback("20000101T000000000000Z").unwrap());
    assert!(!store.rollback("../records").unwrap());
    assert!(!store.rollback("").unwrap());
    assert_eq!(store.read_all().unwrap().len(), 1);
}

#[test]
fn test_usage_promotes_and_raises_decay() {
    let dir = tempdir().unwrap();
    let store = open(dir.path(), config());

    let mut warm = RecordDraft::new("warm record")
        .id("warm")
        .priority(Priority::P2)
        .decay(0.1)
        .build()
        .unwrap();
    let mut hot = RecordDraft::new("hot record")
        .id("hot")
        .priority(Priority::P2)
        .build()
        .unwrap();
    let mut cold = RecordDraft::new("cold record")
        .id("cold")
        .priority(Priority::P2)
        .build()
        .unwrap();
    store.write(&mut warm).unwrap();
    store.write(&mut hot).unwrap();
    store.write(&mut cold).unwrap();

    store.log_usage(vec!["warm"; 3]);
    store.log_usage(vec!["hot"; 10]);
    assert_eq!(store.stats().unwrap().pending_usage, 13);

    store.checkpoint().unwrap();
    assert_eq!(store.stats().unwrap().pending_usage, 0);

    let all = store.read_all().unwrap();
    let get = |id: &str| all.iter().find(|r| r.id == id).unwrap().clone();

    let warm = get("warm");
    assert_eq!(warm.priority, Priority::P1);
    assert!((warm.decay - 0.35).abs() < 1e-9);
    assert_eq!(warm.metadata_u64(USAGE_COUNT_KEY), Some(3));
    assert!(warm.metadata.contains_key(LAST_ACCESSED_KEY));
    assert_eq!(warm.hash, warm.compute_hash());

    let hot = get("hot");
    assert_eq!(hot.priority, Priority::P0);
    assert_eq!(hot.decay, 1.0);

    assert_eq!(get("cold").priority, Priority::P2);

    match &store.changelog().unwrap()[0].event {
        ChangelogEvent::Checkpoint { usage, .. } => {
            assert_eq!(usage.records_touched, 2);
            assert_eq!(usage.promoted, 2);
            assert_eq!(usage.decay_raised, 1);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_usage_accumulates_across_checkpoints() {
    let dir = tempdir().unwrap();
    let store = open(dir.path(), config());

    let mut record = RecordDraft::new("steadily used")
        .id("steady")
        .priority(Priority::P2)
        .build()
        .unwrap();
    store.write(&mut record).unwrap();

    store.log_usage(["steady", "steady"]);
    store.checkpoint().unwrap();
    assert_eq!(store.read_all().unwrap()[0].priority, Priority::P2);

    store.log_usage(["steady"]);
    store.checkpoint().unwrap();
    let record = &store.read_all().unwrap()[0];
    assert_eq!(record.priority, Priority::P1);
    assert_eq!(record.metadata_u64(USAGE_COUNT_KEY), Some(3));
}

#[test]
fn test_age_decay_lowers_stale_records() {
    let dir = tempdir().unwrap();
    let store = open(
        dir.path(),
        StoreConfig {
            decay: DecayPolicy {
                after_days: 1.0,
                floor: 0.3,
                step: 0.5,
            },
            ..config()
        },
    );

    let mut stale = RecordDraft::new("ancient wisdom")
        .updated_at("2001-01-01T00:00:00Z")
        .build()
        .unwrap();
    let mut fresh = fact("fresh insight");
    store.write(&mut stale).unwrap();
    store.write(&mut fresh).unwrap();

    store.checkpoint().unwrap();
    let all = store.read_all().unwrap();
    let stale_after = all.iter().find(|r| r.content == "ancient wisdom").unwrap();
    let fresh_after = all.iter().find(|r| r.content == "fresh insight").unwrap();
    assert!((stale_after.decay - 0.5).abs() < 1e-9);
    assert_eq!(fresh_after.decay, 1.0);

    store.checkpoint().unwrap();
    let all = store.read_all().unwrap();
    let stale_after = all.iter().find(|r| r.content == "ancient wisdom").unwrap();
    assert!((stale_after.decay - 0.3).abs() < 1e-9);
}

#[test]
fn test_malformed_lines_are_skipped() {
    let dir = tempdir().unwrap();
    let store = open(dir.path(), config());
    store.write(&mut fact("good line")).unwrap();

    let mut raw = fs::read(store.records_path()).unwrap();
    raw.extend_from_slice(b"{not json}\n{\"content\":\"bad\",\"priority\":\"P7\"}\n");
    fs::write(store.records_path(), raw).unwrap();

    let all = store.read_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(store.checkpoint().unwrap().snapshot_count, 1);
}

#[test]
fn test_list_versions_includes_changelog_versions() {
    let dir = tempdir().unwrap();
    let store = open(dir.path(), config());
    store.write(&mut fact("a")).unwrap();
    let v1 = store.checkpoint().unwrap().version;

    fs::remove_file(store.version_path(&v1)).unwrap();
    assert_eq!(store.list_versions().unwrap(), vec![v1]);
}

#[test]
fn test_decay_survives_log_and_snapshot_exactly() {
    let dir = tempdir().unwrap();
    let store = open(dir.path(), config());

    let mut record = RecordDraft::new("x")
        .decay(0.49189098151481603)
        .build()
        .unwrap();
    store.write(&mut record).unwrap();
    assert_eq!(store.read_all().unwrap(), vec![record.clone()]);

    store.checkpoint().unwrap();
    let restored = store.read_all().unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].decay.to_bits(), record.decay.to_bits());
}

/// A crash after `snapshot.log` is rewritten but before the logs are
/// truncated leaves both generations on disk; the next checkpoint heals it.
#[test]
fn test_checkpoint_heals_interrupted_truncation() {
    let dir = tempdir().unwrap();
    let store = open(dir.path(), config());

    let mut alpha = RecordDraft::new("alpha")
        .kind("fact")
        .priority(Priority::P2)
        .build()
        .unwrap();
    let mut beta = RecordDraft::new("beta")
        .kind("fact")
        .priority(Priority::P2)
        .build()
        .unwrap();
    store.write(&mut alpha).unwrap();
    store.write(&mut beta).unwrap();
    store.log_usage([alpha.id.as_str(), alpha.id.as_str(), alpha.id.as_str()]);

    let pending_records = fs::read(store.records_path()).unwrap();
    let pending_usage = fs::read(store.usage_path()).unwrap();

    store.checkpoint().unwrap();

    fs::write(store.records_path(), &pending_records).unwrap();
    fs::write(store.usage_path(), &pending_usage).unwrap();

    let summary = store.checkpoint().unwrap();
    assert_eq!(summary.snapshot_count, 2);
    assert_eq!(summary.compacted_from, 4);

    let records = store.read_all().unwrap();
    assert_eq!(records.len(), 2);
    let mut hashes: Vec<_> = records.iter().map(|r| r.hash.clone()).collect();
    hashes.sort();
    hashes.dedup();
    assert_eq!(hashes.len(), 2);

    let healed_alpha = records.iter().find(|r| r.content == "alpha").unwrap();
    assert_eq!(healed_alpha.id, alpha.id);
    assert_eq!(healed_alpha.priority, Priority::P1);
    let usage = healed_alpha.metadata_u64(USAGE_COUNT_KEY).unwrap();
    assert!((3..=6).contains(&usage), "usage applied more than twice: {}", usage);
    assert_eq!(healed_alpha.hash, healed_alpha.compute_hash());

    let healed_beta = records.iter().find(|r| r.content == "beta").unwrap();
    assert_eq!(healed_beta.priority, Priority::P2);
    assert!(healed_beta.metadata_u64(USAGE_COUNT_KEY).is_none());
    assert_eq!(store.stats().unwrap().pending_records, 0);
}
