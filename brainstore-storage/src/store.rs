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

//! Brain Store
//!
//! Durable record storage under a single root directory:
//!
//! ```text
//! <root>/
//!   records.log            append-only log of accepted writes
//!   snapshot.log           compacted state, rewritten at every checkpoint
//!   snapshots/<version>.log  immutable copy of each checkpoint
//!   changelog.log          audit trail (checkpoint, rollback, retention)
//!   usage.log              access log, folded in and cleared at checkpoint
//! ```
//!
//! The logical state is `snapshot.log` followed by `records.log`. Checkpoint
//! reconciles it by content hash, latest `updated_at` winning, so a crash
//! between any two file operations is healed by the next checkpoint.

use crate::changelog::{
    ChangelogEntry, ChangelogEvent, ChangelogProbe, UsageEntry, UsageSummary,
};
use crate::config::{StoreConfig, HOT_USAGE_THRESHOLD, WARM_USAGE_THRESHOLD};
use crate::error::StoreResult;
use crate::jsonl;
use brainstore_core::{time, Priority, Record};
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

pub const RECORDS_FILE: &str = "records.log";
pub const SNAPSHOT_FILE: &str = "snapshot.log";
pub const SNAPSHOTS_DIR: &str = "snapshots";
pub const CHANGELOG_FILE: &str = "changelog.log";
pub const USAGE_FILE: &str = "usage.log";

/// File-name prefix of log archives made by rollback
pub const ARCHIVE_PREFIX: &str = "records_before_rollback_";

/// Metadata key holding the cumulative access count
pub const USAGE_COUNT_KEY: &str = "usage_count";

/// Metadata key holding the latest access time
pub const LAST_ACCESSED_KEY: &str = "last_accessed_at";

const SNAPSHOT_EXT: &str = "log";

/// Longest staleness threshold honoured, in days
const MAX_DECAY_DAYS: f64 = 36_500.0;

/// Result of [`BrainStore::write`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Record appended to `records.log`
    Appended,
    /// Hash seen recently; nothing written
    Deduplicated,
}

/// Result of [`BrainStore::checkpoint`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub version: String,
    /// Records in the new snapshot
    pub snapshot_count: usize,
    /// Records read before deduplication
    pub compacted_from: usize,
}

/// Point-in-time counters for a store root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub snapshot_records: usize,
    pub pending_records: usize,
    pub pending_usage: usize,
    pub versions: usize,
    pub archives: usize,
}

/// State guarded by the writer lock
struct WriteState {
    /// Recently written hashes; `None` when write dedupe is off
    recent: Option<LruCache<String, ()>>,
}

impl WriteState {
    fn forget_recent(&mut self) {
        if let Some(recent) = self.recent.as_mut() {
            recent.clear();
        }
    }
}

/// Append-only record store with checkpoint and rollback
///
/// Writers in this process are serialized by an internal lock. Separate
/// processes must not share a root.
pub struct BrainStore {
    root: PathBuf,
    config: StoreConfig,
    state: Mutex<WriteState>,
}

impl BrainStore {
    /// Open or create a store at `root`
    pub fn open(root: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(SNAPSHOTS_DIR))?;

        let mut recent = if config.dedupe_on_write {
            NonZeroUsize::new(config.dedupe_recent_max).map(LruCache::new)
        } else {
            None
        };

        if let Some(cache) = recent.as_mut() {
            let pending: Vec<Record> = jsonl::read_lines(&root.join(RECORDS_FILE))?;
            for record in pending {
                cache.put(record.hash, ());
            }
            debug!(warmed = cache.len(), "Write dedupe window warmed from log");
        }

        info!(
            root = %root.display(),
            max_snapshots = config.max_snapshots,
            dedupe_on_write = recent.is_some(),
            "Opened brain store"
        );

        Ok(Self {
            root,
            config,
            state: Mutex::new(WriteState { recent }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn records_path(&self) -> PathBuf {
        self.root.join(RECORDS_FILE)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(SNAPSHOT_FILE)
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    pub fn changelog_path(&self) -> PathBuf {
        self.root.join(CHANGELOG_FILE)
    }

    pub fn usage_path(&self) -> PathBuf {
        self.root.join(USAGE_FILE)
    }

    /// Path of a versioned snapshot
    pub fn version_path(&self, version: &str) -> PathBuf {
        self.snapshots_dir()
            .join(format!("{}.{}", version, SNAPSHOT_EXT))
    }

    /// Append a record to the log.
    ///
    /// The hash is refreshed first. When write dedupe is on and the hash is in
    /// the recent window, nothing is written.
    pub fn write(&self, record: &mut Record) -> StoreResult<WriteOutcome> {
        record.refresh_hash();

        let mut state = self.state.lock();
        if let Some(recent) = state.recent.as_mut() {
            if recent.get(&record.hash).is_some() {
                debug!(record_id = %record.id, hash = %record.hash, "Duplicate write skipped");
                return Ok(WriteOutcome::Deduplicated);
            }
        }

        self.append_locked(&mut state, record)?;
        Ok(WriteOutcome::Appended)
    }

    /// Append a record regardless of the dedupe window.
    ///
    /// For rewrites that keep the hash but change metadata, such as attaching
    /// an embedding. The newer copy wins at the next checkpoint.
    pub fn append(&self, record: &mut Record) -> StoreResult<()> {
        record.refresh_hash();
        let mut state = self.state.lock();
        self.append_locked(&mut state, record)
    }

    fn append_locked(&self, state: &mut WriteState, record: &Record) -> StoreResult<()> {
        let line = jsonl::encode_lines(std::iter::once(record))?;
        jsonl::append(&self.records_path(), &line, self.config.fsync_writes)?;

        if let Some(recent) = state.recent.as_mut() {
            recent.put(record.hash.clone(), ());
        }

        debug!(record_id = %record.id, hash = %record.hash, kind = %record.kind, "Record appended");
        Ok(())
    }

    /// Logical state: snapshot entries, then log entries
    pub fn read_all(&self) -> StoreResult<Vec<Record>> {
        let mut records: Vec<Record> = jsonl::read_lines(&self.snapshot_path())?;
        records.extend(jsonl::read_lines::<Record>(&self.records_path())?);
        Ok(records)
    }

    /// Record one access per id. Failures are logged and swallowed.
    pub fn log_usage<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ts = time::now();
        let entries: Vec<UsageEntry> = ids
            .into_iter()
            .map(|id| UsageEntry {
                id: id.as_ref().to_string(),
                ts,
            })
            .collect();
        if entries.is_empty() {
            return;
        }

        let _guard = self.state.lock();
        let result = jsonl::encode_lines(&entries)
            .and_then(|bytes| jsonl::append(&self.usage_path(), &bytes, false));
        if let Err(e) = result {
            warn!(error = %e, count = entries.len(), "Failed to log usage");
        }
    }

    /// Compact the log into a new snapshot version.
    ///
    /// Deduplicates by hash (latest `updated_at` wins), folds the usage log
    /// into priority and decay, ages stale records, writes `snapshot.log` and
    /// `snapshots/<version>.log`, empties the log, then applies retention.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn checkpoint(&self) -> StoreResult<CheckpointSummary> {
        let mut state = self.state.lock();
        let now = time::now();
        let fsync = self.config.fsync_writes;

        let mut records: Vec<Record> = jsonl::read_lines(&self.snapshot_path())?;
        let pending: Vec<Record> = jsonl::read_lines(&self.records_path())?;
        let log_entries = pending.len();
        records.extend(pending);
        let compacted_from = records.len();

        let mut records = latest_by_hash(records);
        let (usage, touched) = self.fold_usage(&mut records, now)?;
        let aged = self.age_stale(&mut records, &touched, now);

        // Promotion changes a hash input
        let rehashed = records
            .iter_mut()
            .fold(false, |changed, r| r.refresh_hash() || changed);
        if rehashed {
            records = latest_by_hash(records);
        }

        let version = self.next_version(now)?;
        let bytes = jsonl::encode_lines(&records)?;
        jsonl::write_atomic(&self.snapshot_path(), &bytes, fsync)?;
        jsonl::write_atomic(&self.version_path(&version), &bytes, fsync)?;
        jsonl::truncate(&self.records_path(), fsync)?;
        jsonl::truncate(&self.usage_path(), fsync)?;
        state.forget_recent();

        let deleted = self.enforce_retention()?;

        let summary = CheckpointSummary {
            version: version.clone(),
            snapshot_count: records.len(),
            compacted_from,
        };

        self.append_changelog(
            &version,
            now,
            ChangelogEvent::Checkpoint {
                snapshot_count: summary.snapshot_count,
                compacted_from,
                log_entries,
                usage,
                aged,
                retention_deleted: deleted.len(),
            },
        )?;
        if !deleted.is_empty() {
            self.append_changelog(&version, now, ChangelogEvent::RetentionCleanup { deleted })?;
        }

        info!(
            version = %summary.version,
            snapshot_count = summary.snapshot_count,
            compacted_from,
            log_entries,
            promoted = usage.promoted,
            aged,
            "Checkpoint complete"
        );

        Ok(summary)
    }

    /// Make `version` the active snapshot.
    ///
    /// Returns `Ok(false)` when no such version exists. Pending log entries are
    /// moved to `snapshots/records_before_rollback_<ts>.log`.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn rollback(&self, version: &str) -> StoreResult<bool> {
        if !is_version_name(version) {
            warn!(version, "Rejected rollback target");
            return Ok(false);
        }

        let source = self.version_path(version);
        if !source.is_file() {
            warn!(version, "Unknown snapshot version");
            return Ok(false);
        }

        let mut state = self.state.lock();
        let now = time::now();
        let fsync = self.config.fsync_writes;

        let archived = if jsonl::is_non_empty(&self.records_path()) {
            let name = format!(
                "{}{}.{}",
                ARCHIVE_PREFIX,
                time::version_string(&now),
                SNAPSHOT_EXT
            );
            fs::rename(self.records_path(), self.snapshots_dir().join(&name))?;
            jsonl::truncate(&self.records_path(), fsync)?;
            Some(name)
        } else {
            None
        };

        let bytes = fs::read(&source)?;
        jsonl::write_atomic(&self.snapshot_path(), &bytes, fsync)?;
        state.forget_recent();

        self.append_changelog(
            version,
            now,
            ChangelogEvent::Rollback {
                archived: archived.clone(),
            },
        )?;

        info!(version, archived = ?archived, "Rolled back");
        Ok(true)
    }

    /// Known versions, newest first.
    ///
    /// Live snapshot files plus every version named in the changelog, minus
    /// versions removed by retention.
    pub fn list_versions(&self) -> StoreResult<Vec<String>> {
        let live = self.snapshot_versions()?;

        let mut logged = BTreeSet::new();
        let mut retired = HashSet::new();
        for probe in jsonl::read_lines::<ChangelogProbe>(&self.changelog_path())? {
            if probe.event.as_deref() == Some("retention_cleanup") {
                retired.extend(probe.deleted.unwrap_or_default());
            }
            if let Some(version) = probe.version {
                logged.insert(version);
            }
        }

        let mut versions = live;
        versions.extend(logged.into_iter().filter(|v| !retired.contains(v)));
        Ok(versions.into_iter().rev().collect())
    }

    /// Parsed changelog, oldest first
    pub fn changelog(&self) -> StoreResult<Vec<ChangelogEntry>> {
        jsonl::read_lines(&self.changelog_path())
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let (versions, archives) = self.scan_snapshots()?;
        Ok(StoreStats {
            snapshot_records: jsonl::read_lines::<Record>(&self.snapshot_path())?.len(),
            pending_records: jsonl::read_lines::<Record>(&self.records_path())?.len(),
            pending_usage: jsonl::read_lines::<UsageEntry>(&self.usage_path())?.len(),
            versions: versions.len(),
            archives,
        })
    }

    /// Fold `usage.log` into the records.
    ///
    /// Returns the counters and the ids that were touched.
    fn fold_usage(
        &self,
        records: &mut [Record],
        now: DateTime<Utc>,
    ) -> StoreResult<(UsageSummary, HashSet<String>)> {
        let mut counts: HashMap<String, (u64, DateTime<Utc>)> = HashMap::new();
        for entry in jsonl::read_lines::<UsageEntry>(&self.usage_path())? {
            let slot = counts.entry(entry.id).or_insert((0, entry.ts));
            slot.0 += 1;
            slot.1 = slot.1.max(entry.ts);
        }

        let mut summary = UsageSummary::default();
        let mut touched = HashSet::new();
        if counts.is_empty() {
            return Ok((summary, touched));
        }

        for record in records.iter_mut() {
            let Some(&(count, last_access)) = counts.get(&record.id) else {
                continue;
            };

            let total = record.metadata_u64(USAGE_COUNT_KEY).unwrap_or(0) + count;
            if promote(record, total) {
                summary.promoted += 1;
            }

            let raised = usage_decay(record.decay, total);
            if raised > record.decay {
                summary.decay_raised += 1;
            }
            record.decay = raised;

            record
                .metadata
                .insert(USAGE_COUNT_KEY.to_string(), Value::from(total));
            record.metadata.insert(
                LAST_ACCESSED_KEY.to_string(),
                Value::from(time::format_timestamp(&last_access)),
            );
            record.touch(now);

            summary.records_touched += 1;
            touched.insert(record.id.clone());
        }

        Ok((summary, touched))
    }

    /// Lower the decay of records not updated within the policy window
    fn age_stale(
        &self,
        records: &mut [Record],
        touched: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> usize {
        let policy = self.config.decay;
        if !policy.enabled() {
            return 0;
        }

        let window_secs = policy.after_days.min(MAX_DECAY_DAYS) * 86_400.0;
        let cutoff = now - Duration::seconds(window_secs as i64);

        let mut aged = 0;
        for record in records.iter_mut() {
            if touched.contains(&record.id) || record.updated_at >= cutoff {
                continue;
            }
            if let Some(next) = policy.apply(record.decay) {
                record.decay = next;
                aged += 1;
            }
        }
        aged
    }

    /// A version string strictly newer than every live snapshot
    fn next_version(&self, now: DateTime<Utc>) -> StoreResult<String> {
        let mut ts = now;
        if let Some(latest) = self
            .snapshot_versions()?
            .iter()
            .next_back()
            .and_then(|v| time::parse_version(v))
        {
            if ts <= latest {
                ts = latest + Duration::microseconds(1);
            }
        }

        let mut version = time::version_string(&ts);
        while self.version_path(&version).exists() {
            ts = ts + Duration::microseconds(1);
            version = time::version_string(&ts);
        }
        Ok(version)
    }

    /// Delete the oldest versioned snapshots beyond `max_snapshots`
    fn enforce_retention(&self) -> StoreResult<Vec<String>> {
        let versions = self.snapshot_versions()?;
        let keep = self.config.max_snapshots.max(1);
        let excess = versions.len().saturating_sub(keep);

        let mut deleted = Vec::new();
        for version in versions.into_iter().take(excess) {
            match fs::remove_file(self.version_path(&version)) {
                Ok(()) => deleted.push(version),
                Err(e) => {
                    warn!(version = %version, error = %e, "Failed to delete expired snapshot");
                }
            }
        }

        if !deleted.is_empty() {
            info!(deleted = deleted.len(), keep, "Retention removed old snapshots");
        }
        Ok(deleted)
    }

    /// Live versioned snapshots, oldest first
    fn snapshot_versions(&self) -> StoreResult<BTreeSet<String>> {
        Ok(self.scan_snapshots()?.0)
    }

    /// Versioned snapshot stems and the number of rollback archives
    fn scan_snapshots(&self) -> StoreResult<(BTreeSet<String>, usize)> {
        let entries = match fs::read_dir(self.snapshots_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((BTreeSet::new(), 0)),
            Err(e) => return Err(e.into()),
        };

        let mut versions = BTreeSet::new();
        let mut archives = 0;
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with(ARCHIVE_PREFIX) {
                archives += 1;
            } else {
                versions.insert(stem.to_string());
            }
        }
        Ok((versions, archives))
    }

    fn append_changelog(
        &self,
        version: &str,
        ts: DateTime<Utc>,
        event: ChangelogEvent,
    ) -> StoreResult<()> {
        let entry = ChangelogEntry {
            ts,
            version: version.to_string(),
            event,
        };
        debug!(event = entry.event.name(), version, "Changelog event");
        let line = jsonl::encode_lines(std::iter::once(&entry))?;
        jsonl::append(&self.changelog_path(), &line, self.config.fsync_writes)
    }
}

/// Keep the newest record per hash.
///
/// Order of first appearance is preserved. On equal `updated_at` the later
/// entry wins, since log entries follow the snapshot.
pub fn latest_by_hash(records: Vec<Record>) -> Vec<Record> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut kept: Vec<Record> = Vec::with_capacity(records.len());

    for record in records {
        match index.get(&record.hash) {
            Some(&i) => {
                if record.updated_at >= kept[i].updated_at {
                    kept[i] = record;
                }
            }
            None => {
                index.insert(record.hash.clone(), kept.len());
                kept.push(record);
            }
        }
    }
    kept
}

/// Apply usage promotion. Returns true when the priority changed.
fn promote(record: &mut Record, usage_count: u64) -> bool {
    let before = record.priority;
    if usage_count >= HOT_USAGE_THRESHOLD {
        record.priority = Priority::P0;
    } else if usage_count >= WARM_USAGE_THRESHOLD && record.priority == Priority::P2 {
        record.priority = Priority::P1;
    }
    record.priority != before
}

/// Popularity floor for decay: `min(1, max(decay, 0.2 + 0.05 * min(n, 10)))`
fn usage_decay(decay: f64, usage_count: u64) -> f64 {
    let floor = 0.2 + 0.05 * usage_count.min(10) as f64;
    decay.max(floor).min(1.0)
}

/// Plain version names only: no separators, traversal or archive names
fn is_version_name(version: &str) -> bool {
    !version.is_empty()
        && !version.contains(['/', '\\', '\0'])
        && !version.contains("..")
        && !version.starts_with(ARCHIVE_PREFIX)
}
