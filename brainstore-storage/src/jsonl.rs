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

//! Line-oriented JSON files
//!
//! Every log under a store root holds one JSON object per line. Readers treat
//! a missing file as empty and skip lines that do not decode.

use crate::error::StoreResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Decode every well-formed line of `path`
pub fn read_lines<T: DeserializeOwned>(path: &Path) -> StoreResult<Vec<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut items = Vec::new();
    for (lineno, line) in bytes.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<T>(line) {
            Ok(item) => items.push(item),
            Err(e) => {
                debug!(path = %path.display(), line = lineno + 1, error = %e, "Skipping malformed line");
            }
        }
    }
    Ok(items)
}

/// Encode items as newline-terminated JSON lines
pub fn encode_lines<'a, T, I>(items: I) -> StoreResult<Vec<u8>>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut buf = Vec::new();
    for item in items {
        serde_json::to_writer(&mut buf, item)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

/// Append pre-encoded lines, optionally syncing to disk
pub fn append(path: &Path, bytes: &[u8], fsync: bool) -> StoreResult<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    if fsync {
        file.sync_data()?;
    }
    Ok(())
}

/// Replace `path` with `bytes` through a `.new` sibling and a rename
pub fn write_atomic(path: &Path, bytes: &[u8], fsync: bool) -> StoreResult<()> {
    let tmp = sibling_tmp(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.flush()?;
        if fsync {
            file.sync_all()?;
        }
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Truncate `path` to empty, creating it if needed
pub fn truncate(path: &Path, fsync: bool) -> StoreResult<()> {
    let file = File::create(path)?;
    if fsync {
        file.sync_all()?;
    }
    Ok(())
}

/// Whether `path` exists with at least one byte
pub fn is_non_empty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn sibling_tmp(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".new");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let items: Vec<Value> = read_lines(&dir.path().join("absent.log")).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mixed.log");
        fs::write(&path, b"{\"a\":1}\nnot json\n\n{\"a\":2}\n\xff\xfe\n{\"a\":").unwrap();

        let items: Vec<Value> = read_lines(&path).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["a"], 2);
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.log");
        fs::write(&path, "old\n").unwrap();

        write_atomic(&path, b"new\n", false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        assert!(!dir.path().join("snapshot.log.new").exists());
    }

    #[test]
    fn test_append_and_truncate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.log");
        assert!(!is_non_empty(&path));

        append(&path, b"{}\n", true).unwrap();
        append(&path, b"{}\n", false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}\n{}\n");
        assert!(is_non_empty(&path));

        truncate(&path, false).unwrap();
        assert!(!is_non_empty(&path));
    }
}
