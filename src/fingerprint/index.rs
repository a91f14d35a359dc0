//! Persisted file index and change-set derivation

use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current index format version
const INDEX_VERSION: u32 = 1;

/// Seconds since the Unix epoch
pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Fingerprint record for one tracked file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Root-relative path
    pub path: String,
    /// xxh3 hash of the file's content
    pub fingerprint: u64,
    /// Unix timestamp of the scan that last saw this file
    pub last_seen: u64,
}

/// Mapping of tracked paths to their fingerprint records
///
/// Exactly one record per path; excluded paths never appear because
/// exclusion is delegated to the file enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndex {
    /// Index format version
    version: u32,
    /// Unix timestamp of the scan that produced this index
    scanned_at: u64,
    /// Path -> record, ordered for deterministic serialization
    files: BTreeMap<String, FileRecord>,
}

impl FileIndex {
    /// Create an empty index stamped with the current time
    pub fn new() -> Self {
        Self {
            version: INDEX_VERSION,
            scanned_at: unix_timestamp(),
            files: BTreeMap::new(),
        }
    }

    /// Add or replace the record for one path
    pub fn insert(&mut self, record: FileRecord) {
        self.files.insert(record.path.clone(), record);
    }

    /// Record for one path
    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    /// Whether the index tracks the given path
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Number of tracked files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Tracked paths in order
    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    /// Iterate over (path, record) entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileRecord)> {
        self.files.iter()
    }

    /// Timestamp of the scan that produced this index
    pub fn scanned_at(&self) -> u64 {
        self.scanned_at
    }

    /// Path -> fingerprint snapshot, as stored in cache entries
    pub fn fingerprints(&self) -> BTreeMap<String, u64> {
        self.files
            .iter()
            .map(|(path, record)| (path.clone(), record.fingerprint))
            .collect()
    }
}

impl Default for FileIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Classification of every tracked path between two scans
///
/// The four sets are disjoint and partition the union of previous and
/// current index keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Present now, absent before
    pub added: BTreeSet<String>,
    /// Present in both with differing fingerprints
    pub modified: BTreeSet<String>,
    /// Present before, absent now
    pub deleted: BTreeSet<String>,
    /// Present in both with equal fingerprints
    pub unchanged: BTreeSet<String>,
}

impl ChangeSet {
    /// Derive the change-set between a previous index (if any) and the
    /// current one. With no previous index every current path is added.
    pub fn between(previous: Option<&FileIndex>, current: &FileIndex) -> Self {
        match previous {
            Some(previous) => Self::against_snapshot(&previous.fingerprints(), current),
            None => Self {
                added: current.paths().cloned().collect(),
                ..Self::default()
            },
        }
    }

    /// Derive the change-set between a path -> fingerprint snapshot and
    /// the current index. Used per analyzer: each cache entry carries the
    /// snapshot it was computed against, which may be older than the
    /// previously persisted index when that entry's save failed.
    pub fn against_snapshot(snapshot: &BTreeMap<String, u64>, current: &FileIndex) -> Self {
        let mut change = Self::default();
        for (path, record) in &current.files {
            match snapshot.get(path) {
                None => {
                    change.added.insert(path.clone());
                }
                Some(fingerprint) if *fingerprint != record.fingerprint => {
                    change.modified.insert(path.clone());
                }
                Some(_) => {
                    change.unchanged.insert(path.clone());
                }
            }
        }
        for path in snapshot.keys() {
            if !current.contains(path) {
                change.deleted.insert(path.clone());
            }
        }
        change
    }

    /// Paths that need re-analysis: added then modified, each in order
    pub fn to_reanalyze(&self) -> Vec<String> {
        self.added.iter().chain(self.modified.iter()).cloned().collect()
    }

    /// Whether nothing was added, modified or deleted
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Load a persisted index, treating any problem as "no previous index"
///
/// A missing or unparsable document forces a full run; it is never fatal.
pub fn load_index(path: &Path) -> Option<FileIndex> {
    if !path.exists() {
        return None;
    }

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot open file index, forcing full run");
            return None;
        }
    };

    let index: FileIndex = match serde_json::from_reader(BufReader::new(file)) {
        Ok(i) => i,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Corrupt file index, forcing full run");
            return None;
        }
    };

    if index.version != INDEX_VERSION {
        tracing::warn!(
            found = index.version,
            expected = INDEX_VERSION,
            "File index version mismatch, forcing full run"
        );
        return None;
    }

    Some(index)
}

/// Persist the index atomically (temp-file-then-rename)
///
/// A crash mid-write leaves the previous document intact.
pub fn persist_index(index: &FileIndex, path: &Path) -> Result<()> {
    let storage_err = |reason: String| AuditError::IndexStorage {
        path: path.display().to_string(),
        reason,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| storage_err(format!("cannot create index directory: {}", e)))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let tmp = File::create(&tmp_path)
        .map_err(|e| storage_err(format!("cannot create temp file: {}", e)))?;
    serde_json::to_writer(BufWriter::new(tmp), index)
        .map_err(|e| storage_err(format!("cannot serialize index: {}", e)))?;
    fs::rename(&tmp_path, path)
        .map_err(|e| storage_err(format!("cannot replace index: {}", e)))?;

    Ok(())
}
