//! Project scanning with streamed content hashing

use crate::error::Result;
use crate::fingerprint::index::{unix_timestamp, FileIndex, FileRecord};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::{xxh3_64, Xxh3};

/// Read buffer size for streamed hashing
const HASH_BUF_SIZE: usize = 64 * 1024;

/// Lists the analyzable files of a project
///
/// Implementations return root-relative paths and are responsible for all
/// exclusion filtering (build artifacts, dependency directories, VCS
/// metadata), so hashing cost and "changes" never include generated or
/// vendored code.
pub trait FileEnumerator: Send + Sync {
    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>>;
}

/// Default enumerator: gitignore-aware walk over the project root
///
/// Skips hidden entries (including `.git`) and anything matched by
/// gitignore rules, plus the audit index directory itself.
#[derive(Debug, Default)]
pub struct WalkEnumerator;

impl FileEnumerator for WalkEnumerator {
    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let walker = ignore::WalkBuilder::new(root)
            .follow_links(false)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            // One unreadable entry must not make the whole scan fatal
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            if relative.starts_with(crate::config::DEFAULT_INDEX_DIR) {
                continue;
            }
            files.push(relative);
        }
        files.sort();
        Ok(files)
    }
}

/// Result of one project scan
#[derive(Debug)]
pub struct ScanOutcome {
    /// Fresh index covering every enumerated file
    pub index: FileIndex,
    /// Number of files whose content hash failed and which were recorded
    /// with a one-off fingerprint so they re-analyze next run
    pub hash_failures: usize,
}

/// Enumerate and fingerprint every analyzable file under `root`
///
/// A per-file read error is recovered locally: the file gets a
/// fingerprint derived from its path and the scan timestamp, which can
/// never match a previous or future scan, so it always reads as modified.
/// Only an enumerator failure aborts the scan.
pub fn scan(root: &Path, enumerator: &dyn FileEnumerator) -> Result<ScanOutcome> {
    let files = enumerator.list_files(root)?;
    let scanned_at = unix_timestamp();

    let mut index = FileIndex::new();
    let mut hash_failures = 0usize;

    for relative in files {
        let path_key = relative.to_string_lossy().replace('\\', "/");
        let fingerprint = match hash_file(&root.join(&relative)) {
            Ok(fp) => fp,
            Err(e) => {
                tracing::warn!(path = %path_key, error = %e, "Cannot hash file, forcing re-analysis");
                hash_failures += 1;
                unstable_fingerprint(&path_key, scanned_at)
            }
        };
        index.insert(FileRecord {
            path: path_key,
            fingerprint,
            last_seen: scanned_at,
        });
    }

    tracing::debug!(files = index.len(), hash_failures, "Scan complete");
    Ok(ScanOutcome {
        index,
        hash_failures,
    })
}

/// Streamed xxh3 hash of a file's bytes, bounding memory on large files
fn hash_file(path: &Path) -> std::io::Result<u64> {
    let mut file = File::open(path)?;
    let mut hasher = Xxh3::new();
    let mut buf = [0u8; HASH_BUF_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.digest())
}

/// Fingerprint for a file that could not be hashed; unique per scan
fn unstable_fingerprint(path: &str, scanned_at: u64) -> u64 {
    let mut seed = Vec::with_capacity(path.len() + 8);
    seed.extend_from_slice(path.as_bytes());
    seed.extend_from_slice(&scanned_at.to_le_bytes());
    xxh3_64(&seed) ^ scanned_at
}
