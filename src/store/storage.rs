//! Cache storage implementation

use crate::analyzer::{AnalyzerKind, AnalyzerRegistry, AnalyzerResult, AnalyzerSpec};
use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::fingerprint::unix_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

/// Current cache format version
const CACHE_VERSION: u32 = 1;

/// Extension used for per-tool cache documents
const CACHE_EXT: &str = "cache.json";

/// Extension of the temp file a save writes before renaming; one can be
/// orphaned by a crash mid-save
const CACHE_TMP_EXT: &str = "cache.tmp";

/// Persisted result for one analyzer
///
/// Tagged with the fingerprint snapshot it was computed against and the
/// analyzer configuration hash that was true at capture time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache format version
    version: u32,
    /// Analyzer name
    tool: String,
    /// Categorization at capture time
    kind: AnalyzerKind,
    /// Hash of the analyzer settings at capture time
    config_hash: u64,
    /// Path -> fingerprint snapshot the result was computed against
    fingerprints: BTreeMap<String, u64>,
    /// The captured result
    result: AnalyzerResult,
    /// Unix timestamp of capture
    captured_at: u64,
}

impl CacheEntry {
    /// Capture a fresh entry for the given analyzer
    pub fn capture(
        spec: &AnalyzerSpec,
        fingerprints: BTreeMap<String, u64>,
        result: AnalyzerResult,
    ) -> Self {
        Self {
            version: CACHE_VERSION,
            tool: spec.name().to_string(),
            kind: spec.kind(),
            config_hash: spec.config_hash(),
            fingerprints,
            result,
            captured_at: unix_timestamp(),
        }
    }

    /// Analyzer name
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// The captured result
    pub fn result(&self) -> &AnalyzerResult {
        &self.result
    }

    /// Consume the entry, returning the captured result
    pub fn into_result(self) -> AnalyzerResult {
        self.result
    }

    /// Fingerprint snapshot at capture time
    pub fn fingerprints(&self) -> &BTreeMap<String, u64> {
        &self.fingerprints
    }

    /// Capture timestamp
    pub fn captured_at(&self) -> u64 {
        self.captured_at
    }
}

/// Observational stats for one cached tool entry
#[derive(Debug, Clone, Serialize)]
pub struct ToolCacheStats {
    /// Analyzer name (file stem when the document is unreadable)
    pub tool: String,
    /// Seconds since capture, when readable
    pub age_secs: Option<u64>,
    /// Number of files in the fingerprint snapshot
    pub tracked_files: usize,
    /// On-disk size of the document
    pub size_bytes: u64,
    /// Whether the entry would be reusable for the current registry
    pub valid: bool,
}

/// Observational cache statistics; side-effect-free
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: Vec<ToolCacheStats>,
}

/// Per-analyzer cache manager
pub struct ResultStore {
    /// Directory where cache documents are stored
    cache_dir: PathBuf,
}

impl ResultStore {
    /// Create a store rooted at the configured index directory
    pub fn new(config: &AuditConfig) -> Result<Self> {
        let cache_dir = config.index_dir_path();
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                AuditError::CacheError(format!(
                    "Failed to create cache directory '{}': {}",
                    cache_dir.display(),
                    e
                ))
            })?;
        }
        Ok(Self { cache_dir })
    }

    /// Get the cache document path for a tool
    fn cache_path(&self, tool: &str) -> PathBuf {
        // Hash-based filename sidesteps tool-name charset issues
        let mut hasher = DefaultHasher::new();
        tool.hash(&mut hasher);
        self.cache_dir
            .join(format!("{:016x}.{}", hasher.finish(), CACHE_EXT))
    }

    /// Load the cached entry for an analyzer, if reusable
    ///
    /// Absent, unreadable, version-mismatched or configuration-mismatched
    /// documents all report as a miss; corruption is logged but never
    /// fatal.
    pub fn load(&self, spec: &AnalyzerSpec) -> Option<CacheEntry> {
        let path = self.cache_path(spec.name());
        if !path.exists() {
            return None;
        }

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(tool = spec.name(), error = %e, "Cannot open cache entry, treating as miss");
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_reader(BufReader::new(file)) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(tool = spec.name(), error = %e, "Corrupt cache entry, treating as miss");
                return None;
            }
        };

        if entry.version != CACHE_VERSION || entry.tool != spec.name() {
            return None;
        }
        // Consistency rule: categorization or pattern changes are a miss,
        // never a silent reuse
        if entry.kind != spec.kind() || entry.config_hash != spec.config_hash() {
            tracing::debug!(tool = spec.name(), "Analyzer configuration changed, cache miss");
            return None;
        }

        Some(entry)
    }

    /// Persist an entry, replacing any previous document wholesale
    pub fn save(&self, entry: &CacheEntry) -> Result<()> {
        let path = self.cache_path(&entry.tool);
        let tmp_path = path.with_extension("tmp");

        let file = File::create(&tmp_path).map_err(|e| {
            AuditError::CacheError(format!(
                "Failed to create cache file '{}': {}",
                tmp_path.display(),
                e
            ))
        })?;
        serde_json::to_writer(BufWriter::new(file), entry)
            .map_err(|e| AuditError::CacheError(format!("Failed to write cache entry: {}", e)))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            AuditError::CacheError(format!(
                "Failed to replace cache file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Delete the persisted entry for one tool, or all entries
    ///
    /// The next `load()` reports absent, forcing full recomputation.
    pub fn invalidate(&self, tool: Option<&str>) -> Result<()> {
        match tool {
            Some(tool) => {
                let path = self.cache_path(tool);
                if path.exists() {
                    fs::remove_file(&path).map_err(|e| {
                        AuditError::CacheError(format!(
                            "Failed to remove cache file '{}': {}",
                            path.display(),
                            e
                        ))
                    })?;
                }
                Ok(())
            }
            None => self.sweep(),
        }
    }

    fn sweep(&self) -> Result<()> {
        if !self.cache_dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.cache_dir).map_err(|e| {
            AuditError::CacheError(format!(
                "Failed to read cache directory '{}': {}",
                self.cache_dir.display(),
                e
            ))
        })? {
            let entry =
                entry.map_err(|e| AuditError::CacheError(format!("Failed to read cache entry: {}", e)))?;
            let path = entry.path();
            let name = path.to_string_lossy();
            if name.ends_with(CACHE_EXT) || name.ends_with(CACHE_TMP_EXT) {
                fs::remove_file(&path).map_err(|e| {
                    AuditError::CacheError(format!(
                        "Failed to remove cache file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Collect per-tool stats without touching any entry
    ///
    /// Validity reflects whether the entry would be reusable against the
    /// given registry; unreadable documents report as invalid.
    pub fn stats(&self, registry: Option<&AnalyzerRegistry>) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        if !self.cache_dir.exists() {
            return Ok(stats);
        }

        let now = unix_timestamp();
        for dir_entry in fs::read_dir(&self.cache_dir).map_err(|e| {
            AuditError::CacheError(format!(
                "Failed to read cache directory '{}': {}",
                self.cache_dir.display(),
                e
            ))
        })? {
            let dir_entry = dir_entry
                .map_err(|e| AuditError::CacheError(format!("Failed to read cache entry: {}", e)))?;
            let path = dir_entry.path();
            if !path.to_string_lossy().ends_with(CACHE_EXT) {
                continue;
            }
            let size_bytes = dir_entry.metadata().map(|m| m.len()).unwrap_or(0);

            let parsed: Option<CacheEntry> = File::open(&path)
                .ok()
                .and_then(|f| serde_json::from_reader(BufReader::new(f)).ok());
            match parsed {
                Some(entry) => {
                    let valid = entry.version == CACHE_VERSION
                        && registry.map_or(true, |r| {
                            r.get(&entry.tool).is_some_and(|spec| {
                                spec.kind() == entry.kind
                                    && spec.config_hash() == entry.config_hash
                            })
                        });
                    stats.entries.push(ToolCacheStats {
                        tool: entry.tool,
                        age_secs: Some(now.saturating_sub(entry.captured_at)),
                        tracked_files: entry.fingerprints.len(),
                        size_bytes,
                        valid,
                    });
                }
                None => stats.entries.push(ToolCacheStats {
                    tool: path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "unknown".to_string()),
                    age_secs: None,
                    tracked_files: 0,
                    size_bytes,
                    valid: false,
                }),
            }
        }

        stats.entries.sort_by(|a, b| a.tool.cmp(&b.tool));
        Ok(stats)
    }
}
