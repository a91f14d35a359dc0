//! Configuration types for lucidshark-audit

use std::path::PathBuf;
use std::time::Duration;

/// Default name of the gitignored index directory under the project root
pub const DEFAULT_INDEX_DIR: &str = ".lucidshark-audit";

/// Configuration options for an audit run
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Project root to audit
    pub root: PathBuf,

    /// Index directory holding the file index and per-tool cache documents.
    /// Relative paths are resolved against `root`.
    pub index_dir: PathBuf,

    /// Force a full run even when a previous index exists
    pub force_full: bool,

    /// Maximum number of analyzer invocations in flight (default: num_cpus)
    pub max_concurrency: usize,

    /// Default per-analyzer timeout; an `AnalyzerSpec` may override it
    pub analyzer_timeout: Duration,

    /// Re-run whole-project analyzers when the change-set is empty.
    /// When disabled, a whole-project analyzer with a valid cache entry is
    /// reported as skipped with its cached aggregate attached.
    pub refresh_project_on_clean: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            force_full: false,
            max_concurrency: num_cpus::get(),
            analyzer_timeout: Duration::from_secs(300),
            refresh_project_on_clean: true,
        }
    }
}

impl AuditConfig {
    /// Create a configuration for the given project root with defaults
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Absolute path of the index directory
    pub fn index_dir_path(&self) -> PathBuf {
        if self.index_dir.is_absolute() {
            self.index_dir.clone()
        } else {
            self.root.join(&self.index_dir)
        }
    }

    /// Path of the persisted file-index document
    pub fn index_file_path(&self) -> PathBuf {
        self.index_dir_path().join("file-index.json")
    }
}
