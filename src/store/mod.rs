//! Per-analyzer result cache
//!
//! Persists one versioned cache document per analyzer under the index
//! directory and merges cached with freshly computed per-file findings.
//! Documents are replaced wholesale on successful completion, never
//! partially updated in place. Single-writer per run; concurrent runs
//! against the same project root must be serialized by the caller.

mod merge;
mod storage;

pub use merge::merge_per_file;
pub use storage::{CacheEntry, CacheStats, ResultStore, ToolCacheStats};
