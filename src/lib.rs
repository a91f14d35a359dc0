//! lucidshark-audit - Incremental multi-analyzer code audit engine
//!
//! Fingerprints a project's files, diffs against the previous run, and
//! re-invokes registered analyzers only over what changed, merging fresh
//! results with cached ones per analyzer. Whole-project analyzers always
//! recompute; per-file analyzers are mergeable at file granularity.

pub mod analyzer;
pub mod builtin;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fingerprint;
pub mod store;

pub use analyzer::{
    AnalyzerKind, AnalyzerRegistry, AnalyzerResult, AnalyzerSpec, Finding, FindingCounters,
    PerFileAnalyzer, PerFileFindings, Severity, WholeProjectAnalyzer,
};
pub use config::AuditConfig;
pub use coordinator::{AnalyzerOutcome, AnalyzerStatus, AuditBundle, AuditCoordinator, AuditMode};
pub use error::{AnalysisError, AuditError, Result};
pub use store::{CacheStats, ResultStore, ToolCacheStats};

/// Run one audit: scan, decide mode, execute analyzers, merge and persist
pub async fn run_audit(config: AuditConfig, registry: AnalyzerRegistry) -> Result<AuditBundle> {
    AuditCoordinator::new(config, registry)?.run_audit().await
}

/// Collect per-tool cache statistics without modifying any entry
///
/// Validity is judged against the given registry when one is provided.
pub fn get_stats(
    config: &AuditConfig,
    registry: Option<&AnalyzerRegistry>,
) -> Result<CacheStats> {
    ResultStore::new(config)?.stats(registry)
}

/// Delete the persisted cache entry for one tool, or all entries
pub fn clear_cache(config: &AuditConfig, tool: Option<&str>) -> Result<()> {
    ResultStore::new(config)?.invalidate(tool)
}
