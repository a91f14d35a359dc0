//! Run telemetry
//!
//! Purely informational: nothing here feeds back into correctness
//! decisions.

use crate::fingerprint::ChangeSet;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by concurrent analyzer tasks
///
/// Append-only; tasks increment with relaxed atomics and the coordinator
/// snapshots them once after fan-in.
#[derive(Debug, Default)]
pub(crate) struct TelemetryCounters {
    pub adapter_calls: AtomicU64,
    pub files_analyzed: AtomicU64,
    pub files_reused: AtomicU64,
}

impl TelemetryCounters {
    pub fn record_invocation(&self, analyzed: usize, reused: usize) {
        self.adapter_calls.fetch_add(1, Ordering::Relaxed);
        self.files_analyzed
            .fetch_add(analyzed as u64, Ordering::Relaxed);
        self.files_reused.fetch_add(reused as u64, Ordering::Relaxed);
    }

    pub fn record_reuse(&self, reused: usize) {
        self.files_reused.fetch_add(reused as u64, Ordering::Relaxed);
    }
}

/// Per-bucket file counts for the run's change-set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl From<&ChangeSet> for ChangeSummary {
    fn from(change: &ChangeSet) -> Self {
        Self {
            added: change.added.len(),
            modified: change.modified.len(),
            deleted: change.deleted.len(),
            unchanged: change.unchanged.len(),
        }
    }
}

/// Telemetry attached to an audit bundle
#[derive(Debug, Clone, Serialize)]
pub struct RunTelemetry {
    /// Wall-clock duration of the whole run
    pub duration_ms: u64,
    /// Files tracked by the fresh index
    pub files_tracked: usize,
    /// Files whose content hash failed during the scan
    pub hash_failures: usize,
    /// Run-level change-set bucket counts
    pub change: ChangeSummary,
    /// Number of adapter invocations dispatched
    pub adapter_calls: u64,
    /// Files handed to adapters across all per-file invocations
    pub files_analyzed: u64,
    /// Files served from cache across all per-file analyzers
    pub files_reused: u64,
    /// Advisory estimate of time saved versus a full-run baseline
    pub estimated_saved_ms: u64,
}

/// Estimate time saved against a reference full-run baseline
///
/// For each per-file analyzer that ran incrementally, the observed
/// per-file cost is extrapolated over the files it reused from cache.
/// Analyzers that short-circuited entirely contribute nothing because no
/// cost sample exists for them.
pub(crate) fn estimate_saved_ms(samples: &[(u64, usize, usize)]) -> u64 {
    samples
        .iter()
        .filter(|(_, analyzed, _)| *analyzed > 0)
        .map(|(duration_ms, analyzed, reused)| {
            duration_ms.saturating_mul(*reused as u64) / *analyzed as u64
        })
        .sum()
}
