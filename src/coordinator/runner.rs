//! Audit run orchestration

use crate::analyzer::{
    AnalyzerAdapter, AnalyzerKind, AnalyzerRegistry, AnalyzerResult, PerFileAnalyzer,
    PerFileFindings, WholeProjectAnalyzer,
};
use crate::config::AuditConfig;
use crate::coordinator::telemetry::{
    estimate_saved_ms, ChangeSummary, RunTelemetry, TelemetryCounters,
};
use crate::error::{AnalysisError, AuditError, Result};
use crate::fingerprint::{
    load_index, persist_index, scan, ChangeSet, FileEnumerator, FileIndex, WalkEnumerator,
};
use crate::store::{merge_per_file, CacheEntry, ResultStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

/// Execution mode for one audit run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditMode {
    /// No usable previous index, or a forced run: every analyzer sees the
    /// full current file set and cache reads are bypassed
    Full,
    /// Per-file analyzers are invoked over added and modified files only
    Incremental,
}

/// Lifecycle of one audit run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    Scanning,
    ModeDecided,
    Executing,
    Merging,
    Complete,
    Failed,
}

/// Ephemeral state for one invocation; discarded after handoff
struct AuditRun {
    state: RunState,
}

impl AuditRun {
    fn new() -> Self {
        Self {
            state: RunState::Created,
        }
    }

    fn advance(&mut self, next: RunState) {
        tracing::debug!(from = ?self.state, to = ?next, "Audit run transition");
        self.state = next;
    }
}

/// Per-analyzer completion status; failures are explicit, never omitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalyzerStatus {
    Ok,
    Failed { reason: String },
    Skipped,
}

/// One analyzer's contribution to the bundle
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerOutcome {
    #[serde(flatten)]
    pub status: AnalyzerStatus,
    /// Merged result for `Ok`, cached aggregate for `Skipped`, absent for
    /// `Failed` (a stale result is never re-surfaced as current)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalyzerResult>,
    /// Wall-clock duration of the invocation (0 for cache short-circuits)
    pub duration_ms: u64,
}

impl AnalyzerOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, AnalyzerStatus::Ok)
    }
}

/// The assembled result of one audit run, keyed by analyzer name
#[derive(Debug, Serialize)]
pub struct AuditBundle {
    pub mode: AuditMode,
    pub analyzers: BTreeMap<String, AnalyzerOutcome>,
    pub telemetry: RunTelemetry,
}

impl AuditBundle {
    /// Whether every analyzer completed (ok or deliberately skipped)
    pub fn all_ok(&self) -> bool {
        self.analyzers
            .values()
            .all(|o| !matches!(o.status, AnalyzerStatus::Failed { .. }))
    }

    /// Names of analyzers that failed
    pub fn failed(&self) -> Vec<&str> {
        self.analyzers
            .iter()
            .filter(|(_, o)| matches!(o.status, AnalyzerStatus::Failed { .. }))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// What a fanned-out analyzer task hands back
enum TaskOutput {
    WholeProject {
        fresh: std::result::Result<serde_json::Value, AnalysisError>,
        duration_ms: u64,
    },
    PerFile {
        fresh: std::result::Result<PerFileFindings, AnalysisError>,
        duration_ms: u64,
    },
}

/// Pre-dispatch context for one per-file analyzer, consumed during merge
struct PerFileDispatch {
    change: ChangeSet,
    previous: Option<PerFileFindings>,
    snapshot: BTreeMap<String, u64>,
    invoked: usize,
    short_circuit: bool,
    had_entry: bool,
}

/// Runs audits: scan, mode decision, concurrent execution, merge
///
/// Owns the result store for the duration of a run. The on-disk index and
/// cache documents are single-writer per run; concurrent runs against the
/// same project root must be serialized by the caller.
pub struct AuditCoordinator {
    config: AuditConfig,
    registry: AnalyzerRegistry,
    store: ResultStore,
    enumerator: Arc<dyn FileEnumerator>,
}

impl AuditCoordinator {
    /// Create a coordinator with the default gitignore-aware enumerator
    pub fn new(config: AuditConfig, registry: AnalyzerRegistry) -> Result<Self> {
        Self::with_enumerator(config, registry, Arc::new(WalkEnumerator))
    }

    /// Create a coordinator with a custom file enumerator
    pub fn with_enumerator(
        config: AuditConfig,
        registry: AnalyzerRegistry,
        enumerator: Arc<dyn FileEnumerator>,
    ) -> Result<Self> {
        let store = ResultStore::new(&config)?;
        Ok(Self {
            config,
            registry,
            store,
            enumerator,
        })
    }

    /// The result store backing this coordinator
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Select the execution mode for a run
    ///
    /// FULL when no previous index exists or the caller forces it;
    /// INCREMENTAL otherwise, including for an empty change-set (per-file
    /// analyzers then short-circuit to cache at zero cost).
    pub fn decide_mode(index_exists: bool, force_full: bool, change: &ChangeSet) -> AuditMode {
        if force_full || !index_exists {
            return AuditMode::Full;
        }
        if change.is_clean() {
            tracing::debug!("No file changes; per-file analyzers will reuse cache");
        }
        AuditMode::Incremental
    }

    /// Execute one audit run and assemble the bundle
    pub async fn run_audit(&self) -> Result<AuditBundle> {
        let started = Instant::now();
        let counters = Arc::new(TelemetryCounters::default());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks: JoinSet<(String, TaskOutput)> = JoinSet::new();
        let mut run = AuditRun::new();

        run.advance(RunState::Scanning);

        // Whole-project analyzers have no dependency on the change-set;
        // they start while the scan is still running. When the clean-skip
        // policy is active their dispatch waits for the change-set.
        let mut deferred_project: Vec<String> = Vec::new();
        for spec in self.registry.iter() {
            if let AnalyzerAdapter::WholeProject(adapter) = spec.adapter() {
                if self.config.refresh_project_on_clean {
                    self.spawn_whole_project(&mut tasks, spec.name(), Arc::clone(adapter), spec.timeout(), &semaphore, &counters);
                } else {
                    deferred_project.push(spec.name().to_string());
                }
            }
        }

        // Hashing is blocking I/O; keep it off the async scheduling path.
        let scan_root = self.config.root.clone();
        let enumerator = Arc::clone(&self.enumerator);
        let scanned = tokio::task::spawn_blocking(move || scan(&scan_root, enumerator.as_ref()))
            .await
            .map_err(|e| AuditError::ScanFailed(format!("scan task failed: {}", e)))
            .and_then(|r| r);
        let scanned = match scanned {
            Ok(outcome) => outcome,
            Err(e) => {
                // Unrecoverable scan error: nothing is persisted and the
                // last-known-good cache stays untouched.
                tasks.abort_all();
                run.advance(RunState::Failed);
                return Err(e);
            }
        };
        let index = scanned.index;

        let index_path = self.config.index_file_path();
        let previous = load_index(&index_path);
        let change = ChangeSet::between(previous.as_ref(), &index);
        let mode = Self::decide_mode(previous.is_some(), self.config.force_full, &change);
        run.advance(RunState::ModeDecided);
        tracing::info!(
            ?mode,
            files = index.len(),
            added = change.added.len(),
            modified = change.modified.len(),
            deleted = change.deleted.len(),
            "Audit mode decided"
        );

        if let Err(e) = persist_index(&index, &index_path) {
            tasks.abort_all();
            run.advance(RunState::Failed);
            return Err(e);
        }

        run.advance(RunState::Executing);
        let mut outcomes: BTreeMap<String, AnalyzerOutcome> = BTreeMap::new();

        // Clean-skip policy for deferred whole-project analyzers
        for name in deferred_project {
            let Some(spec) = self.registry.get(&name) else {
                continue;
            };
            if change.is_clean() {
                if let Some(entry) = self.store.load(spec) {
                    tracing::debug!(tool = %name, "Change-set clean, skipping whole-project analyzer");
                    outcomes.insert(
                        name,
                        AnalyzerOutcome {
                            status: AnalyzerStatus::Skipped,
                            result: Some(entry.into_result()),
                            duration_ms: 0,
                        },
                    );
                    continue;
                }
            }
            if let AnalyzerAdapter::WholeProject(adapter) = spec.adapter() {
                self.spawn_whole_project(&mut tasks, spec.name(), Arc::clone(adapter), spec.timeout(), &semaphore, &counters);
            }
        }

        // Per-file analyzers dispatch strictly after scan-and-diff. Each
        // one diffs against its own cache entry's snapshot: an entry that
        // missed a save (or a whole run) re-covers everything it is
        // missing instead of trusting the run-level change-set.
        let mut dispatches: BTreeMap<String, PerFileDispatch> = BTreeMap::new();
        for spec in self.registry.iter() {
            let AnalyzerAdapter::PerFile(adapter) = spec.adapter() else {
                continue;
            };
            let name = spec.name().to_string();

            let mut view = FileIndex::new();
            for (path, record) in index.iter() {
                if spec.matches(path) {
                    view.insert(record.clone());
                }
            }
            let snapshot = view.fingerprints();

            let entry = match mode {
                // FULL bypasses cache reads entirely
                AuditMode::Full => None,
                AuditMode::Incremental => self.store.load(spec),
            };
            let analyzer_change = match &entry {
                Some(entry) => ChangeSet::against_snapshot(entry.fingerprints(), &view),
                None => ChangeSet::between(None, &view),
            };
            let had_entry = entry.is_some();
            let previous_mapping = entry.and_then(|e| match e.into_result() {
                AnalyzerResult::PerFile { findings } => Some(findings),
                AnalyzerResult::WholeProject { .. } => None,
            });

            let invoked = analyzer_change.to_reanalyze();
            if had_entry && invoked.is_empty() {
                // Zero-cost short circuit: the cached mapping already
                // covers every current file this analyzer can see.
                counters.record_reuse(analyzer_change.unchanged.len());
                dispatches.insert(
                    name,
                    PerFileDispatch {
                        change: analyzer_change,
                        previous: previous_mapping,
                        snapshot,
                        invoked: 0,
                        short_circuit: true,
                        had_entry,
                    },
                );
                continue;
            }

            self.spawn_per_file(
                &mut tasks,
                &name,
                Arc::clone(adapter),
                invoked.clone(),
                analyzer_change.unchanged.len(),
                spec.timeout(),
                &semaphore,
                &counters,
            );
            dispatches.insert(
                name,
                PerFileDispatch {
                    change: analyzer_change,
                    previous: previous_mapping,
                    snapshot,
                    invoked: invoked.len(),
                    short_circuit: false,
                    had_entry,
                },
            );
        }

        // Fan in: no ordering guarantee between completions, and one
        // analyzer's failure never cancels siblings.
        let mut raw: BTreeMap<String, TaskOutput> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, output)) => {
                    raw.insert(name, output);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Analyzer task aborted");
                }
            }
        }

        run.advance(RunState::Merging);
        let mut saved_samples: Vec<(u64, usize, usize)> = Vec::new();
        for spec in self.registry.iter() {
            let name = spec.name().to_string();
            if outcomes.contains_key(&name) {
                continue;
            }
            match spec.kind() {
                AnalyzerKind::WholeProject => {
                    let outcome = match raw.remove(&name) {
                        Some(TaskOutput::WholeProject {
                            fresh: Ok(aggregate),
                            duration_ms,
                        }) => {
                            // Whole-project merge is identity: the fresh
                            // aggregate replaces the cache wholesale.
                            let result = AnalyzerResult::WholeProject { aggregate };
                            self.persist_entry(spec.name(), CacheEntry::capture(spec, index.fingerprints(), result.clone()));
                            AnalyzerOutcome {
                                status: AnalyzerStatus::Ok,
                                result: Some(result),
                                duration_ms,
                            }
                        }
                        Some(TaskOutput::WholeProject {
                            fresh: Err(e),
                            duration_ms,
                        }) => AnalyzerOutcome {
                            status: AnalyzerStatus::Failed {
                                reason: e.to_string(),
                            },
                            result: None,
                            duration_ms,
                        },
                        _ => AnalyzerOutcome {
                            status: AnalyzerStatus::Failed {
                                reason: "task aborted before completion".to_string(),
                            },
                            result: None,
                            duration_ms: 0,
                        },
                    };
                    outcomes.insert(name, outcome);
                }
                AnalyzerKind::PerFile => {
                    let Some(dispatch) = dispatches.remove(&name) else {
                        continue;
                    };
                    let outcome = if dispatch.short_circuit {
                        let mut merged = merge_per_file(
                            dispatch.previous.as_ref(),
                            &dispatch.change,
                            &PerFileFindings::new(),
                        );
                        for path in &dispatch.change.unchanged {
                            merged.ensure_entry(path);
                        }
                        // Idempotence: an untouched mapping is not
                        // rewritten; deletions force a refreshed entry.
                        if !dispatch.change.is_clean() {
                            self.persist_entry(
                                spec.name(),
                                CacheEntry::capture(
                                    spec,
                                    dispatch.snapshot,
                                    AnalyzerResult::PerFile {
                                        findings: merged.clone(),
                                    },
                                ),
                            );
                        }
                        AnalyzerOutcome {
                            status: AnalyzerStatus::Ok,
                            result: Some(AnalyzerResult::PerFile { findings: merged }),
                            duration_ms: 0,
                        }
                    } else {
                        match raw.remove(&name) {
                            Some(TaskOutput::PerFile {
                                fresh: Ok(fresh),
                                duration_ms,
                            }) => {
                                let mut merged = merge_per_file(
                                    dispatch.previous.as_ref(),
                                    &dispatch.change,
                                    &fresh,
                                );
                                for path in &dispatch.change.unchanged {
                                    merged.ensure_entry(path);
                                }
                                self.persist_entry(
                                    spec.name(),
                                    CacheEntry::capture(
                                        spec,
                                        dispatch.snapshot,
                                        AnalyzerResult::PerFile {
                                            findings: merged.clone(),
                                        },
                                    ),
                                );
                                if dispatch.had_entry {
                                    saved_samples.push((
                                        duration_ms,
                                        dispatch.invoked,
                                        dispatch.change.unchanged.len(),
                                    ));
                                }
                                AnalyzerOutcome {
                                    status: AnalyzerStatus::Ok,
                                    result: Some(AnalyzerResult::PerFile { findings: merged }),
                                    duration_ms,
                                }
                            }
                            Some(TaskOutput::PerFile {
                                fresh: Err(e),
                                duration_ms,
                            }) => AnalyzerOutcome {
                                status: AnalyzerStatus::Failed {
                                    reason: e.to_string(),
                                },
                                result: None,
                                duration_ms,
                            },
                            _ => AnalyzerOutcome {
                                status: AnalyzerStatus::Failed {
                                    reason: "task aborted before completion".to_string(),
                                },
                                result: None,
                                duration_ms: 0,
                            },
                        }
                    };
                    outcomes.insert(name, outcome);
                }
            }
        }

        let telemetry = RunTelemetry {
            duration_ms: started.elapsed().as_millis() as u64,
            files_tracked: index.len(),
            hash_failures: scanned.hash_failures,
            change: ChangeSummary::from(&change),
            adapter_calls: counters.adapter_calls.load(Ordering::Relaxed),
            files_analyzed: counters.files_analyzed.load(Ordering::Relaxed),
            files_reused: counters.files_reused.load(Ordering::Relaxed),
            estimated_saved_ms: estimate_saved_ms(&saved_samples),
        };

        run.advance(RunState::Complete);
        Ok(AuditBundle {
            mode,
            analyzers: outcomes,
            telemetry,
        })
    }

    fn persist_entry(&self, tool: &str, entry: CacheEntry) {
        // A missed save is tolerated: the stale entry's own snapshot makes
        // the next run re-cover whatever this one computed.
        if let Err(e) = self.store.save(&entry) {
            tracing::warn!(tool = %tool, error = %e, "Failed to persist cache entry");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_per_file(
        &self,
        tasks: &mut JoinSet<(String, TaskOutput)>,
        name: &str,
        adapter: Arc<dyn PerFileAnalyzer>,
        invoked: Vec<String>,
        reused: usize,
        timeout_override: Option<Duration>,
        semaphore: &Arc<Semaphore>,
        counters: &Arc<TelemetryCounters>,
    ) {
        let name = name.to_string();
        let root = self.config.root.clone();
        let limit = timeout_override.unwrap_or(self.config.analyzer_timeout);
        let semaphore = Arc::clone(semaphore);
        let counters = Arc::clone(counters);

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let started = Instant::now();
            counters.record_invocation(invoked.len(), reused);

            let paths = invoked.clone();
            let handle =
                tokio::spawn(async move { adapter.analyze(&root, &paths).await });
            let fresh = match await_contained(handle, limit).await {
                Ok(mut fresh) => {
                    // Completeness: every invoked path gets an entry even
                    // when the adapter reported nothing for it.
                    for path in &invoked {
                        fresh.ensure_entry(path);
                    }
                    Ok(fresh)
                }
                Err(e) => Err(e),
            };

            (
                name,
                TaskOutput::PerFile {
                    fresh,
                    duration_ms: started.elapsed().as_millis() as u64,
                },
            )
        });
    }

    fn spawn_whole_project(
        &self,
        tasks: &mut JoinSet<(String, TaskOutput)>,
        name: &str,
        adapter: Arc<dyn WholeProjectAnalyzer>,
        timeout_override: Option<Duration>,
        semaphore: &Arc<Semaphore>,
        counters: &Arc<TelemetryCounters>,
    ) {
        let name = name.to_string();
        let root = self.config.root.clone();
        let limit = timeout_override.unwrap_or(self.config.analyzer_timeout);
        let semaphore = Arc::clone(semaphore);
        let counters = Arc::clone(counters);

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let started = Instant::now();
            counters.record_invocation(0, 0);

            let handle = tokio::spawn(async move { adapter.analyze(&root).await });
            let fresh = await_contained(handle, limit).await;

            (
                name,
                TaskOutput::WholeProject {
                    fresh,
                    duration_ms: started.elapsed().as_millis() as u64,
                },
            )
        });
    }
}

/// Await an adapter task under its timeout, containing panics as crashes
///
/// On expiry only this task is cancelled; siblings keep running.
async fn await_contained<T>(
    handle: tokio::task::JoinHandle<std::result::Result<T, AnalysisError>>,
    limit: Duration,
) -> std::result::Result<T, AnalysisError> {
    let abort = handle.abort_handle();
    match timeout(limit, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(AnalysisError::Crash(join_err.to_string())),
        Err(_) => {
            abort.abort();
            Err(AnalysisError::Timeout(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::FileRecord;

    fn change_with(added: &[&str]) -> ChangeSet {
        let mut current = FileIndex::new();
        for path in added {
            current.insert(FileRecord {
                path: path.to_string(),
                fingerprint: 1,
                last_seen: 0,
            });
        }
        ChangeSet::between(None, &current)
    }

    #[test]
    fn test_decide_mode_full_without_index() {
        let change = change_with(&["a.rs"]);
        assert_eq!(
            AuditCoordinator::decide_mode(false, false, &change),
            AuditMode::Full
        );
    }

    #[test]
    fn test_decide_mode_full_when_forced() {
        let change = ChangeSet::default();
        assert_eq!(
            AuditCoordinator::decide_mode(true, true, &change),
            AuditMode::Full
        );
    }

    #[test]
    fn test_decide_mode_incremental_otherwise() {
        assert_eq!(
            AuditCoordinator::decide_mode(true, false, &change_with(&["a.rs"])),
            AuditMode::Incremental
        );
        // An empty change-set still runs incrementally; per-file analyzers
        // short-circuit to cache.
        assert_eq!(
            AuditCoordinator::decide_mode(true, false, &ChangeSet::default()),
            AuditMode::Incremental
        );
    }

    #[test]
    fn test_outcome_serialization_shape() {
        let ok = AnalyzerOutcome {
            status: AnalyzerStatus::Ok,
            result: None,
            duration_ms: 12,
        };
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["duration_ms"], 12);

        let failed = AnalyzerOutcome {
            status: AnalyzerStatus::Failed {
                reason: "boom".to_string(),
            },
            result: None,
            duration_ms: 3,
        };
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["reason"], "boom");
    }

    #[tokio::test]
    async fn test_timeout_is_contained() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), AnalysisError>(())
        });
        let result = await_contained(handle, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(AnalysisError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_panic_is_contained_as_crash() {
        let handle = tokio::spawn(async {
            panic!("adapter exploded");
            #[allow(unreachable_code)]
            Ok::<(), AnalysisError>(())
        });
        let result = await_contained(handle, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(AnalysisError::Crash(_))));
    }
}
