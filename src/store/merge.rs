//! Merging cached and freshly computed per-file findings

use crate::analyzer::PerFileFindings;
use crate::fingerprint::ChangeSet;

/// Merge a fresh per-file result into the cached mapping
///
/// The merged mapping is the previous mapping restricted to `unchanged`,
/// overlaid with the fresh results (which cover exactly the added and
/// modified paths).
/// Deleted paths are never copied. Aggregate counters are derived from the
/// merged mapping on demand, so they can never be copied from a stale
/// aggregate.
///
/// Whole-project results have no per-file substructure; their merge is the
/// identity (the fresh aggregate replaces the cache wholesale) and is
/// handled by the coordinator.
pub fn merge_per_file(
    previous: Option<&PerFileFindings>,
    change: &ChangeSet,
    fresh: &PerFileFindings,
) -> PerFileFindings {
    let mut merged = PerFileFindings::new();

    if let Some(previous) = previous {
        for path in &change.unchanged {
            if let Some(findings) = previous.get(path) {
                merged.insert(path.clone(), findings.to_vec());
            }
        }
    }

    for (path, findings) in fresh.iter() {
        // Fresh results cover exactly the added and modified sets; anything an
        // adapter volunteers (a deleted path, an excluded one) is dropped
        // to keep the mapping consistent with the change-set.
        if change.added.contains(path) || change.modified.contains(path) {
            merged.insert(path.clone(), findings.clone());
        } else {
            tracing::debug!(path = %path, "Dropping fresh finding outside the invocation set");
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{Finding, Severity};
    use crate::fingerprint::{ChangeSet, FileIndex, FileRecord};

    fn finding(rule: &str) -> Finding {
        Finding {
            rule: rule.to_string(),
            message: format!("{} found", rule),
            severity: Severity::Warning,
            line: Some(3),
        }
    }

    fn index_of(entries: &[(&str, u64)]) -> FileIndex {
        let mut index = FileIndex::new();
        for (path, fp) in entries {
            index.insert(FileRecord {
                path: path.to_string(),
                fingerprint: *fp,
                last_seen: 0,
            });
        }
        index
    }

    #[test]
    fn test_merge_overlays_fresh_on_unchanged() {
        let previous_index = index_of(&[("keep.rs", 1), ("mod.rs", 2), ("gone.rs", 3)]);
        let current = index_of(&[("keep.rs", 1), ("mod.rs", 20), ("new.rs", 4)]);
        let change = ChangeSet::between(Some(&previous_index), &current);

        let mut cached = PerFileFindings::new();
        cached.insert("keep.rs", vec![finding("old-keep")]);
        cached.insert("mod.rs", vec![finding("old-mod")]);
        cached.insert("gone.rs", vec![finding("old-gone")]);

        let mut fresh = PerFileFindings::new();
        fresh.insert("mod.rs", vec![finding("new-mod")]);
        fresh.insert("new.rs", vec![]);

        let merged = merge_per_file(Some(&cached), &change, &fresh);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("keep.rs").unwrap()[0].rule, "old-keep");
        assert_eq!(merged.get("mod.rs").unwrap()[0].rule, "new-mod");
        assert!(merged.get("new.rs").unwrap().is_empty());
        assert!(!merged.contains("gone.rs"));
    }

    #[test]
    fn test_merge_counters_reflect_merged_mapping() {
        let previous_index = index_of(&[("a.rs", 1), ("b.rs", 2)]);
        let current = index_of(&[("a.rs", 1)]);
        let change = ChangeSet::between(Some(&previous_index), &current);

        let mut cached = PerFileFindings::new();
        cached.insert("a.rs", vec![finding("x")]);
        cached.insert("b.rs", vec![finding("y"), finding("z")]);

        let merged = merge_per_file(Some(&cached), &change, &PerFileFindings::new());
        let counters = merged.counters();

        // b.rs was deleted; its two findings must not survive in any form
        assert_eq!(counters.files_covered, 1);
        assert_eq!(counters.total_findings, 1);
    }

    #[test]
    fn test_merge_drops_out_of_set_fresh_entries() {
        let previous_index = index_of(&[("a.rs", 1)]);
        let current = index_of(&[("a.rs", 1)]);
        let change = ChangeSet::between(Some(&previous_index), &current);

        let mut fresh = PerFileFindings::new();
        fresh.insert("stray.rs", vec![finding("stray")]);

        let merged = merge_per_file(None, &change, &fresh);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_merge_without_previous_keeps_only_fresh() {
        let current = index_of(&[("a.rs", 1), ("b.rs", 2)]);
        let change = ChangeSet::between(None, &current);

        let mut fresh = PerFileFindings::new();
        fresh.insert("a.rs", vec![finding("x")]);
        fresh.insert("b.rs", vec![]);

        let merged = merge_per_file(None, &change, &fresh);
        assert_eq!(merged.len(), 2);
    }
}
