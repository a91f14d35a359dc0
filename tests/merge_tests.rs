//! Randomized merge correctness over synthetic change-sets

use lucidshark_audit::analyzer::{Finding, PerFileFindings, Severity};
use lucidshark_audit::fingerprint::{ChangeSet, FileIndex, FileRecord};
use lucidshark_audit::store::merge_per_file;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

fn finding(rule: &str) -> Finding {
    Finding {
        rule: rule.to_string(),
        message: format!("{} triggered", rule),
        severity: Severity::Warning,
        line: Some(1),
    }
}

fn index_from(fingerprints: &BTreeMap<String, u64>) -> FileIndex {
    let mut index = FileIndex::new();
    for (path, fingerprint) in fingerprints {
        index.insert(FileRecord {
            path: path.clone(),
            fingerprint: *fingerprint,
            last_seen: 0,
        });
    }
    index
}

/// Per-path (previous, current) fingerprint pairs; `None` means the file
/// does not exist on that side
fn file_states() -> impl Strategy<Value = BTreeMap<String, (Option<u64>, Option<u64>)>> {
    prop::collection::btree_map(
        "[a-z]{1,6}\\.rs",
        (prop::option::of(1u64..4), prop::option::of(1u64..4)),
        1..50,
    )
}

proptest! {
    #[test]
    fn test_changeset_buckets_partition_the_path_universe(states in file_states()) {
        let previous: BTreeMap<String, u64> = states
            .iter()
            .filter_map(|(p, (prev, _))| prev.map(|f| (p.clone(), f)))
            .collect();
        let current: BTreeMap<String, u64> = states
            .iter()
            .filter_map(|(p, (_, cur))| cur.map(|f| (p.clone(), f)))
            .collect();

        let change = ChangeSet::between(Some(&index_from(&previous)), &index_from(&current));

        // Pairwise disjoint
        prop_assert!(change.added.is_disjoint(&change.modified));
        prop_assert!(change.added.is_disjoint(&change.deleted));
        prop_assert!(change.added.is_disjoint(&change.unchanged));
        prop_assert!(change.modified.is_disjoint(&change.deleted));
        prop_assert!(change.modified.is_disjoint(&change.unchanged));
        prop_assert!(change.deleted.is_disjoint(&change.unchanged));

        // added, modified and unchanged together cover exactly the current
        // paths,
        // and deleted exactly the vanished ones
        let mut present: BTreeSet<String> = change.added.clone();
        present.extend(change.modified.iter().cloned());
        present.extend(change.unchanged.iter().cloned());
        prop_assert_eq!(&present, &current.keys().cloned().collect::<BTreeSet<_>>());
        let vanished: BTreeSet<String> = previous
            .keys()
            .filter(|p| !current.contains_key(*p))
            .cloned()
            .collect();
        prop_assert_eq!(&change.deleted, &vanished);
    }

    #[test]
    fn test_merged_mapping_covers_exactly_current_files(states in file_states()) {
        let previous: BTreeMap<String, u64> = states
            .iter()
            .filter_map(|(p, (prev, _))| prev.map(|f| (p.clone(), f)))
            .collect();
        let current: BTreeMap<String, u64> = states
            .iter()
            .filter_map(|(p, (_, cur))| cur.map(|f| (p.clone(), f)))
            .collect();
        let change = ChangeSet::between(Some(&index_from(&previous)), &index_from(&current));

        // Cached covers every previous path, fresh exactly the invocation set
        let mut cached = PerFileFindings::new();
        for path in previous.keys() {
            cached.insert(path.clone(), vec![finding("old")]);
        }
        let mut fresh = PerFileFindings::new();
        for path in change.to_reanalyze() {
            fresh.insert(path, vec![finding("new")]);
        }

        let merged = merge_per_file(Some(&cached), &change, &fresh);

        prop_assert_eq!(
            merged.paths().cloned().collect::<Vec<_>>(),
            current.keys().cloned().collect::<Vec<_>>()
        );
        for path in current.keys() {
            let rule = merged.get(path).unwrap()[0].rule.as_str();
            if change.unchanged.contains(path) {
                prop_assert_eq!(rule, "old", "unchanged path {} must come from cache", path);
            } else {
                prop_assert_eq!(rule, "new", "re-analyzed path {} must come fresh", path);
            }
        }

        // Counters agree with the merged mapping, not any stale aggregate
        let counters = merged.counters();
        prop_assert_eq!(counters.files_covered, current.len());
        prop_assert_eq!(counters.total_findings, current.len());
        prop_assert_eq!(counters.warnings, current.len());
    }

    #[test]
    fn test_remerging_with_clean_changeset_is_identity(states in file_states()) {
        let current: BTreeMap<String, u64> = states
            .iter()
            .filter_map(|(p, (_, cur))| cur.map(|f| (p.clone(), f)))
            .collect();
        let index = index_from(&current);
        let change = ChangeSet::between(None, &index);

        let mut fresh = PerFileFindings::new();
        for path in current.keys() {
            fresh.insert(path.clone(), vec![finding("new")]);
        }
        let merged = merge_per_file(None, &change, &fresh);

        // A clean follow-up merge reproduces the same mapping
        let clean = ChangeSet::between(Some(&index), &index);
        let remerged = merge_per_file(Some(&merged), &clean, &PerFileFindings::new());
        prop_assert_eq!(
            serde_json::to_string(&merged).unwrap(),
            serde_json::to_string(&remerged).unwrap()
        );
    }
}
