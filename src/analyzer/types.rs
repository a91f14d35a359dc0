//! Analyzer result shapes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of a single finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single normalized finding reported by an analyzer for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Identifier of the rule or check that produced the finding
    pub rule: String,
    /// Human-readable description
    pub message: String,
    /// Severity classification
    pub severity: Severity,
    /// 1-indexed line number, when the finding is line-addressable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// Aggregate counters over a per-file findings mapping
///
/// Counters are always derived from the mapping via
/// [`PerFileFindings::counters`]; they are never stored or mutated
/// independently, so a merged mapping can never disagree with its totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FindingCounters {
    /// Number of files in the mapping
    pub files_covered: usize,
    /// Number of files with at least one finding
    pub files_with_findings: usize,
    /// Total findings across all files
    pub total_findings: usize,
    /// Findings with `Severity::Warning`
    pub warnings: usize,
    /// Findings with `Severity::Error`
    pub errors: usize,
}

/// Per-file analyzer result: a path -> findings mapping
///
/// Keys are root-relative paths. The map is ordered so serialized results
/// are byte-identical across runs that produce the same findings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerFileFindings {
    findings: BTreeMap<String, Vec<Finding>>,
}

impl PerFileFindings {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an existing mapping
    pub fn from_map(findings: BTreeMap<String, Vec<Finding>>) -> Self {
        Self { findings }
    }

    /// Record the findings for one file, replacing any previous entry
    pub fn insert(&mut self, path: impl Into<String>, findings: Vec<Finding>) {
        self.findings.insert(path.into(), findings);
    }

    /// Ensure an (empty) entry exists for the given path
    ///
    /// Used by the coordinator to normalize adapter output: every invoked
    /// path gets an entry even when the adapter reported nothing for it.
    pub fn ensure_entry(&mut self, path: &str) {
        self.findings.entry(path.to_string()).or_default();
    }

    /// Remove the entry for one file, if present
    pub fn remove(&mut self, path: &str) -> Option<Vec<Finding>> {
        self.findings.remove(path)
    }

    /// Findings for one file
    pub fn get(&self, path: &str) -> Option<&[Finding]> {
        self.findings.get(path).map(Vec::as_slice)
    }

    /// Whether the mapping contains an entry for the given path
    pub fn contains(&self, path: &str) -> bool {
        self.findings.contains_key(path)
    }

    /// Number of files in the mapping
    pub fn len(&self) -> usize {
        self.findings.len()
    }

    /// Whether the mapping is empty
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Iterate over (path, findings) entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Finding>)> {
        self.findings.iter()
    }

    /// Paths in the mapping, in order
    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.findings.keys()
    }

    /// Compute aggregate counters from the current mapping
    pub fn counters(&self) -> FindingCounters {
        let mut counters = FindingCounters {
            files_covered: self.findings.len(),
            ..FindingCounters::default()
        };
        for findings in self.findings.values() {
            if !findings.is_empty() {
                counters.files_with_findings += 1;
            }
            counters.total_findings += findings.len();
            for finding in findings {
                match finding.severity {
                    Severity::Warning => counters.warnings += 1,
                    Severity::Error => counters.errors += 1,
                    Severity::Info => {}
                }
            }
        }
        counters
    }
}

/// Categorization of an analyzer, fixed at registration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    /// Result is only meaningful over the entire project; never partially
    /// recomputed
    WholeProject,
    /// Result is addressable and mergeable at file granularity
    PerFile,
}

/// Tagged union of analyzer result shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalyzerResult {
    /// Opaque aggregate produced by a whole-project analyzer
    WholeProject { aggregate: serde_json::Value },
    /// Path -> findings mapping produced by a per-file analyzer
    PerFile { findings: PerFileFindings },
}

impl AnalyzerResult {
    /// The categorization this result belongs to
    pub fn kind(&self) -> AnalyzerKind {
        match self {
            AnalyzerResult::WholeProject { .. } => AnalyzerKind::WholeProject,
            AnalyzerResult::PerFile { .. } => AnalyzerKind::PerFile,
        }
    }

    /// The per-file mapping, when this is a per-file result
    pub fn per_file(&self) -> Option<&PerFileFindings> {
        match self {
            AnalyzerResult::PerFile { findings } => Some(findings),
            AnalyzerResult::WholeProject { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(rule: &str, severity: Severity) -> Finding {
        Finding {
            rule: rule.to_string(),
            message: format!("{} triggered", rule),
            severity,
            line: Some(1),
        }
    }

    #[test]
    fn test_counters_pure_function_of_mapping() {
        let mut result = PerFileFindings::new();
        result.insert("a.rs", vec![finding("todo", Severity::Info)]);
        result.insert(
            "b.rs",
            vec![
                finding("secret", Severity::Error),
                finding("todo", Severity::Warning),
            ],
        );
        result.insert("c.rs", vec![]);

        let counters = result.counters();
        assert_eq!(counters.files_covered, 3);
        assert_eq!(counters.files_with_findings, 2);
        assert_eq!(counters.total_findings, 3);
        assert_eq!(counters.warnings, 1);
        assert_eq!(counters.errors, 1);
    }

    #[test]
    fn test_counters_update_after_removal() {
        let mut result = PerFileFindings::new();
        result.insert("a.rs", vec![finding("todo", Severity::Warning)]);
        result.insert("b.rs", vec![finding("todo", Severity::Warning)]);
        assert_eq!(result.counters().total_findings, 2);

        result.remove("a.rs");
        assert_eq!(result.counters().total_findings, 1);
        assert_eq!(result.counters().files_covered, 1);
    }

    #[test]
    fn test_ensure_entry_is_idempotent() {
        let mut result = PerFileFindings::new();
        result.insert("a.rs", vec![finding("todo", Severity::Info)]);
        result.ensure_entry("a.rs");
        result.ensure_entry("b.rs");

        assert_eq!(result.get("a.rs").map(<[Finding]>::len), Some(1));
        assert_eq!(result.get("b.rs").map(<[Finding]>::len), Some(0));
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let mut a = PerFileFindings::new();
        a.insert("z.rs", vec![]);
        a.insert("a.rs", vec![finding("todo", Severity::Info)]);

        let mut b = PerFileFindings::new();
        b.insert("a.rs", vec![finding("todo", Severity::Info)]);
        b.insert("z.rs", vec![]);

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_result_kind_matches_variant() {
        let per_file = AnalyzerResult::PerFile {
            findings: PerFileFindings::new(),
        };
        let whole = AnalyzerResult::WholeProject {
            aggregate: serde_json::json!({"files": 3}),
        };
        assert_eq!(per_file.kind(), AnalyzerKind::PerFile);
        assert_eq!(whole.kind(), AnalyzerKind::WholeProject);
        assert!(per_file.per_file().is_some());
        assert!(whole.per_file().is_none());
    }
}
