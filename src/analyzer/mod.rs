//! Analyzer contracts and registration
//!
//! Analyzers are opaque async adapters registered under a fixed name and
//! categorization (per-file or whole-project). The categorization is set
//! at registration time and never inferred from payload shape; the result
//! store uses it to decide how cached and fresh data are merged.

mod registry;
mod types;

pub use registry::{
    AnalyzerAdapter, AnalyzerRegistry, AnalyzerSpec, PerFileAnalyzer, WholeProjectAnalyzer,
};
pub use types::{AnalyzerKind, AnalyzerResult, Finding, FindingCounters, PerFileFindings, Severity};
