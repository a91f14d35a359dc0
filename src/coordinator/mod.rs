//! Execution coordination
//!
//! Selects full vs. incremental mode, fans analyzer invocations out
//! concurrently with failure isolation and independent timeouts, and
//! assembles the final bundle with performance telemetry.

mod runner;
mod telemetry;

pub use runner::{
    AnalyzerOutcome, AnalyzerStatus, AuditBundle, AuditCoordinator, AuditMode, RunState,
};
pub use telemetry::{ChangeSummary, RunTelemetry};
