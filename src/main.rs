//! lucidshark-audit - Incremental multi-analyzer project audit
//!
//! Fingerprints project files, diffs against the previous run, and only
//! re-invokes analyzers over what changed.

mod cli;

use clap::Parser;
use cli::Cli;
use lucidshark_audit::builtin::default_registry;
use lucidshark_audit::coordinator::AnalyzerStatus;
use lucidshark_audit::{clear_cache, get_stats, run_audit, AnalyzerResult, AuditBundle};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let cli = Cli::parse();
    let config = match cli.to_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    let registry = match default_registry() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    // === Maintenance commands; no audit runs for these ===
    if let Some(tool) = cli.clear_cache_tool() {
        if let Err(e) = clear_cache(&config, tool) {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
        match tool {
            Some(tool) => eprintln!("Cleared cache entry for '{}'", tool),
            None => eprintln!("Cleared all cache entries"),
        }
        return ExitCode::SUCCESS;
    }

    if cli.stats {
        let stats = match get_stats(&config, Some(&registry)) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(2);
            }
        };
        if cli.json {
            match serde_json::to_string_pretty(&stats) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::from(2);
                }
            }
        } else if stats.entries.is_empty() {
            println!("No cache entries");
        } else {
            for entry in &stats.entries {
                println!(
                    "{:<20} {:>8} files  {:>10} bytes  age {}  {}",
                    entry.tool,
                    entry.tracked_files,
                    entry.size_bytes,
                    entry
                        .age_secs
                        .map(|s| format!("{}s", s))
                        .unwrap_or_else(|| "?".to_string()),
                    if entry.valid { "valid" } else { "stale" },
                );
            }
        }
        return ExitCode::SUCCESS;
    }

    // === Run the audit ===
    let bundle = match run_audit(config, registry).await {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    // === Output ===
    if cli.json {
        match serde_json::to_string_pretty(&bundle) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(2);
            }
        }
    } else {
        print_summary(&bundle);
    }

    if bundle.all_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1) // At least one analyzer failed
    }
}

/// Human-readable bundle summary
fn print_summary(bundle: &AuditBundle) {
    println!("Audit mode: {:?}", bundle.mode);
    for (name, outcome) in &bundle.analyzers {
        match &outcome.status {
            AnalyzerStatus::Ok => match &outcome.result {
                Some(AnalyzerResult::PerFile { findings }) => {
                    let counters = findings.counters();
                    println!(
                        "  {:<20} ok       {} files, {} findings ({} errors, {} warnings) in {}ms",
                        name,
                        counters.files_covered,
                        counters.total_findings,
                        counters.errors,
                        counters.warnings,
                        outcome.duration_ms,
                    );
                }
                Some(AnalyzerResult::WholeProject { aggregate }) => {
                    println!(
                        "  {:<20} ok       {} in {}ms",
                        name, aggregate, outcome.duration_ms
                    );
                }
                None => println!("  {:<20} ok", name),
            },
            AnalyzerStatus::Failed { reason } => {
                println!("  {:<20} FAILED   {}", name, reason);
            }
            AnalyzerStatus::Skipped => {
                println!("  {:<20} skipped  (no changes, cached result)", name);
            }
        }
    }
    let t = &bundle.telemetry;
    println!(
        "{} files tracked (+{} ~{} -{}), {} adapter calls, {} analyzed / {} reused, {}ms (saved ~{}ms)",
        t.files_tracked,
        t.change.added,
        t.change.modified,
        t.change.deleted,
        t.adapter_calls,
        t.files_analyzed,
        t.files_reused,
        t.duration_ms,
        t.estimated_saved_ms,
    );
}
