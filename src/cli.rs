//! CLI argument parsing using clap

use clap::Parser;
use lucidshark_audit::config::AuditConfig;
use lucidshark_audit::error::{AuditError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Incremental multi-analyzer project audit
#[derive(Parser, Debug)]
#[command(name = "lucidshark-audit")]
#[command(author = "Voldeq GmbH")]
#[command(version)]
#[command(about = "Audit a project with cached, incremental analyzers", long_about = None)]
pub struct Cli {
    /// Project root to audit
    #[arg(value_name = "ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Directory for the file index and cache documents
    /// (relative paths resolve against ROOT)
    #[arg(long = "cache-dir", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Re-analyze everything, bypassing cache reads
    #[arg(short = 'f', long = "force-full")]
    pub force_full: bool,

    /// Maximum number of analyzer invocations in flight
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// Per-analyzer timeout in seconds
    #[arg(long = "timeout-secs", value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Skip whole-project analyzers when no file changed, reporting their
    /// cached aggregate instead
    #[arg(long = "skip-project-on-clean")]
    pub skip_project_on_clean: bool,

    /// Output the audit bundle as JSON
    #[arg(long = "json")]
    pub json: bool,

    /// Print cache statistics instead of running an audit
    #[arg(long = "stats")]
    pub stats: bool,

    /// Clear the cache entry for TOOL (--clear-cache=TOOL), or all entries
    /// when no TOOL is given
    #[arg(
        long = "clear-cache",
        value_name = "TOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ""
    )]
    pub clear_cache: Option<String>,
}

impl Cli {
    /// Convert parsed arguments into an audit configuration
    pub fn to_config(&self) -> Result<AuditConfig> {
        if self.jobs == Some(0) {
            return Err(AuditError::InvalidConfig(
                "--jobs must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(AuditError::InvalidConfig(
                "--timeout-secs must be at least 1".to_string(),
            ));
        }

        let mut config = AuditConfig::for_root(&self.root);
        if let Some(cache_dir) = &self.cache_dir {
            config.index_dir = cache_dir.clone();
        }
        config.force_full = self.force_full;
        if let Some(jobs) = self.jobs {
            config.max_concurrency = jobs;
        }
        if let Some(secs) = self.timeout_secs {
            config.analyzer_timeout = Duration::from_secs(secs);
        }
        config.refresh_project_on_clean = !self.skip_project_on_clean;
        Ok(config)
    }

    /// Tool named by `--clear-cache`, with the bare flag meaning "all"
    pub fn clear_cache_tool(&self) -> Option<Option<&str>> {
        self.clear_cache
            .as_deref()
            .map(|tool| if tool.is_empty() { None } else { Some(tool) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["lucidshark-audit"]);
        let config = cli.to_config().unwrap();

        assert_eq!(config.root, PathBuf::from("."));
        assert!(!config.force_full);
        assert!(config.refresh_project_on_clean);
        assert_eq!(config.analyzer_timeout, Duration::from_secs(300));
        assert!(!cli.json);
        assert!(cli.clear_cache_tool().is_none());
    }

    #[test]
    fn test_cli_all_options() {
        let cli = Cli::parse_from([
            "lucidshark-audit",
            "-f",
            "-j",
            "4",
            "--timeout-secs",
            "60",
            "--cache-dir",
            "/var/cache/audit",
            "--skip-project-on-clean",
            "--json",
            "/tmp/project",
        ]);
        let config = cli.to_config().unwrap();

        assert_eq!(config.root, PathBuf::from("/tmp/project"));
        assert_eq!(config.index_dir, PathBuf::from("/var/cache/audit"));
        assert!(config.force_full);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.analyzer_timeout, Duration::from_secs(60));
        assert!(!config.refresh_project_on_clean);
        assert!(cli.json);
    }

    #[test]
    fn test_cli_zero_jobs_rejected() {
        let cli = Cli::parse_from(["lucidshark-audit", "-j", "0"]);
        assert!(matches!(
            cli.to_config(),
            Err(AuditError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_cli_clear_cache_variants() {
        let all = Cli::parse_from(["lucidshark-audit", "--clear-cache"]);
        assert_eq!(all.clear_cache_tool(), Some(None));

        let one = Cli::parse_from(["lucidshark-audit", "--clear-cache=todos"]);
        assert_eq!(one.clear_cache_tool(), Some(Some("todos")));

        let none = Cli::parse_from(["lucidshark-audit"]);
        assert_eq!(none.clear_cache_tool(), None);
    }

    #[test]
    fn test_cli_bare_clear_cache_keeps_positional_root() {
        // A root after the bare flag stays the root; it must not be
        // swallowed as the TOOL value
        let cli = Cli::parse_from(["lucidshark-audit", "--clear-cache", "/tmp/project"]);
        assert_eq!(cli.clear_cache_tool(), Some(None));
        assert_eq!(cli.root, PathBuf::from("/tmp/project"));
    }
}
