//! Analyzer registration

use crate::analyzer::types::{AnalyzerKind, PerFileFindings};
use crate::error::{AnalysisError, AuditError, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Adapter for an analyzer whose result is mergeable at file granularity
///
/// `paths` are root-relative and may be empty; an empty invocation must be
/// handled neutrally (return an empty mapping, no side effects). The
/// adapter may sub-batch internally but returns one merged mapping, or
/// fails, as a unit.
#[async_trait]
pub trait PerFileAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        root: &Path,
        paths: &[String],
    ) -> std::result::Result<PerFileFindings, AnalysisError>;
}

/// Adapter for an analyzer whose result is only meaningful project-wide
#[async_trait]
pub trait WholeProjectAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        root: &Path,
    ) -> std::result::Result<serde_json::Value, AnalysisError>;
}

/// The adapter behind a registered analyzer, tagged by categorization
#[derive(Clone)]
pub enum AnalyzerAdapter {
    PerFile(Arc<dyn PerFileAnalyzer>),
    WholeProject(Arc<dyn WholeProjectAnalyzer>),
}

impl AnalyzerAdapter {
    /// The categorization this adapter was registered under
    pub fn kind(&self) -> AnalyzerKind {
        match self {
            AnalyzerAdapter::PerFile(_) => AnalyzerKind::PerFile,
            AnalyzerAdapter::WholeProject(_) => AnalyzerKind::WholeProject,
        }
    }
}

impl std::fmt::Debug for AnalyzerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AnalyzerAdapter::PerFile(_) => "AnalyzerAdapter::PerFile",
            AnalyzerAdapter::WholeProject(_) => "AnalyzerAdapter::WholeProject",
        })
    }
}

/// A registered analyzer: name, adapter, file patterns and timeout
#[derive(Debug, Clone)]
pub struct AnalyzerSpec {
    name: String,
    adapter: AnalyzerAdapter,
    /// Glob patterns restricting which files a per-file analyzer sees.
    /// Empty means all enumerated files.
    patterns: Vec<String>,
    matcher: Option<GlobSet>,
    timeout: Option<Duration>,
}

impl AnalyzerSpec {
    /// Register a per-file analyzer under the given name
    pub fn per_file(name: impl Into<String>, adapter: Arc<dyn PerFileAnalyzer>) -> Self {
        Self {
            name: name.into(),
            adapter: AnalyzerAdapter::PerFile(adapter),
            patterns: Vec::new(),
            matcher: None,
            timeout: None,
        }
    }

    /// Register a whole-project analyzer under the given name
    pub fn whole_project(name: impl Into<String>, adapter: Arc<dyn WholeProjectAnalyzer>) -> Self {
        Self {
            name: name.into(),
            adapter: AnalyzerAdapter::WholeProject(adapter),
            patterns: Vec::new(),
            matcher: None,
            timeout: None,
        }
    }

    /// Restrict the analyzer to files matching the given glob patterns
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                AuditError::InvalidConfig(format!(
                    "Bad file pattern '{}' for analyzer '{}': {}",
                    pattern, self.name, e
                ))
            })?;
            builder.add(glob);
        }
        let matcher = builder.build().map_err(|e| {
            AuditError::InvalidConfig(format!(
                "Cannot compile file patterns for analyzer '{}': {}",
                self.name, e
            ))
        })?;
        self.patterns = patterns;
        self.matcher = Some(matcher);
        Ok(self)
    }

    /// Override the default per-invocation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Analyzer name, used as the cache and bundle key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The categorization fixed at registration
    pub fn kind(&self) -> AnalyzerKind {
        self.adapter.kind()
    }

    /// The adapter to invoke
    pub fn adapter(&self) -> &AnalyzerAdapter {
        &self.adapter
    }

    /// Timeout override, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether the given root-relative path falls under this analyzer
    pub fn matches(&self, path: &str) -> bool {
        match &self.matcher {
            Some(matcher) => matcher.is_match(path),
            None => true,
        }
    }

    /// Hash of the settings that invalidate a cache entry
    ///
    /// A cached result is reusable only if the analyzer's categorization
    /// and file patterns match what was true when it was captured. Any
    /// change to either must read as a cache miss, never a silent reuse.
    pub fn config_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        match self.kind() {
            AnalyzerKind::PerFile => "per_file".hash(&mut hasher),
            AnalyzerKind::WholeProject => "whole_project".hash(&mut hasher),
        }
        for pattern in &self.patterns {
            pattern.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// The set of analyzers participating in a run
#[derive(Debug, Clone, Default)]
pub struct AnalyzerRegistry {
    analyzers: Vec<AnalyzerSpec>,
}

impl AnalyzerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an analyzer; names must be unique
    pub fn register(&mut self, spec: AnalyzerSpec) -> Result<()> {
        if self.analyzers.iter().any(|a| a.name() == spec.name()) {
            return Err(AuditError::InvalidConfig(format!(
                "Analyzer '{}' is already registered",
                spec.name()
            )));
        }
        self.analyzers.push(spec);
        Ok(())
    }

    /// Look up an analyzer by name
    pub fn get(&self, name: &str) -> Option<&AnalyzerSpec> {
        self.analyzers.iter().find(|a| a.name() == name)
    }

    /// Iterate over registered analyzers in registration order
    pub fn iter(&self) -> impl Iterator<Item = &AnalyzerSpec> {
        self.analyzers.iter()
    }

    /// Number of registered analyzers
    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}
