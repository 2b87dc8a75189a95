//! Classification policies
//!
//! A [`Policy`] is an explicit description of what one pipeline run considers in
//! scope: which extensions count, which path patterns include a file, which
//! patterns veto it, and whether the run deduplicates against the ledger.
//!
//! Patterns are glob patterns matched against `/`-separated root-relative paths.
//! `*` never crosses a `/`; use `**` to span directories.
//!
//! ## Evaluation
//!
//! A path is accepted iff
//! 1. its extension is in the policy's extension set (case-insensitive), and
//! 2. it matches at least one include pattern (or no include patterns are set), and
//! 3. it matches none of the exclude patterns.
//!
//! Exclusion always wins over inclusion.
//!
//! ## Built-in policies
//!
//! ```rust
//! use symship::Policy;
//!
//! # fn main() -> symship::Result<()> {
//! let editor = Policy::editor_symbols()?;
//! assert!(editor.accepts("Plugins/Runtime/Foo/Binaries/Win64/Foo.pdb"));
//! assert!(!editor.accepts("Binaries/Win64/UE4Editor-Core.dll"));
//!
//! let packaged = Policy::packaged_build("BacktraceIntegration")?;
//! assert!(packaged.accepts("Binaries/Win64/MyGame.exe"));
//! assert!(!packaged.accepts("Saved/StagedBuilds/WindowsNoEditor/MyGame.exe"));
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, ShipError};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::path::Path;

/// Subtree holding plugins shared by every project built against the engine
pub const SHARED_RUNTIME_PLUGINS: &str = "Plugins/Runtime/**";

/// Editor-only engine modules
pub const EDITOR_BINARIES: &str = "**/Binaries/Win64/UE4Editor-*.{pdb,dll}";

/// Build-rule assemblies produced by the build tool itself
pub const BUILD_RULE_ASSEMBLIES: &str = "**/*ModuleRules.{exe,pdb,dll}";

/// Staged output that is already final and must not be re-shipped
pub const FINALIZED_STAGED_OUTPUT: &str = "Saved/StagedBuilds/WindowsNoEditor/**";

/// Include/exclude rule set plus dedup flag for one pipeline run
#[derive(Debug, Clone)]
pub struct Policy {
    name: String,
    extensions: BTreeSet<String>,
    include_patterns: Vec<String>,
    exclude_patterns: Vec<String>,
    include: GlobSet,
    exclude: GlobSet,
    dedup: bool,
}

impl Policy {
    /// Start building a custom policy
    pub fn builder(name: impl Into<String>) -> PolicyBuilder {
        PolicyBuilder::new(name)
    }

    /// Editor-symbol policy for the engine tree
    ///
    /// Ships `.pdb` and `.dll` files under the shared runtime plugins subtree
    /// only. Editor modules are excluded even if they were to land there.
    /// Deduplicates against the ledger.
    pub fn editor_symbols() -> Result<Self> {
        PolicyBuilder::new("editor-symbols")
            .extensions(["pdb", "dll"])
            .include(SHARED_RUNTIME_PLUGINS)
            .exclude(EDITOR_BINARIES)
            .dedup(true)
            .build()
    }

    /// Packaged-build policy for the project tree
    ///
    /// Ships every `.exe`, `.pdb` and `.dll` in the project except build-rule
    /// assemblies, the plugin's own directory and the finalized staged build.
    /// Never deduplicates.
    pub fn packaged_build(plugin_name: &str) -> Result<Self> {
        PolicyBuilder::new("packaged-build")
            .extensions(["exe", "pdb", "dll"])
            .exclude(BUILD_RULE_ASSEMBLIES)
            .exclude(format!("Plugins/{}/**", plugin_name))
            .exclude(FINALIZED_STAGED_OUTPUT)
            .dedup(false)
            .build()
    }

    /// Policy name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether runs under this policy consult the ledger
    pub fn dedup(&self) -> bool {
        self.dedup
    }

    /// Include patterns as given
    pub fn include_patterns(&self) -> &[String] {
        &self.include_patterns
    }

    /// Exclude patterns as given
    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude_patterns
    }

    /// Whether the include rule selects `relative`
    pub fn is_included(&self, relative: &str) -> bool {
        self.has_extension(relative)
            && (self.include_patterns.is_empty() || self.include.is_match(relative))
    }

    /// Whether any exclude rule vetoes `relative`
    pub fn is_excluded(&self, relative: &str) -> bool {
        self.exclude.is_match(relative)
    }

    /// Final decision for a `/`-separated root-relative path
    pub fn accepts(&self, relative: &str) -> bool {
        self.is_included(relative) && !self.is_excluded(relative)
    }

    fn has_extension(&self, relative: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        Path::new(relative)
            .extension()
            .map(|ext| self.extensions.contains(&ext.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or(false)
    }
}

/// Builder for [`Policy`]
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    name: String,
    extensions: BTreeSet<String>,
    include_patterns: Vec<String>,
    exclude_patterns: Vec<String>,
    dedup: bool,
}

impl PolicyBuilder {
    /// New builder with no rules; accepts every file until rules are added
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extensions: BTreeSet::new(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            dedup: false,
        }
    }

    /// Restrict to these extensions (without the leading dot)
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions.extend(
            extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase()),
        );
        self
    }

    /// Add an include pattern
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include_patterns.push(pattern.into());
        self
    }

    /// Add an exclude pattern
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Set whether the policy deduplicates against the ledger
    pub fn dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    /// Compile the patterns
    ///
    /// # Errors
    ///
    /// [`ShipError::InvalidPattern`] if any pattern fails to parse.
    pub fn build(self) -> Result<Policy> {
        let include = compile(&self.include_patterns)?;
        let exclude = compile(&self.exclude_patterns)?;
        Ok(Policy {
            name: self.name,
            extensions: self.extensions,
            include_patterns: self.include_patterns,
            exclude_patterns: self.exclude_patterns,
            include,
            exclude,
            dedup: self.dedup,
        })
    }
}

fn compile(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        // Windows paths compare case-insensitively, like the extension filter.
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .case_insensitive(true)
            .build()
            .map_err(|e| ShipError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ShipError::InvalidPattern {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })
}
