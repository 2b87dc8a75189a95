//! Artifact classification
//!
//! The [`ArtifactClassifier`] walks a root directory, keeps the regular files a
//! [`Policy`] accepts and returns them deduplicated by relative path and sorted
//! ascending. The result is a pure function of the filesystem at call time, so
//! two calls against an unchanged tree produce the same sequence.
//!
//! ```rust,no_run
//! use symship::{ArtifactClassifier, Policy};
//! use std::path::Path;
//!
//! # fn main() -> symship::Result<()> {
//! let classifier = ArtifactClassifier::new();
//! let files = classifier.classify(Path::new("/opt/UE_4.27/Engine"), &Policy::editor_symbols()?)?;
//! for file in &files {
//!     println!("{}", file.archive_name());
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, ShipError};
use crate::policy::Policy;
use crate::types::CandidateFile;
use crate::utils;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Enumerates and filters candidate files under a root
#[derive(Debug, Clone, Default)]
pub struct ArtifactClassifier {
    follow_symlinks: bool,
}

impl ArtifactClassifier {
    /// Classifier that does not follow symbolic links
    pub fn new() -> Self {
        Self::default()
    }

    /// Set symbolic link following behavior
    ///
    /// When following links, a file reachable through several links still
    /// appears once, keyed by its first relative path in sorted order.
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Select every file under `root` that `policy` accepts
    ///
    /// # Errors
    ///
    /// - [`ShipError::Configuration`] if `root` is not a directory
    /// - [`ShipError::WalkDir`] if traversal fails part way (permissions, loops)
    pub fn classify(&self, root: &Path, policy: &Policy) -> Result<Vec<CandidateFile>> {
        if !root.is_dir() {
            return Err(ShipError::configuration(format!(
                "scan root {:?} is not a directory",
                root
            )));
        }

        let start = Instant::now();
        let mut selected: BTreeMap<String, CandidateFile> = BTreeMap::new();
        let mut scanned = 0usize;
        let mut excluded = 0usize;

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            scanned += 1;

            let relative = utils::make_relative(entry.path(), root)?;
            let key = utils::to_slash(&relative);

            if !policy.is_included(&key) {
                continue;
            }
            if policy.is_excluded(&key) {
                trace!("Excluded by {}: {}", policy.name(), key);
                excluded += 1;
                continue;
            }

            selected
                .entry(key)
                .or_insert_with(|| CandidateFile::new(root, relative));
        }

        let files: Vec<CandidateFile> = selected.into_values().collect();
        debug!(
            policy = policy.name(),
            root = %root.display(),
            scanned,
            excluded,
            selected = files.len(),
            "Classified files in {:?}",
            start.elapsed()
        );

        Ok(files)
    }
}
