//! Core data types shared across symship
//!
//! - **Files**: [`CandidateFile`] pairs a root-relative path with its on-disk location
//! - **Pipeline state**: [`PipelineState`] names each step of an upload run
//! - **Reports**: [`RunReport`] records what one run did and how it ended

use crate::error::ShipError;
use crate::utils;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A file selected by a policy for possible archiving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Path relative to the scan root
    pub relative_path: PathBuf,
    /// Absolute location on disk
    pub absolute_path: PathBuf,
}

impl CandidateFile {
    /// Create a candidate from a scan root and a root-relative path
    pub fn new(root: &Path, relative_path: PathBuf) -> Self {
        let absolute_path = root.join(&relative_path);
        Self {
            relative_path,
            absolute_path,
        }
    }

    /// Entry name inside the archive (`/`-separated)
    pub fn archive_name(&self) -> String {
        utils::to_slash(&self.relative_path)
    }
}

/// Steps of an upload pipeline run
///
/// `Done` and `Failed` are terminal. A run with no new files moves from
/// `Filtering` straight to `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Not started
    Idle,
    /// Walking the root and applying the policy
    Classifying,
    /// Digesting candidates and checking the ledger
    Filtering,
    /// Writing the archive
    Archiving,
    /// Waiting on the uploader
    Uploading,
    /// Writing new digests to the ledger
    Committing,
    /// Finished successfully
    Done,
    /// Finished with an error
    Failed,
}

impl PipelineState {
    /// Whether the run has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Classifying => "classifying",
            PipelineState::Filtering => "filtering",
            PipelineState::Archiving => "archiving",
            PipelineState::Uploading => "uploading",
            PipelineState::Committing => "committing",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a single pipeline run
#[derive(Debug)]
pub struct RunReport {
    /// Name of the target ("engine", "project", ...)
    pub target: String,
    /// Terminal state reached
    pub state: PipelineState,
    /// Every state visited, in order, starting with `Idle`
    pub trail: Vec<PipelineState>,
    /// Files the classifier selected
    pub candidates: usize,
    /// Files placed in the archive
    pub new_files: usize,
    /// Files skipped because the ledger already had their digest
    pub known_files: usize,
    /// Files skipped because identical content was archived earlier in this run
    pub duplicate_files: usize,
    /// Total uncompressed bytes archived
    pub archived_bytes: u64,
    /// Whether the uploader was invoked and reported success
    pub uploaded: bool,
    /// Whether the ledger was written back
    pub ledger_committed: bool,
    /// State in which the run failed, if it did
    pub failed_in: Option<PipelineState>,
    /// The failure itself
    pub error: Option<ShipError>,
    /// Wall time of the run
    pub duration: Duration,
}

impl RunReport {
    pub(crate) fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            state: PipelineState::Idle,
            trail: vec![PipelineState::Idle],
            candidates: 0,
            new_files: 0,
            known_files: 0,
            duplicate_files: 0,
            archived_bytes: 0,
            uploaded: false,
            ledger_committed: false,
            failed_in: None,
            error: None,
            duration: Duration::ZERO,
        }
    }

    pub(crate) fn enter(&mut self, state: PipelineState) {
        self.state = state;
        self.trail.push(state);
    }

    /// Whether the run ended in `Done`
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Done
    }

    /// Whether the run finished without archiving anything
    pub fn is_noop(&self) -> bool {
        self.succeeded() && self.new_files == 0
    }

    /// Whether the run passed through `state`
    pub fn visited(&self, state: PipelineState) -> bool {
        self.trail.contains(&state)
    }
}
