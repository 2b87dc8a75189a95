//! Upload pipeline orchestration
//!
//! One [`UploadPipeline`] run takes a tree through
//!
//! ```text
//! Idle → Classifying → Filtering → Archiving → Uploading → Committing → Done
//!                          │                                   ▲
//!                          └── no new files ───────────────────┴──→ Done
//! ```
//!
//! with `Failed` reachable from every state. Failures are captured in the
//! returned [`RunReport`] rather than propagated, so one target failing never
//! stops another.
//!
//! The ledger is the correctness-critical piece. It is loaded once when the run
//! starts filtering and written back exactly once, in `Committing`, which is only
//! reached after the uploader reported success for an archive that contained at
//! least one new file. A failed upload leaves the ledger file byte-for-byte as it
//! was. The archive is deleted after the upload attempt whatever the outcome,
//! unless the pipeline was asked to keep it for inspection.

use crate::archive::ArchiveBuilder;
use crate::classifier::ArtifactClassifier;
use crate::error::{Result, ShipError};
use crate::fingerprint::ContentDigest;
use crate::ledger::DedupLedger;
use crate::policy::Policy;
use crate::types::{CandidateFile, PipelineState, RunReport};
use crate::uploader::Uploader;
use crate::utils;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Candidates split by ledger membership
#[derive(Debug, Default)]
struct Selection {
    fresh: Vec<CandidateFile>,
    digests: Vec<ContentDigest>,
    known: usize,
    duplicates: usize,
}

/// Classify, dedup, archive, upload and commit one content tree
pub struct UploadPipeline<'a> {
    target: String,
    root: PathBuf,
    policy: Policy,
    classifier: ArtifactClassifier,
    archive: ArchiveBuilder,
    uploader: &'a dyn Uploader,
    ledger_path: Option<PathBuf>,
    keep_archive: bool,
}

impl<'a> UploadPipeline<'a> {
    /// Create a pipeline for `root` under `policy`
    ///
    /// Policies with dedup enabled also need [`UploadPipeline::with_ledger`].
    pub fn new(
        target: impl Into<String>,
        root: impl Into<PathBuf>,
        policy: Policy,
        archive_path: impl Into<PathBuf>,
        uploader: &'a dyn Uploader,
    ) -> Self {
        Self {
            target: target.into(),
            root: root.into(),
            policy,
            classifier: ArtifactClassifier::new(),
            archive: ArchiveBuilder::new(archive_path),
            uploader,
            ledger_path: None,
            keep_archive: false,
        }
    }

    /// Ledger consulted and updated by dedup-eligible policies
    pub fn with_ledger(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = Some(path.into());
        self
    }

    /// Replace the default classifier
    pub fn with_classifier(mut self, classifier: ArtifactClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Leave the archive on disk after the upload attempt
    pub fn keep_archive(mut self, keep: bool) -> Self {
        self.keep_archive = keep;
        self
    }

    /// Target name used in logs and reports
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Where this pipeline writes its archive
    pub fn archive_path(&self) -> &Path {
        self.archive.path()
    }

    /// Execute one run to a terminal state
    pub fn run(&self) -> RunReport {
        let start = Instant::now();
        let mut report = RunReport::new(&self.target);

        info!(
            target_name = %self.target,
            root = %self.root.display(),
            policy = self.policy.name(),
            dedup = self.policy.dedup(),
            "Starting upload run"
        );

        if let Err(e) = self.execute(&mut report) {
            let failed_in = report.state;
            error!(
                target_name = %self.target,
                state = %failed_in,
                "Upload run failed: {}",
                e
            );
            report.failed_in = Some(failed_in);
            report.enter(PipelineState::Failed);
            report.error = Some(e);
        }

        report.duration = start.elapsed();
        debug!(
            target_name = %self.target,
            trail = ?report.trail,
            "Run finished in {:?}",
            report.duration
        );
        report
    }

    fn execute(&self, report: &mut RunReport) -> Result<()> {
        report.enter(PipelineState::Classifying);
        let candidates = self.classifier.classify(&self.root, &self.policy)?;
        report.candidates = candidates.len();
        info!(
            target_name = %self.target,
            candidates = candidates.len(),
            "Classified candidate files"
        );

        report.enter(PipelineState::Filtering);
        let mut ledger = self.load_ledger()?;
        let selection = select_fresh(candidates, ledger.as_ref())?;
        report.new_files = selection.fresh.len();
        report.known_files = selection.known;
        report.duplicate_files = selection.duplicates;

        if selection.fresh.is_empty() {
            self.archive.remove_stale()?;
            info!(
                target_name = %self.target,
                candidates = report.candidates,
                known = selection.known,
                "No new files, skipping archive and upload"
            );
            report.enter(PipelineState::Done);
            return Ok(());
        }

        report.enter(PipelineState::Archiving);
        let summary = self.archive.build(&selection.fresh)?;
        report.archived_bytes = summary.uncompressed_bytes;

        report.enter(PipelineState::Uploading);
        info!(
            target_name = %self.target,
            files = summary.entries,
            known = selection.known,
            uploader = %self.uploader.describe(),
            "Uploading {}",
            utils::format_bytes(summary.uncompressed_bytes)
        );
        let outcome = self.uploader.upload(self.archive.path());
        self.cleanup_archive();
        outcome?;
        report.uploaded = true;
        info!(target_name = %self.target, files = summary.entries, "Upload succeeded");

        if let Some(ledger) = ledger.as_mut() {
            report.enter(PipelineState::Committing);
            let before = ledger.len();
            for digest in selection.digests {
                ledger.add(digest);
            }
            ledger.persist()?;
            report.ledger_committed = true;
            info!(
                target_name = %self.target,
                added = ledger.len() - before,
                total = ledger.len(),
                "Ledger committed"
            );
        }

        report.enter(PipelineState::Done);
        Ok(())
    }

    fn load_ledger(&self) -> Result<Option<DedupLedger>> {
        if !self.policy.dedup() {
            return Ok(None);
        }
        match &self.ledger_path {
            Some(path) => Ok(Some(DedupLedger::load(path))),
            None => Err(ShipError::configuration(format!(
                "policy '{}' deduplicates but target '{}' has no ledger path",
                self.policy.name(),
                self.target
            ))),
        }
    }

    fn cleanup_archive(&self) {
        if self.keep_archive {
            info!("Keeping archive {:?} for inspection", self.archive.path());
            return;
        }
        if let Err(e) = utils::remove_file_if_exists(self.archive.path()) {
            warn!("Could not remove archive {:?}: {}", self.archive.path(), e);
        }
    }
}

/// Partition candidates into files to archive and files already delivered
///
/// Without a ledger every candidate is fresh and nothing is hashed. With one,
/// each file is digested; digests in the ledger are skipped, and so is content
/// already accepted earlier in this run.
fn select_fresh(candidates: Vec<CandidateFile>, ledger: Option<&DedupLedger>) -> Result<Selection> {
    let Some(ledger) = ledger else {
        return Ok(Selection {
            fresh: candidates,
            ..Default::default()
        });
    };

    let mut selection = Selection::default();
    let mut seen = HashSet::new();

    for candidate in candidates {
        let digest = ContentDigest::of_file(&candidate.absolute_path)?;
        if ledger.contains(&digest) {
            trace!("Already uploaded: {} ({})", candidate.archive_name(), digest.short());
            selection.known += 1;
        } else if !seen.insert(digest.clone()) {
            debug!("Duplicate content in this run: {}", candidate.archive_name());
            selection.duplicates += 1;
        } else {
            selection.fresh.push(candidate);
            selection.digests.push(digest);
        }
    }

    Ok(selection)
}
