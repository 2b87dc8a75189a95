//! Staged build preparation
//!
//! Each staged build under `Saved/StagedBuilds/<name>` gets the engine's crash
//! reporter binary and a set of ini files pointing that reporter at the
//! ingestion endpoint. Every staged directory, and every ini file inside it, is
//! its own failure domain: a problem with one is logged and the rest carry on.

use crate::error::Result;
use crate::ini_patch::{EndpointPatch, PatchOutcome};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Staged build the packaging step always produces
pub const DEFAULT_STAGED_DIR: &str = "WindowsNoEditor";

/// Crash reporter location inside a staged build
const CRASH_REPORTER_DEST: &str = "Engine/Binaries/Win64";

/// Ini files patched in each staged build, relative to the staged root
pub const PATCHED_INI_FILES: &[&str] = &[
    "Engine/Programs/CrashReportClient/Config/DefaultEngine.ini",
    "Engine/Programs/CrashReportClient/Config/UserEngine.ini",
    "Engine/Programs/CrashReportClient/Config/BaseEngine.ini",
    "Engine/Config/DefaultEngine.ini",
    "Engine/Config/UserEngine.ini",
    "Engine/Config/BaseEngine.ini",
    "Engine/Config/Base.ini",
];

/// What happened to one ini file
#[derive(Debug)]
pub struct IniResult {
    /// File that was patched
    pub path: PathBuf,
    /// Outcome, or the error message if patching failed
    pub outcome: std::result::Result<PatchOutcome, String>,
}

/// What happened to one staged directory
#[derive(Debug)]
pub struct StagedDirReport {
    /// Directory name under the staged builds root
    pub name: String,
    /// Whether the crash reporter binary was copied in
    pub crash_reporter_copied: bool,
    /// Per-file patch results
    pub ini_results: Vec<IniResult>,
    /// Error that stopped work on this directory early
    pub error: Option<String>,
}

impl StagedDirReport {
    /// Number of files rewritten
    pub fn applied(&self) -> usize {
        self.ini_results
            .iter()
            .filter(|r| matches!(r.outcome, Ok(PatchOutcome::Applied { .. })))
            .count()
    }

    /// Number of files left untouched because they were already current
    pub fn skipped(&self) -> usize {
        self.ini_results
            .iter()
            .filter(|r| matches!(r.outcome, Ok(PatchOutcome::AlreadyCurrent { .. })))
            .count()
    }

    /// Number of files that could not be patched
    pub fn failed(&self) -> usize {
        self.ini_results.iter().filter(|r| r.outcome.is_err()).count()
    }
}

/// Outcome of the whole staging step
#[derive(Debug, Default)]
pub struct StagingReport {
    /// Set when the crash reporter binary was missing and nothing was staged
    pub skipped_reason: Option<String>,
    /// One entry per staged directory processed
    pub dirs: Vec<StagedDirReport>,
}

impl StagingReport {
    /// Whether every directory and file was handled without error
    pub fn is_clean(&self) -> bool {
        self.skipped_reason.is_none()
            && self.dirs.iter().all(|d| d.error.is_none() && d.failed() == 0)
    }
}

/// Copies the crash reporter and patches ini files across staged builds
#[derive(Debug, Clone)]
pub struct Stager {
    staged_root: PathBuf,
    crash_reporter: PathBuf,
    patch: EndpointPatch,
}

impl Stager {
    /// Create a stager for builds under `staged_root`
    pub fn new(
        staged_root: impl Into<PathBuf>,
        crash_reporter: impl Into<PathBuf>,
        patch: EndpointPatch,
    ) -> Self {
        Self {
            staged_root: staged_root.into(),
            crash_reporter: crash_reporter.into(),
            patch,
        }
    }

    /// Names of staged build directories
    ///
    /// Always includes [`DEFAULT_STAGED_DIR`], even before the first packaging
    /// run creates it. Sorted and deduplicated.
    pub fn discover(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = BTreeSet::new();

        match fs::read_dir(&self.staged_root) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                        names.insert(entry.file_name().to_string_lossy().into_owned());
                    }
                }
            }
            Err(e) => info!("No staged builds at {:?}: {}", self.staged_root, e),
        }
        names.insert(DEFAULT_STAGED_DIR.to_string());

        let names: Vec<String> = names.into_iter().collect();
        if names.len() > 1 {
            warn!("Unexpected staged directories found: {}", names.join(", "));
        }
        info!("Staged dirs: {}", names.join(", "));
        names
    }

    /// Stage every discovered directory
    pub fn run(&self) -> StagingReport {
        if !self.crash_reporter.is_file() {
            let reason = format!("cannot find crash reporter at {:?}", self.crash_reporter);
            error!("{}, skipping staged builds", reason);
            return StagingReport {
                skipped_reason: Some(reason),
                dirs: Vec::new(),
            };
        }

        let dirs = self
            .discover()
            .into_iter()
            .map(|name| self.stage_dir(&name))
            .collect();

        StagingReport {
            skipped_reason: None,
            dirs,
        }
    }

    /// Copy the crash reporter into one staged build and patch its ini files
    pub fn stage_dir(&self, name: &str) -> StagedDirReport {
        let staged = self.staged_root.join(name);
        let mut report = StagedDirReport {
            name: name.to_string(),
            crash_reporter_copied: false,
            ini_results: Vec::new(),
            error: None,
        };

        match self.copy_crash_reporter(&staged) {
            Ok(dest) => {
                info!("Copied crash reporter to {:?}", dest);
                report.crash_reporter_copied = true;
            }
            Err(e) => {
                error!("Staging {} failed: {}", name, e);
                report.error = Some(e.to_string());
                return report;
            }
        }

        for relative in PATCHED_INI_FILES {
            let path = staged.join(relative);
            let outcome = self.patch_one(&path).map_err(|e| {
                error!("Could not patch {:?}: {}", path, e);
                e.to_string()
            });
            report.ini_results.push(IniResult { path, outcome });
        }

        info!(
            staged_dir = name,
            applied = report.applied(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Endpoint patching finished"
        );
        report
    }

    fn copy_crash_reporter(&self, staged: &Path) -> Result<PathBuf> {
        let dest_dir = staged.join(CRASH_REPORTER_DEST);
        fs::create_dir_all(&dest_dir)?;
        let file_name = self
            .crash_reporter
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("CrashReportClient.exe"));
        let dest = dest_dir.join(file_name);
        fs::copy(&self.crash_reporter, &dest)?;
        Ok(dest)
    }

    fn patch_one(&self, path: &Path) -> Result<PatchOutcome> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.patch.apply(path)
    }
}
