//! Post-build driver
//!
//! [`PostBuild`] runs the whole post-build step for one build:
//!
//! 1. Decide whether this build ships symbols at all.
//! 2. Prepare staged builds (crash reporter binary and endpoint patches).
//! 3. Upload shared engine plugin symbols, deduplicated against the ledger.
//! 4. Upload every project binary and symbol file, without dedup.
//!
//! Steps 2 to 4 are independent. A failure in one is recorded in the report
//! and the next step still runs. The driver only returns `Err` for problems
//! that make any work impossible.

use crate::config::PostBuildConfig;
use crate::error::Result;
use crate::ini_patch::EndpointPatch;
use crate::pipeline::UploadPipeline;
use crate::policy::Policy;
use crate::staging::{Stager, StagingReport};
use crate::types::RunReport;
use crate::uploader::{CommandUploader, Uploader};
use tracing::info;

/// Name of the engine-tree upload target
pub const ENGINE_TARGET: &str = "engine";

/// Name of the project-tree upload target
pub const PROJECT_TARGET: &str = "project";

/// Everything a completed post-build step did
#[derive(Debug)]
pub struct PostBuildReport {
    /// Staged build preparation
    pub staging: StagingReport,
    /// Engine plugin symbols run; `None` when editor symbol upload is disabled
    pub engine: Option<RunReport>,
    /// Project artifacts run
    pub project: RunReport,
}

impl PostBuildReport {
    /// Runs that ended in `Failed`
    pub fn failed_runs(&self) -> Vec<&RunReport> {
        self.engine
            .iter()
            .chain(std::iter::once(&self.project))
            .filter(|r| !r.succeeded())
            .collect()
    }

    /// Whether every unit of work succeeded
    pub fn is_clean(&self) -> bool {
        self.staging.is_clean() && self.failed_runs().is_empty()
    }
}

/// Result of a post-build invocation
#[derive(Debug)]
pub enum PostBuildOutcome {
    /// Nothing was done for this build
    Skipped {
        /// Why the build was skipped
        reason: String,
    },
    /// All steps ran; see the report for per-target results
    Completed(PostBuildReport),
}

/// Drives staging and both upload pipelines for one build
#[derive(Debug, Clone)]
pub struct PostBuild {
    config: PostBuildConfig,
}

impl PostBuild {
    /// Create a driver for a validated configuration
    pub fn new(config: PostBuildConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub fn config(&self) -> &PostBuildConfig {
        &self.config
    }

    /// Run with the configured external uploader
    pub fn run(&self) -> Result<PostBuildOutcome> {
        let uploader = CommandUploader::new(
            self.config.uploader_path(),
            self.config.realm(),
            self.config.symbols_token(),
        );
        self.run_with(&uploader)
    }

    /// Run with a caller-supplied uploader
    pub fn run_with(&self, uploader: &dyn Uploader) -> Result<PostBuildOutcome> {
        let config = &self.config;

        for (key, value) in config.describe() {
            info!("Option: {} = {}", key, value);
        }
        info!("Debug build: {}", config.is_debug_build());

        if let Some(reason) = config.skip_reason() {
            info!("{}, exiting", reason);
            return Ok(PostBuildOutcome::Skipped {
                reason: reason.to_string(),
            });
        }

        let editor_policy = Policy::editor_symbols()?;
        let packaged_policy = Policy::packaged_build(config.plugin_name())?;
        let patch = EndpointPatch::crash_reporter(config.realm(), config.project_token())?;

        info!("Archive: {:?}", config.archive_path());

        let staging = Stager::new(
            config.staged_builds_dir(),
            config.crash_reporter_path(),
            patch,
        )
        .run();

        let engine = if config.upload_editor_symbols() {
            let pipeline = UploadPipeline::new(
                ENGINE_TARGET,
                config.engine_root(),
                editor_policy,
                config.archive_path(),
                uploader,
            )
            .with_ledger(config.ledger_path());
            Some(pipeline.run())
        } else {
            info!("Editor symbol upload disabled, skipping engine tree");
            None
        };

        let project = UploadPipeline::new(
            PROJECT_TARGET,
            config.project_root(),
            packaged_policy,
            config.archive_path(),
            uploader,
        )
        .keep_archive(config.keep_project_archive())
        .run();

        Ok(PostBuildOutcome::Completed(PostBuildReport {
            staging,
            engine,
            project,
        }))
    }
}
