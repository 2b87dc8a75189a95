//! # symship - post-build symbol shipping
//!
//! Packages debug symbols and binaries produced by a build, skips content that
//! earlier builds already delivered, archives the rest and hands the archive to
//! an external uploader. Alongside, it points the crash reporter in staged
//! builds at the right ingestion endpoint.
//!
//! ## Overview
//!
//! A post-build run does three independent things:
//! - **Staging**: copies the engine crash reporter into every staged build and
//!   patches its ini files with the ingestion endpoint
//! - **Engine symbols**: uploads shared runtime plugin symbols, deduplicated
//!   against a persisted ledger of content digests
//! - **Project artifacts**: uploads every project executable, library and
//!   symbol file
//!
//! ## Architecture
//!
//! - [`ArtifactClassifier`] walks a tree and applies a [`Policy`]
//! - [`ContentDigest`] fingerprints file bytes (SHA-256)
//! - [`DedupLedger`] is the persisted digest set; it only grows
//! - [`ArchiveBuilder`] writes a fresh zip archive atomically
//! - [`Uploader`] is the boundary to the external upload executable
//! - [`UploadPipeline`] sequences the above for one tree
//! - [`EndpointPatch`] and [`Stager`] handle staged builds
//! - [`PostBuild`] drives everything from a [`PostBuildConfig`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use symship::{PostBuild, PostBuildConfig, PostBuildOutcome, TargetKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PostBuildConfig::builder()
//!     .engine_root("/opt/UE_4.27/Engine")
//!     .project_root("/work/MyGame")
//!     .realm("acme")
//!     .project_token("0123abcd")
//!     .symbols_token("4567ef01")
//!     .target_kind(TargetKind::Game)
//!     .build()?;
//!
//! match PostBuild::new(config).run()? {
//!     PostBuildOutcome::Skipped { reason } => println!("skipped: {}", reason),
//!     PostBuildOutcome::Completed(report) => {
//!         println!("project: {} new files", report.project.new_files);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Ledger guarantees
//!
//! The ledger is written exactly once per run, after the uploader reported
//! success for an archive with at least one new file. A failed upload leaves
//! the ledger file byte-for-byte unchanged, so the next build retries the same
//! content. A run with nothing new never invokes the uploader and never
//! touches the ledger.
//!
//! ## Error Handling
//!
//! All fallible operations return `Result<T, ShipError>`. Only configuration
//! errors are fatal ([`ShipError::is_fatal`]); everything else is scoped to
//! one pipeline run or one staged directory and reported per target.

pub mod archive;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ini_patch;
pub mod ledger;
pub mod pipeline;
pub mod policy;
pub mod postbuild;
pub mod staging;
pub mod types;
pub mod uploader;

mod utils;

pub use archive::{ArchiveBuilder, ArchiveSummary};
pub use classifier::ArtifactClassifier;
pub use config::{PostBuildConfig, PostBuildConfigBuilder, TargetInfo, TargetKind};
pub use error::{Result, ShipError};
pub use fingerprint::ContentDigest;
pub use ini_patch::{EndpointPatch, PatchOutcome};
pub use ledger::DedupLedger;
pub use pipeline::UploadPipeline;
pub use policy::{Policy, PolicyBuilder};
pub use postbuild::{PostBuild, PostBuildOutcome, PostBuildReport};
pub use staging::{Stager, StagingReport};
pub use types::{CandidateFile, PipelineState, RunReport};
pub use uploader::{CommandUploader, Uploader};
pub use utils::{format_bytes, normalize_separators};
