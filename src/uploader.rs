//! External uploader boundary
//!
//! The symbol server protocol is owned by a separate executable. This crate
//! only launches it with `(realm, symbols_token, archive_path)` as positional
//! arguments and reads its exit status. Output is not parsed.
//!
//! The [`Uploader`] trait is the seam the pipeline depends on, so runs can be
//! driven by an in-process implementation in tests.

use crate::error::{Result, ShipError};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Delivers a finished archive somewhere
pub trait Uploader {
    /// Upload `archive`. `Ok(())` means the remote side accepted it.
    fn upload(&self, archive: &Path) -> Result<()>;

    /// Short description for logs, without secrets
    fn describe(&self) -> String;
}

/// Runs the uploader executable as a blocking subprocess
///
/// There is no timeout: a hung uploader hangs the run, and the surrounding
/// build system is expected to enforce its own limit.
#[derive(Debug, Clone)]
pub struct CommandUploader {
    executable: PathBuf,
    realm: String,
    symbols_token: String,
}

impl CommandUploader {
    /// Create an uploader invoking `executable`
    pub fn new(
        executable: impl Into<PathBuf>,
        realm: impl Into<String>,
        symbols_token: impl Into<String>,
    ) -> Self {
        Self {
            executable: executable.into(),
            realm: realm.into(),
            symbols_token: symbols_token.into(),
        }
    }

    /// Path of the executable
    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl Uploader for CommandUploader {
    fn upload(&self, archive: &Path) -> Result<()> {
        if !self.executable.is_file() {
            return Err(ShipError::UploaderMissing(self.executable.clone()));
        }

        debug!(
            "Running {:?} {} <symbols token> {:?}",
            self.executable, self.realm, archive
        );

        let status = Command::new(&self.executable)
            .arg(&self.realm)
            .arg(&self.symbols_token)
            .arg(archive)
            .status()
            .map_err(|source| ShipError::UploaderLaunch {
                path: self.executable.clone(),
                source,
            })?;

        if !status.success() {
            return Err(ShipError::UploadRejected {
                status: status.to_string(),
            });
        }

        info!("Uploader accepted {:?}", archive);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} (realm {})", self.executable.display(), self.realm)
    }
}
