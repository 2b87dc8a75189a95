//! Error types for symship
//!
//! This module defines every error a post-build run can produce. The variants
//! fall into four families, and callers are expected to treat them differently:
//!
//! - **Configuration** errors are fatal and abort before any pipeline runs.
//! - **I/O** errors (reading, walking, archiving) abort the current pipeline run
//!   only; sibling pipelines and the staging step keep going.
//! - **Upload** errors abort the commit of a single run. The ledger is left as it
//!   was before the run.
//! - **Ledger corruption** is recovered locally by substituting an empty ledger and
//!   is only ever reported as a warning.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the symship library
pub type Result<T> = std::result::Result<T, ShipError>;

/// Main error type for all symship operations
#[derive(Debug, Error)]
pub enum ShipError {
    /// Missing or invalid required input
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A specific file could not be read
    #[error("Cannot read {path:?}: {source}")]
    Unreadable {
        /// File that failed to open or read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Glob pattern could not be compiled
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Parser message
        reason: String,
    },

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Archive creation failed
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Ini document could not be parsed or written
    #[error("Ini error in {path:?}: {reason}")]
    Ini {
        /// Ini file being patched
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// The uploader executable does not exist
    #[error("Uploader not found at {0:?}")]
    UploaderMissing(PathBuf),

    /// The uploader process could not be started
    #[error("Failed to launch uploader {path:?}: {source}")]
    UploaderLaunch {
        /// Uploader executable
        path: PathBuf,
        /// Spawn error
        #[source]
        source: std::io::Error,
    },

    /// The uploader ran and reported failure
    #[error("Uploader exited with {status}")]
    UploadRejected {
        /// Exit status as reported by the OS
        status: String,
    },

    /// Persisted ledger could not be understood
    #[error("Ledger at {path:?} is corrupt: {reason}")]
    LedgerCorrupt {
        /// Ledger document location
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShipError {
    /// Create a configuration error with a custom message
    pub fn configuration(msg: impl Into<String>) -> Self {
        ShipError::Configuration(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        ShipError::Internal(msg.into())
    }

    /// Wrap an I/O error with the path that caused it
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ShipError::Unreadable {
            path: path.into(),
            source,
        }
    }

    /// Check if this error must abort the whole process
    ///
    /// Only configuration problems are fatal. Everything else is scoped to a
    /// single pipeline run or a single staged directory.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShipError::Configuration(_))
    }

    /// Check if this error came from the external upload step
    pub fn is_upload_failure(&self) -> bool {
        matches!(
            self,
            ShipError::UploaderMissing(_)
                | ShipError::UploaderLaunch { .. }
                | ShipError::UploadRejected { .. }
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            ShipError::Configuration(_) => {
                format!("{}. Check the arguments passed by the build step.", self)
            }
            ShipError::UploaderMissing(path) => {
                format!(
                    "Uploader not found at {:?}. Reinstall the plugin content or check --project-dir.",
                    path
                )
            }
            ShipError::UploadRejected { status } => {
                format!(
                    "Symbol upload failed ({}). Nothing was recorded as uploaded; the next build will retry.",
                    status
                )
            }
            _ => self.to_string(),
        }
    }
}
