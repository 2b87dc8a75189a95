//! Archive building
//!
//! [`ArchiveBuilder`] packs a list of [`CandidateFile`]s into a zip archive,
//! one entry per file, named by the file's `/`-separated relative path.
//!
//! Every build starts from scratch: a stale archive at the target path is
//! deleted first, and the new archive is assembled in a temporary file next to
//! the target and only renamed into place once complete. An interrupted or
//! failed build therefore never leaves a truncated archive at the final path.
//!
//! Temporary files are named `<archive name>.<random>.partial`. A process
//! killed mid-build leaves one behind; [`ArchiveBuilder::remove_stale`] sweeps
//! them together with the archive itself.
//!
//! Entries are written in the given order with a fixed timestamp, so the same
//! file list over the same bytes gives a byte-identical archive.

use crate::error::{Result, ShipError};
use crate::types::CandidateFile;
use crate::utils;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::Builder;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Suffix of in-progress archives
const PARTIAL_SUFFIX: &str = ".partial";

/// Entries at or above this size need zip64 headers
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Summary of a finished archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Final location of the archive
    pub path: PathBuf,
    /// Number of entries written
    pub entries: usize,
    /// Total uncompressed bytes of all entries
    pub uncompressed_bytes: u64,
}

/// Builds a fresh archive at a fixed path
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    archive_path: PathBuf,
    compression: CompressionMethod,
}

impl ArchiveBuilder {
    /// Builder writing Deflate-compressed entries to `archive_path`
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
            compression: CompressionMethod::Deflated,
        }
    }

    /// Store entries uncompressed instead
    pub fn stored(mut self) -> Self {
        self.compression = CompressionMethod::Stored;
        self
    }

    /// Where the archive is written
    pub fn path(&self) -> &Path {
        &self.archive_path
    }

    /// Remove any archive left at the target path
    ///
    /// Also removes partial archives left by interrupted builds. Returns
    /// whether anything stale was found.
    pub fn remove_stale(&self) -> Result<bool> {
        let mut removed = utils::remove_file_if_exists(&self.archive_path)?;
        if removed {
            debug!("Removed stale archive {:?}", self.archive_path);
        }

        let dir = utils::parent_dir(&self.archive_path);
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(e.into()),
        };
        let prefix = self.partial_prefix();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !(name.starts_with(&prefix) && name.ends_with(PARTIAL_SUFFIX)) {
                continue;
            }
            if !entry.file_type()?.is_file() {
                warn!("Not removing {:?}: not a regular file", entry.path());
                continue;
            }
            utils::remove_file_if_exists(&entry.path())?;
            debug!("Removed partial archive {:?}", entry.path());
            removed = true;
        }
        Ok(removed)
    }

    fn partial_prefix(&self) -> String {
        let name = self
            .archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        format!("{}.", name)
    }

    /// Build the archive from `files`
    ///
    /// An empty list produces a valid, empty archive.
    ///
    /// # Errors
    ///
    /// - [`ShipError::Unreadable`] if a source file cannot be read
    /// - [`ShipError::Archive`] if the zip writer fails
    ///
    /// On error nothing is left at the archive path.
    pub fn build(&self, files: &[CandidateFile]) -> Result<ArchiveSummary> {
        self.remove_stale()?;

        let dir = utils::parent_dir(&self.archive_path);
        fs::create_dir_all(dir)?;
        let prefix = self.partial_prefix();
        let temp = Builder::new()
            .prefix(&prefix)
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(dir)?;

        let mut writer = ZipWriter::new(temp);
        let mut uncompressed_bytes = 0u64;

        for file in files {
            let mut source = File::open(&file.absolute_path)
                .map_err(|e| ShipError::unreadable(&file.absolute_path, e))?;
            let size = source
                .metadata()
                .map_err(|e| ShipError::unreadable(&file.absolute_path, e))?
                .len();

            let options = SimpleFileOptions::default()
                .compression_method(self.compression)
                .last_modified_time(DateTime::default())
                .large_file(size >= ZIP64_THRESHOLD);

            writer.start_file(file.archive_name(), options)?;
            let copied = io::copy(&mut source, &mut writer)
                .map_err(|e| ShipError::unreadable(&file.absolute_path, e))?;
            uncompressed_bytes += copied;
        }

        let temp = writer.finish()?;
        temp.persist(&self.archive_path)
            .map_err(|e| ShipError::Io(e.error))?;

        info!(
            "Archived {} files ({}) into {:?}",
            files.len(),
            utils::format_bytes(uncompressed_bytes),
            self.archive_path
        );

        Ok(ArchiveSummary {
            path: self.archive_path.clone(),
            entries: files.len(),
            uncompressed_bytes,
        })
    }
}
