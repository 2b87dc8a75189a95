//! Crash reporter endpoint patching
//!
//! Staged builds carry ini files that tell the crash reporter where to send
//! reports. [`EndpointPatch`] rewrites one key in one section of such a file,
//! and only when the current value does not already point at the expected
//! host. All other sections and keys are written back as they were read.
//!
//! Applying a patch twice is a no-op the second time: the file is not
//! rewritten and its modification time does not change.

use crate::error::{Result, ShipError};
use crate::utils;
use ini::{EscapePolicy, Ini, ParseOption, WriteOption};
use regex::{Regex, RegexBuilder};
use std::path::Path;
use tracing::info;

/// Section the crash reporter reads its settings from
pub const CRASH_REPORTER_SECTION: &str = "CrashReportClient";

/// Key holding the ingestion endpoint
pub const DATA_ROUTER_KEY: &str = "DataRouterUrl";

/// Value the engine ships with when nothing overrides it
pub const STOCK_DATA_ROUTER: &str = "https://datarouter.ol.epicgames.com";

/// Endpoints on this host are considered already patched
pub const BACKTRACE_HOST_PATTERN: &str = r"^https://unreal\.backtrace\.io/";

/// Result of applying a patch to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The key was set; `previous` is the old value or the stock default
    Applied { previous: String },
    /// The key already pointed at the expected host; file untouched
    AlreadyCurrent { current: String },
}

impl PatchOutcome {
    /// Whether the file was rewritten
    pub fn was_applied(&self) -> bool {
        matches!(self, PatchOutcome::Applied { .. })
    }
}

/// Sets one ini key unless it already matches a host pattern
#[derive(Debug, Clone)]
pub struct EndpointPatch {
    section: String,
    key: String,
    host_pattern: Regex,
    endpoint: String,
    default_value: String,
}

impl EndpointPatch {
    /// Create a patch for `section.key`
    ///
    /// `host_pattern` is matched case-insensitively against the current value.
    pub fn new(
        section: impl Into<String>,
        key: impl Into<String>,
        host_pattern: &str,
        endpoint: impl Into<String>,
    ) -> Result<Self> {
        let host_pattern = RegexBuilder::new(host_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ShipError::InvalidPattern {
                pattern: host_pattern.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            section: section.into(),
            key: key.into(),
            host_pattern,
            endpoint: endpoint.into(),
            default_value: String::new(),
        })
    }

    /// Crash reporter patch routing reports to `realm` with `project_token`
    pub fn crash_reporter(realm: &str, project_token: &str) -> Result<Self> {
        let mut patch = Self::new(
            CRASH_REPORTER_SECTION,
            DATA_ROUTER_KEY,
            BACKTRACE_HOST_PATTERN,
            Self::endpoint_url(realm, project_token),
        )?;
        patch.default_value = STOCK_DATA_ROUTER.to_string();
        Ok(patch)
    }

    /// Compose the ingestion URL for a realm and project token
    pub fn endpoint_url(realm: &str, project_token: &str) -> String {
        format!("https://unreal.backtrace.io/post/{}/{}", realm, project_token)
    }

    /// Value written by this patch
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether `value` already points at the expected host
    pub fn is_current(&self, value: &str) -> bool {
        self.host_pattern.is_match(value.trim())
    }

    /// Apply the patch to the ini file at `path`
    ///
    /// A missing file is treated as an empty document and created. Parent
    /// directories must exist.
    ///
    /// # Errors
    ///
    /// - [`ShipError::Ini`] if the existing file cannot be parsed
    /// - [`ShipError::Io`] if the file cannot be written
    pub fn apply(&self, path: &Path) -> Result<PatchOutcome> {
        let mut ini = if path.exists() {
            Ini::load_from_file_opt(path, parse_option()).map_err(|e| ShipError::Ini {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            Ini::new()
        };

        let current = ini
            .get_from(Some(self.section.as_str()), &self.key)
            .map(str::to_string);

        if let Some(current) = current.as_deref() {
            if self.is_current(current) {
                info!(
                    file = %path.display(),
                    "Endpoint already current, patch skipped: {}",
                    current
                );
                return Ok(PatchOutcome::AlreadyCurrent {
                    current: current.to_string(),
                });
            }
        }

        let previous = current.unwrap_or_else(|| self.default_value.clone());
        ini.with_section(Some(self.section.as_str()))
            .set(self.key.as_str(), self.endpoint.as_str());

        let mut body = Vec::new();
        ini.write_to_opt(&mut body, write_option())?;
        utils::atomic_write(path, &body)?;

        info!(
            file = %path.display(),
            "Patch applied: replaced endpoint '{}' with '{}'",
            previous,
            self.endpoint
        );
        Ok(PatchOutcome::Applied { previous })
    }
}

fn parse_option() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    }
}

fn write_option() -> WriteOption {
    WriteOption {
        escape_policy: EscapePolicy::Nothing,
        ..WriteOption::default()
    }
}
