//! Run configuration
//!
//! [`PostBuildConfig`] is the single immutable input to a post-build run. It is
//! assembled with [`PostBuildConfigBuilder`], which validates everything up
//! front: a missing root or token is a configuration error and nothing runs.
//!
//! Components never see the whole config. The driver hands each one only the
//! slice it needs (roots and policy for classification, realm and token for the
//! uploader, a path for the ledger).
//!
//! ```rust,no_run
//! use symship::{PostBuildConfig, TargetKind};
//!
//! # fn main() -> symship::Result<()> {
//! let config = PostBuildConfig::builder()
//!     .engine_root("/opt/UE_4.27/Engine")
//!     .project_root("/work/MyGame")
//!     .realm("acme")
//!     .project_token("0123abcd")
//!     .symbols_token("4567ef01")
//!     .target_kind(TargetKind::Game)
//!     .build()?;
//! assert!(!config.is_debug_build());
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, ShipError};
use crate::utils;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Plugin directory name the tool ships in
pub const DEFAULT_PLUGIN_NAME: &str = "BacktraceIntegration";

/// Ledger file name inside the plugin directory
pub const LEDGER_FILE_NAME: &str = "backtrace_state.json";

/// Archive file name at the project root
pub const ARCHIVE_FILE_NAME: &str = "symbols.zip";

/// Uploader executable name inside the plugin content directory
pub const UPLOADER_FILE_NAME: &str = "uploader.exe";

/// Kind of build target that triggered the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TargetKind {
    /// Packaged game, the only release kind
    Game,
    /// Client-only build
    Client,
    /// Dedicated server build
    Server,
    /// Editor build
    Editor,
    /// Standalone tool program
    Program,
    /// Anything the build system reports that isn't listed above
    Other(String),
}

impl TargetKind {
    /// Only packaged game targets count as release builds
    pub fn is_release(&self) -> bool {
        matches!(self, TargetKind::Game)
    }
}

impl FromStr for TargetKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "Game" => TargetKind::Game,
            "Client" => TargetKind::Client,
            "Server" => TargetKind::Server,
            "Editor" => TargetKind::Editor,
            "Program" => TargetKind::Program,
            other => TargetKind::Other(other.to_string()),
        })
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Game => f.write_str("Game"),
            TargetKind::Client => f.write_str("Client"),
            TargetKind::Server => f.write_str("Server"),
            TargetKind::Editor => f.write_str("Editor"),
            TargetKind::Program => f.write_str("Program"),
            TargetKind::Other(name) => f.write_str(name),
        }
    }
}

/// Build target details passed by the build system, logged for audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetInfo {
    /// Target name, e.g. `MyGame`
    pub name: Option<String>,
    /// Build configuration, e.g. `Shipping`
    pub configuration: Option<String>,
    /// Target kind
    pub kind: TargetKind,
    /// `.uproject` file that was built
    pub project_file: Option<PathBuf>,
}

impl Default for TargetInfo {
    fn default() -> Self {
        Self {
            name: None,
            configuration: None,
            kind: TargetKind::Editor,
            project_file: None,
        }
    }
}

/// Validated configuration for one post-build run
#[derive(Debug, Clone, Serialize)]
pub struct PostBuildConfig {
    engine_root: PathBuf,
    project_root: PathBuf,
    realm: String,
    #[serde(skip)]
    project_token: String,
    #[serde(skip)]
    symbols_token: String,
    send_debug_symbols: bool,
    send_release_symbols: bool,
    upload_editor_symbols: bool,
    keep_project_archive: bool,
    plugin_name: String,
    target: TargetInfo,
}

impl PostBuildConfig {
    /// Start building a configuration
    pub fn builder() -> PostBuildConfigBuilder {
        PostBuildConfigBuilder::new()
    }

    /// Engine installation root
    pub fn engine_root(&self) -> &Path {
        &self.engine_root
    }

    /// Project root
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Account realm on the ingestion service
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Token embedded in the crash reporter endpoint
    pub fn project_token(&self) -> &str {
        &self.project_token
    }

    /// Token passed to the symbol uploader
    pub fn symbols_token(&self) -> &str {
        &self.symbols_token
    }

    /// Ship symbols for non-release builds
    pub fn send_debug_symbols(&self) -> bool {
        self.send_debug_symbols
    }

    /// Ship symbols for release builds
    pub fn send_release_symbols(&self) -> bool {
        self.send_release_symbols
    }

    /// Run the engine plugin symbol upload
    pub fn upload_editor_symbols(&self) -> bool {
        self.upload_editor_symbols
    }

    /// Keep the project archive after uploading
    pub fn keep_project_archive(&self) -> bool {
        self.keep_project_archive
    }

    /// Plugin directory name under `Plugins/`
    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Build target details
    pub fn target(&self) -> &TargetInfo {
        &self.target
    }

    /// Anything other than a packaged game target is a debug build
    pub fn is_debug_build(&self) -> bool {
        !self.target.kind.is_release()
    }

    /// Why this build should not ship symbols at all, if it shouldn't
    pub fn skip_reason(&self) -> Option<&'static str> {
        if self.is_debug_build() && !self.send_debug_symbols {
            Some("not instructed to send symbols for debug builds")
        } else if !self.is_debug_build() && !self.send_release_symbols {
            Some("not instructed to send symbols for release builds")
        } else {
            None
        }
    }

    /// `<project>/Plugins/<plugin>`
    pub fn plugin_dir(&self) -> PathBuf {
        self.project_root.join("Plugins").join(&self.plugin_name)
    }

    /// Persisted dedup ledger
    pub fn ledger_path(&self) -> PathBuf {
        self.plugin_dir().join(LEDGER_FILE_NAME)
    }

    /// Archive shared by both pipelines
    pub fn archive_path(&self) -> PathBuf {
        self.project_root.join(ARCHIVE_FILE_NAME)
    }

    /// External uploader executable
    pub fn uploader_path(&self) -> PathBuf {
        self.plugin_dir()
            .join("Content")
            .join(&self.plugin_name)
            .join(UPLOADER_FILE_NAME)
    }

    /// Root of staged (packaged) builds
    pub fn staged_builds_dir(&self) -> PathBuf {
        self.project_root.join("Saved").join("StagedBuilds")
    }

    /// Crash reporter binary replicated into staged builds
    pub fn crash_reporter_path(&self) -> PathBuf {
        self.engine_root
            .join("Binaries")
            .join("Win64")
            .join("CrashReportClient.exe")
    }

    /// Option lines for the audit log, tokens masked
    pub fn describe(&self) -> Vec<(String, String)> {
        let mut lines = Vec::new();
        if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(self) {
            for (key, value) in map {
                let rendered = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                lines.push((key, rendered));
            }
        }
        lines.push(("project_token".to_string(), utils::mask_secret(&self.project_token)));
        lines.push(("symbols_token".to_string(), utils::mask_secret(&self.symbols_token)));
        lines
    }
}

/// Builder for [`PostBuildConfig`]
#[derive(Debug, Clone)]
pub struct PostBuildConfigBuilder {
    engine_root: Option<PathBuf>,
    project_root: Option<PathBuf>,
    realm: Option<String>,
    project_token: Option<String>,
    symbols_token: Option<String>,
    send_debug_symbols: bool,
    send_release_symbols: bool,
    upload_editor_symbols: bool,
    keep_project_archive: bool,
    plugin_name: String,
    target: TargetInfo,
}

impl Default for PostBuildConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PostBuildConfigBuilder {
    /// Builder with the tool's defaults: debug symbols off, release symbols on,
    /// editor symbols on, archives removed after upload
    pub fn new() -> Self {
        Self {
            engine_root: None,
            project_root: None,
            realm: None,
            project_token: None,
            symbols_token: None,
            send_debug_symbols: false,
            send_release_symbols: true,
            upload_editor_symbols: true,
            keep_project_archive: false,
            plugin_name: DEFAULT_PLUGIN_NAME.to_string(),
            target: TargetInfo::default(),
        }
    }

    /// Engine installation root (required, absolute)
    pub fn engine_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_root = Some(path.into());
        self
    }

    /// Project root (required, absolute)
    pub fn project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Account realm (required)
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Project token (required)
    pub fn project_token(mut self, token: impl Into<String>) -> Self {
        self.project_token = Some(token.into());
        self
    }

    /// Symbol upload token (required)
    pub fn symbols_token(mut self, token: impl Into<String>) -> Self {
        self.symbols_token = Some(token.into());
        self
    }

    /// Ship symbols for non-release builds (default false)
    pub fn send_debug_symbols(mut self, send: bool) -> Self {
        self.send_debug_symbols = send;
        self
    }

    /// Ship symbols for release builds (default true)
    pub fn send_release_symbols(mut self, send: bool) -> Self {
        self.send_release_symbols = send;
        self
    }

    /// Upload engine plugin symbols (default true)
    pub fn upload_editor_symbols(mut self, upload: bool) -> Self {
        self.upload_editor_symbols = upload;
        self
    }

    /// Keep the project archive for inspection (default false)
    pub fn keep_project_archive(mut self, keep: bool) -> Self {
        self.keep_project_archive = keep;
        self
    }

    /// Plugin directory name
    pub fn plugin_name(mut self, name: impl Into<String>) -> Self {
        self.plugin_name = name.into();
        self
    }

    /// Build target name
    pub fn target_name(mut self, name: impl Into<String>) -> Self {
        self.target.name = Some(name.into());
        self
    }

    /// Build configuration, e.g. `Development`
    pub fn target_configuration(mut self, configuration: impl Into<String>) -> Self {
        self.target.configuration = Some(configuration.into());
        self
    }

    /// Build target kind; decides debug vs release
    pub fn target_kind(mut self, kind: TargetKind) -> Self {
        self.target.kind = kind;
        self
    }

    /// Project file that was built
    pub fn project_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.target.project_file = Some(path.into());
        self
    }

    /// Validate and freeze the configuration
    ///
    /// # Errors
    ///
    /// [`ShipError::Configuration`] when a root is missing, relative or not a
    /// directory, or when the realm or a token is missing or blank.
    pub fn build(self) -> Result<PostBuildConfig> {
        let engine_root = require_dir("engine root", self.engine_root)?;
        let project_root = require_dir("project root", self.project_root)?;
        let realm = require_text("realm", self.realm)?;
        let project_token = require_text("project token", self.project_token)?;
        let symbols_token = require_text("symbols token", self.symbols_token)?;

        if self.plugin_name.trim().is_empty() || self.plugin_name.contains(['/', '\\']) {
            return Err(ShipError::configuration(format!(
                "plugin name '{}' is not a single directory name",
                self.plugin_name
            )));
        }

        Ok(PostBuildConfig {
            engine_root,
            project_root,
            realm,
            project_token,
            symbols_token,
            send_debug_symbols: self.send_debug_symbols,
            send_release_symbols: self.send_release_symbols,
            upload_editor_symbols: self.upload_editor_symbols,
            keep_project_archive: self.keep_project_archive,
            plugin_name: self.plugin_name,
            target: self.target,
        })
    }
}

fn require_dir(what: &str, path: Option<PathBuf>) -> Result<PathBuf> {
    let path = path.ok_or_else(|| ShipError::configuration(format!("{} is not set", what)))?;
    if !path.is_absolute() {
        return Err(ShipError::configuration(format!(
            "{} {:?} must be an absolute path",
            what, path
        )));
    }
    if !path.is_dir() {
        return Err(ShipError::configuration(format!(
            "{} {:?} is not a reachable directory",
            what, path
        )));
    }
    Ok(path)
}

fn require_text(what: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ShipError::configuration(format!("{} is not set", what))),
    }
}
