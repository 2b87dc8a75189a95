//! End-to-end scenarios for symship
//!
//! Builds small fake engine and project trees on disk and drives the upload
//! pipelines and the post-build driver against them.

use ::symship::*;
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test harness holding an engine tree and a project tree
pub struct ShipTestHarness {
    pub engine: TempDir,
    pub project: TempDir,
}

impl ShipTestHarness {
    /// Create empty engine and project trees
    pub fn new() -> Self {
        Self {
            engine: TempDir::new().unwrap(),
            project: TempDir::new().unwrap(),
        }
    }

    /// Write a file under the engine root
    pub fn engine_file(&self, relative: &str, content: &[u8]) -> PathBuf {
        write_file(self.engine.path(), relative, content).unwrap()
    }

    /// Write a file under the project root
    pub fn project_file(&self, relative: &str, content: &[u8]) -> PathBuf {
        write_file(self.project.path(), relative, content).unwrap()
    }

    /// Config builder for a release build of this harness
    pub fn config(&self) -> PostBuildConfigBuilder {
        PostBuildConfig::builder()
            .engine_root(self.engine.path())
            .project_root(self.project.path())
            .realm("acme")
            .project_token("projtoken")
            .symbols_token("symtoken")
            .target_kind(TargetKind::Game)
    }

    /// Ledger location for this project
    pub fn ledger_path(&self) -> PathBuf {
        self.config().build().unwrap().ledger_path()
    }

    /// Archive location for this project
    pub fn archive_path(&self) -> PathBuf {
        self.config().build().unwrap().archive_path()
    }

    /// Pipeline over the engine tree with the editor-symbol policy
    pub fn engine_pipeline<'a>(&self, uploader: &'a dyn Uploader) -> UploadPipeline<'a> {
        UploadPipeline::new(
            "engine",
            self.engine.path(),
            Policy::editor_symbols().unwrap(),
            self.archive_path(),
            uploader,
        )
        .with_ledger(self.ledger_path())
    }

    /// Pipeline over the project tree with the packaged-build policy
    pub fn project_pipeline<'a>(&self, uploader: &'a dyn Uploader) -> UploadPipeline<'a> {
        UploadPipeline::new(
            "project",
            self.project.path(),
            Policy::packaged_build("BacktraceIntegration").unwrap(),
            self.archive_path(),
            uploader,
        )
    }

    /// Seed the ledger with the digests of the given engine files
    pub fn seed_ledger(&self, relatives: &[&str]) {
        let digests: Vec<String> = relatives
            .iter()
            .map(|r| ContentDigest::of_file(&self.engine.path().join(r)).unwrap().to_string())
            .collect();
        let doc = serde_json::json!({ "already_done": digests, "owner": "build-farm" });
        write_file(
            self.ledger_path().parent().unwrap(),
            "backtrace_state.json",
            serde_json::to_string_pretty(&doc).unwrap().as_bytes(),
        )
        .unwrap();
    }
}

/// Write `content` to `root/relative`, creating parent directories
pub fn write_file(root: &Path, relative: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, content)?;
    Ok(path)
}

/// In-process uploader that records archive contents
pub struct FakeUploader {
    pub succeed: Cell<bool>,
    pub archives: RefCell<Vec<Vec<String>>>,
}

impl FakeUploader {
    pub fn accepting() -> Self {
        Self {
            succeed: Cell::new(true),
            archives: RefCell::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        let uploader = Self::accepting();
        uploader.succeed.set(false);
        uploader
    }

    pub fn calls(&self) -> usize {
        self.archives.borrow().len()
    }

    pub fn last(&self) -> Vec<String> {
        self.archives.borrow().last().cloned().unwrap_or_default()
    }
}

impl Uploader for FakeUploader {
    fn upload(&self, archive: &Path) -> Result<()> {
        let zip = zip::ZipArchive::new(fs::File::open(archive)?)?;
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();
        self.archives.borrow_mut().push(names);

        if self.succeed.get() {
            Ok(())
        } else {
            Err(ShipError::UploadRejected {
                status: "exit status: 1".to_string(),
            })
        }
    }

    fn describe(&self) -> String {
        "fake uploader".to_string()
    }
}

#[cfg(test)]
mod scenarios {
    use super::*;
    use filetime::{set_file_mtime, FileTime};

    const A_DLL: &str = "Plugins/Runtime/Foo/Binaries/Win64/a.dll";
    const B_PDB: &str = "Plugins/Runtime/Foo/Binaries/Win64/b.pdb";

    #[test]
    fn test_new_and_known_files() {
        let h = ShipTestHarness::new();
        h.engine_file(A_DLL, b"digest X content");
        h.engine_file(B_PDB, b"digest Y content");
        h.seed_ledger(&[B_PDB]);

        let uploader = FakeUploader::accepting();
        let report = h.engine_pipeline(&uploader).run();

        assert!(report.succeeded());
        assert_eq!(report.new_files, 1);
        assert_eq!(report.known_files, 1);
        assert_eq!(uploader.calls(), 1);
        assert_eq!(uploader.last(), vec![A_DLL.to_string()]);

        let ledger = DedupLedger::load(&h.ledger_path());
        let x = ContentDigest::of_file(&h.engine.path().join(A_DLL)).unwrap();
        let y = ContentDigest::of_file(&h.engine.path().join(B_PDB)).unwrap();
        assert!(ledger.contains(&x));
        assert!(ledger.contains(&y));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.extra_fields()["owner"], "build-farm");
        assert!(!h.archive_path().exists());
    }

    #[test]
    fn test_empty_candidate_set_is_a_noop() {
        let h = ShipTestHarness::new();
        h.engine_file("Binaries/Win64/UE4Editor-Core.dll", b"editor");
        h.project_file("Content/Maps/Main.umap", b"map");
        let uploader = FakeUploader::accepting();

        for report in [h.engine_pipeline(&uploader).run(), h.project_pipeline(&uploader).run()] {
            assert!(report.is_noop(), "{} should be a no-op", report.target);
            assert_eq!(report.candidates, 0);
            assert!(!report.visited(PipelineState::Archiving));
            assert!(!report.visited(PipelineState::Uploading));
        }
        assert_eq!(uploader.calls(), 0);
        assert!(!h.archive_path().exists());
        assert!(!h.ledger_path().exists());
    }

    #[test]
    fn test_full_overlap_skips_upload_and_ledger_write() {
        let h = ShipTestHarness::new();
        h.engine_file(A_DLL, b"x");
        h.engine_file(B_PDB, b"y");
        h.seed_ledger(&[A_DLL, B_PDB]);

        let pinned = FileTime::from_unix_time(1_500_000_000, 0);
        set_file_mtime(h.ledger_path(), pinned).unwrap();
        let before = fs::read(h.ledger_path()).unwrap();

        let uploader = FakeUploader::accepting();
        let report = h.engine_pipeline(&uploader).run();

        assert!(report.is_noop());
        assert_eq!(report.known_files, 2);
        assert_eq!(uploader.calls(), 0);
        assert_eq!(fs::read(h.ledger_path()).unwrap(), before);
        let mtime = FileTime::from_last_modification_time(&fs::metadata(h.ledger_path()).unwrap());
        assert_eq!(mtime, pinned);
    }

    #[test]
    fn test_failed_upload_leaves_ledger_untouched() {
        let h = ShipTestHarness::new();
        h.engine_file(A_DLL, b"x");
        h.engine_file(B_PDB, b"y");
        h.seed_ledger(&[B_PDB]);
        let before = fs::read(h.ledger_path()).unwrap();

        let uploader = FakeUploader::rejecting();
        let report = h.engine_pipeline(&uploader).run();

        assert_eq!(report.state, PipelineState::Failed);
        assert_eq!(report.failed_in, Some(PipelineState::Uploading));
        assert!(!report.ledger_committed);
        assert_eq!(uploader.calls(), 1);
        assert_eq!(fs::read(h.ledger_path()).unwrap(), before);
        assert!(!h.archive_path().exists());

        // The next build retries the same content.
        uploader.succeed.set(true);
        let retry = h.engine_pipeline(&uploader).run();
        assert!(retry.succeeded());
        assert_eq!(uploader.last(), vec![A_DLL.to_string()]);
    }

    #[test]
    fn test_ledger_grows_across_builds() {
        let h = ShipTestHarness::new();
        let uploader = FakeUploader::accepting();
        let mut seen = Vec::new();

        for build in 0..4u8 {
            let path = format!("Plugins/Runtime/P{}/Binaries/Win64/P{}.dll", build, build);
            h.engine_file(&path, &[build; 16]);
            seen.push(ContentDigest::of_file(&h.engine.path().join(&path)).unwrap());

            let report = h.engine_pipeline(&uploader).run();
            assert!(report.succeeded());
            assert_eq!(report.new_files, 1);

            let ledger = DedupLedger::load(&h.ledger_path());
            assert!(seen.iter().all(|d| ledger.contains(d)));
            assert_eq!(ledger.len(), seen.len());
        }
    }

    #[test]
    fn test_project_pipeline_always_reuploads() {
        let h = ShipTestHarness::new();
        h.project_file("Binaries/Win64/MyGame.exe", b"exe");
        h.project_file("Binaries/Win64/MyGame.pdb", b"pdb");
        h.project_file("Intermediate/Build/MyGameModuleRules.dll", b"rules");
        h.project_file("Plugins/BacktraceIntegration/Content/BacktraceIntegration/uploader.exe", b"up");
        h.project_file("Saved/StagedBuilds/WindowsNoEditor/MyGame.exe", b"staged");
        let uploader = FakeUploader::accepting();

        for _ in 0..2 {
            let report = h.project_pipeline(&uploader).run();
            assert!(report.succeeded());
            assert_eq!(report.known_files, 0);
            assert!(!report.visited(PipelineState::Committing));
        }
        assert_eq!(uploader.calls(), 2);
        assert_eq!(
            uploader.last(),
            vec!["Binaries/Win64/MyGame.exe".to_string(), "Binaries/Win64/MyGame.pdb".to_string()]
        );
        assert!(!h.ledger_path().exists());
    }

    #[test]
    fn test_engine_failure_does_not_stop_project() {
        let h = ShipTestHarness::new();
        h.engine_file(A_DLL, b"x");
        h.project_file("Binaries/Win64/MyGame.exe", b"exe");
        let config = h.config().build().unwrap();

        // Make the ledger location a directory so the commit cannot write it.
        fs::create_dir_all(config.ledger_path()).unwrap();

        let uploader = FakeUploader::accepting();
        let outcome = PostBuild::new(config).run_with(&uploader).unwrap();
        let PostBuildOutcome::Completed(report) = outcome else {
            panic!("expected a completed run");
        };

        let engine = report.engine.as_ref().unwrap();
        assert_eq!(engine.failed_in, Some(PipelineState::Committing));
        assert!(report.project.succeeded());
        assert_eq!(report.failed_runs().len(), 1);
    }

    #[test]
    fn test_debug_build_is_skipped_entirely() {
        let h = ShipTestHarness::new();
        h.engine_file(A_DLL, b"x");
        h.engine_file("Binaries/Win64/CrashReportClient.exe", b"crc");
        let config = h.config().target_kind(TargetKind::Editor).build().unwrap();

        let uploader = FakeUploader::accepting();
        let outcome = PostBuild::new(config).run_with(&uploader).unwrap();

        assert!(matches!(outcome, PostBuildOutcome::Skipped { .. }));
        assert_eq!(uploader.calls(), 0);
        assert!(!h.project.path().join("Saved").exists());
    }

    #[test]
    fn test_editor_upload_can_be_disabled() {
        let h = ShipTestHarness::new();
        h.engine_file(A_DLL, b"x");
        h.project_file("Binaries/Win64/MyGame.exe", b"exe");
        let config = h.config().upload_editor_symbols(false).build().unwrap();

        let uploader = FakeUploader::accepting();
        let PostBuildOutcome::Completed(report) = PostBuild::new(config).run_with(&uploader).unwrap() else {
            panic!("expected a completed run");
        };

        assert!(report.engine.is_none());
        assert_eq!(uploader.calls(), 1);
        assert!(!h.ledger_path().exists());
    }

    #[test]
    fn test_staging_patches_discovered_builds() {
        let h = ShipTestHarness::new();
        h.engine_file("Binaries/Win64/CrashReportClient.exe", b"crc");
        fs::create_dir_all(h.project.path().join("Saved/StagedBuilds/WindowsClient")).unwrap();
        let config = h.config().build().unwrap();

        let uploader = FakeUploader::accepting();
        let PostBuildOutcome::Completed(report) = PostBuild::new(config).run_with(&uploader).unwrap() else {
            panic!("expected a completed run");
        };

        let names: Vec<&str> = report.staging.dirs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["WindowsClient", "WindowsNoEditor"]);
        assert!(report.staging.is_clean());

        let ini = h
            .project
            .path()
            .join("Saved/StagedBuilds/WindowsClient/Engine/Config/DefaultEngine.ini");
        let text = fs::read_to_string(ini).unwrap();
        assert!(text.contains("DataRouterUrl=https://unreal.backtrace.io/post/acme/projtoken"));
    }

    #[cfg(unix)]
    #[test]
    fn test_external_uploader_end_to_end() {
        use std::os::unix::fs::PermissionsExt;

        let h = ShipTestHarness::new();
        h.engine_file(A_DLL, b"x");
        let config = h.config().build().unwrap();

        let record = h.project.path().join("uploads.log");
        let script = format!(
            "#!/bin/sh\necho \"$1 $2 $(basename \"$3\")\" >> '{}'\n[ -f \"$3\" ] || exit 9\n",
            record.display()
        );
        let uploader = write_file(
            config.uploader_path().parent().unwrap(),
            "uploader.exe",
            script.as_bytes(),
        )
        .unwrap();
        fs::set_permissions(&uploader, fs::Permissions::from_mode(0o755)).unwrap();

        let PostBuildOutcome::Completed(report) = PostBuild::new(config.clone()).run().unwrap() else {
            panic!("expected a completed run");
        };

        assert!(report.engine.as_ref().unwrap().succeeded());
        assert!(report.project.is_noop());
        assert_eq!(fs::read_to_string(record).unwrap(), "acme symtoken symbols.zip\n");
        assert_eq!(DedupLedger::load(&config.ledger_path()).len(), 1);
    }
}
