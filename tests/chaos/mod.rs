//! Chaos tests
//!
//! Damaged ledgers, leftover archives, crashing uploaders and unreadable
//! inputs. None of these may corrupt the ledger or stop the other target.

#[cfg(test)]
mod tests {
    use crate::integration::{write_file, FakeUploader, ShipTestHarness};
    use std::fs;
    use symship::*;

    const PLUGIN_DLL: &str = "Plugins/Runtime/Foo/Binaries/Win64/Foo.dll";

    fn corrupt_ledger(h: &ShipTestHarness, content: &[u8]) {
        write_file(
            h.ledger_path().parent().unwrap(),
            "backtrace_state.json",
            content,
        )
        .unwrap();
    }

    #[test]
    fn test_truncated_ledger_is_rebuilt() {
        let h = ShipTestHarness::new();
        h.engine_file(PLUGIN_DLL, b"foo");
        corrupt_ledger(&h, br#"{"already_done": ["abc"#);

        let uploader = FakeUploader::accepting();
        let report = h.engine_pipeline(&uploader).run();

        assert!(report.succeeded());
        assert_eq!(uploader.calls(), 1);
        let text = fs::read_to_string(h.ledger_path()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["already_done"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_ledger_of_wrong_shape_is_replaced() {
        for content in [&b"[1, 2, 3]"[..], &b"\"just a string\""[..], &b""[..], &b"\xff\xfe\x00"[..]] {
            let h = ShipTestHarness::new();
            h.engine_file(PLUGIN_DLL, b"foo");
            corrupt_ledger(&h, content);

            let uploader = FakeUploader::accepting();
            assert!(h.engine_pipeline(&uploader).run().succeeded());
            assert_eq!(DedupLedger::load(&h.ledger_path()).len(), 1);
        }
    }

    #[test]
    fn test_foreign_entries_in_ledger_are_dropped() {
        let h = ShipTestHarness::new();
        h.engine_file(PLUGIN_DLL, b"foo");
        corrupt_ledger(&h, br#"{"already_done": ["d41d8cd98f00b204e9800998ecf8427e", 7, null]}"#);

        let ledger = DedupLedger::load(&h.ledger_path());
        assert_eq!(ledger.len(), 1);

        let uploader = FakeUploader::accepting();
        assert!(h.engine_pipeline(&uploader).run().succeeded());

        let ledger = DedupLedger::load(&h.ledger_path());
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains(&ContentDigest::from_hex("d41d8cd98f00b204e9800998ecf8427e")));
    }

    #[test]
    fn test_stale_archive_never_reaches_uploader() {
        let h = ShipTestHarness::new();
        h.engine_file(PLUGIN_DLL, b"foo");
        fs::write(h.archive_path(), b"left over from a crashed build").unwrap();

        let uploader = FakeUploader::accepting();
        let report = h.engine_pipeline(&uploader).run();

        assert!(report.succeeded());
        assert_eq!(uploader.last(), vec![PLUGIN_DLL.to_string()]);
        assert!(!h.archive_path().exists());
    }

    #[test]
    fn test_stale_archive_removed_on_noop() {
        let h = ShipTestHarness::new();
        fs::write(h.archive_path(), b"left over").unwrap();

        let uploader = FakeUploader::accepting();
        let report = h.engine_pipeline(&uploader).run();

        assert!(report.is_noop());
        assert!(!h.archive_path().exists());
    }

    #[test]
    fn test_partial_archive_from_killed_build_is_swept() {
        let h = ShipTestHarness::new();
        let partial = h.project.path().join("symbols.zip.k1LLed.partial");
        fs::write(&partial, b"interrupted mid-write").unwrap();

        let uploader = FakeUploader::accepting();
        let report = h.engine_pipeline(&uploader).run();
        assert!(report.is_noop());
        assert!(!partial.exists());

        fs::write(&partial, b"interrupted again").unwrap();
        h.engine_file(PLUGIN_DLL, b"foo");
        let report = h.engine_pipeline(&uploader).run();
        assert!(report.succeeded());
        assert!(!partial.exists());
        assert_eq!(uploader.last(), vec![PLUGIN_DLL.to_string()]);
    }

    #[test]
    fn test_repeated_upload_failures_keep_ledger_absent() {
        let h = ShipTestHarness::new();
        h.engine_file(PLUGIN_DLL, b"foo");
        let uploader = FakeUploader::rejecting();

        for _ in 0..3 {
            let report = h.engine_pipeline(&uploader).run();
            assert_eq!(report.failed_in, Some(PipelineState::Uploading));
            assert!(report.error.as_ref().unwrap().is_upload_failure());
            assert!(!h.ledger_path().exists());
            assert!(!h.archive_path().exists());
        }
        assert_eq!(uploader.calls(), 3);
    }

    #[test]
    fn test_missing_uploader_is_not_fatal() {
        let h = ShipTestHarness::new();
        h.engine_file(PLUGIN_DLL, b"foo");
        h.project_file("Binaries/Win64/MyGame.exe", b"exe");
        let config = h.config().build().unwrap();

        let PostBuildOutcome::Completed(report) = PostBuild::new(config.clone()).run().unwrap() else {
            panic!("expected a completed run");
        };

        assert_eq!(report.failed_runs().len(), 2);
        for run in report.failed_runs() {
            assert!(matches!(run.error, Some(ShipError::UploaderMissing(_))));
        }
        assert!(!config.ledger_path().exists());
        assert!(!config.archive_path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_uploader_killed_by_signal() {
        use std::os::unix::fs::PermissionsExt;

        let h = ShipTestHarness::new();
        h.engine_file(PLUGIN_DLL, b"foo");
        let config = h.config().build().unwrap();
        let script = write_file(
            config.uploader_path().parent().unwrap(),
            "uploader.exe",
            b"#!/bin/sh\nkill -9 $$\n",
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let uploader = CommandUploader::new(script, "acme", "symtoken");
        let report = h.engine_pipeline(&uploader).run();

        assert_eq!(report.failed_in, Some(PipelineState::Uploading));
        assert!(matches!(report.error, Some(ShipError::UploadRejected { .. })));
        assert!(!h.ledger_path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_candidate_fails_run_without_commit() {
        use std::os::unix::fs::PermissionsExt;

        let h = ShipTestHarness::new();
        h.engine_file(PLUGIN_DLL, b"foo");
        let locked = h.engine_file("Plugins/Runtime/Bar/Binaries/Win64/Bar.pdb", b"bar");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores permission bits.
        if fs::read(&locked).is_ok() {
            return;
        }

        let uploader = FakeUploader::accepting();
        let report = h.engine_pipeline(&uploader).run();

        assert_eq!(report.failed_in, Some(PipelineState::Filtering));
        assert_eq!(uploader.calls(), 0);
        assert!(!h.ledger_path().exists());

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[test]
    fn test_staging_failure_is_isolated_per_file() {
        let h = ShipTestHarness::new();
        h.engine_file("Binaries/Win64/CrashReportClient.exe", b"crc");
        let staged = h.project.path().join("Saved/StagedBuilds/WindowsNoEditor");
        // A directory where an ini file should be.
        fs::create_dir_all(staged.join("Engine/Config/Base.ini")).unwrap();

        let config = h.config().build().unwrap();
        let uploader = FakeUploader::accepting();
        let PostBuildOutcome::Completed(report) = PostBuild::new(config).run_with(&uploader).unwrap() else {
            panic!("expected a completed run");
        };

        let dir = &report.staging.dirs[0];
        assert!(dir.crash_reporter_copied);
        assert_eq!(dir.failed(), 1);
        assert_eq!(dir.applied(), staging::PATCHED_INI_FILES.len() - 1);
        assert!(!report.is_clean());
    }
}
