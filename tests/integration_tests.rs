//! Integration tests for the reshelve CLI.
//!
//! # Test Philosophy
//!
//! These tests drive the built binary end to end to verify:
//!
//! 1. **Correctness**: Release filenames land in `Title (Year)/Title (Year).ext`
//! 2. **Safety**: Existing library files are never overwritten or removed
//! 3. **Resilience**: A bad file or a missing directory never crashes a run
//! 4. **Observability**: Every decision is logged as a timestamped line
//!
//! Each test uses its own temporary directory and an explicit empty config
//! file so the user's real configuration never leaks in.

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::fixture::ChildPath;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::fs;

const DOWNLOADS: &str = "downloads";
const LIBRARY: &str = "library";

/// Temporary source, library and config file.
struct Setup {
    temp: TempDir,
}

impl Setup {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temporary directory");
        temp.child(DOWNLOADS)
            .create_dir_all()
            .expect("Failed to create downloads directory");
        temp.child("config.toml")
            .touch()
            .expect("Failed to create config file");
        Self { temp }
    }

    fn with_config(contents: &str) -> Self {
        let setup = Self::new();
        setup
            .temp
            .child("config.toml")
            .write_str(contents)
            .expect("Failed to write config file");
        setup
    }

    fn download(&self, name: &str) -> ChildPath {
        let file = self.temp.child(DOWNLOADS).child(name);
        file.write_str(name).expect("Failed to create download");
        file
    }

    fn library(&self) -> ChildPath {
        self.temp.child(LIBRARY)
    }

    /// A `reshelve <mode>` command pointed at this setup.
    fn cmd(&self, mode: &str) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_reshelve"));
        cmd.arg(mode)
            .arg("--config")
            .arg(self.temp.child("config.toml").path())
            .arg("--source")
            .arg(self.temp.child(DOWNLOADS).path())
            .arg("--destination")
            .arg(self.library().path())
            .env_remove("RESHELVE_LOG");
        cmd
    }
}

/// Tests the canonical scene-release case.
///
/// `The.Matrix.1999.1080p.BluRay.x264.mkv` is filed as
/// `The Matrix (1999)/The Matrix (1999).mkv` and removed from downloads.
#[test]
fn test_scene_release_is_filed_by_title_and_year() {
    let setup = Setup::new();
    let download = setup.download("The.Matrix.1999.1080p.BluRay.x264.mkv");

    setup.cmd("scan").assert().success();

    setup
        .library()
        .child("The Matrix (1999)/The Matrix (1999).mkv")
        .assert("The.Matrix.1999.1080p.BluRay.x264.mkv");
    download.assert(predicate::path::missing());
}

/// Tests that a file without a year gets a plain title folder.
#[test]
fn test_file_without_year_uses_plain_title() {
    let setup = Setup::new();
    setup.download("random_home_video.mp4");

    setup.cmd("scan").assert().success();

    setup
        .library()
        .child("random home video/random home video.mp4")
        .assert(predicate::path::exists());
}

/// Tests that files in nested download folders are found.
#[test]
fn test_nested_downloads_are_found() {
    let setup = Setup::new();
    setup.download("Heat.1995.720p/Heat.1995.720p.WEBRip.MKV");

    setup.cmd("scan").assert().success();

    setup
        .library()
        .child("Heat (1995)/Heat (1995).mkv")
        .assert(predicate::path::exists());
}

/// Tests collision handling within one scan.
///
/// **Scenario**: Two downloads resolve to `Alpha (2001)`.
///
/// **Expected**: The first (in source order) keeps the canonical name, the
/// second is stored as `Alpha (2001) - ver2.mp4` in the same folder.
#[test]
fn test_two_files_with_same_title_are_versioned() {
    let setup = Setup::new();
    setup.download("Alpha.2001.mkv");
    setup.download("Alpha_2001_x264.mp4");

    setup.cmd("scan").assert().success();

    let folder = setup.library().child("Alpha (2001)");
    folder
        .child("Alpha (2001).mkv")
        .assert("Alpha.2001.mkv");
    folder
        .child("Alpha (2001) - ver2.mp4")
        .assert("Alpha_2001_x264.mp4");
}

/// Tests that an existing library file is never overwritten.
///
/// **Scenario**: The library already holds `Title (2020).mkv` and
/// `Title (2020) - ver2.mkv`; a new `Title.2020.mkv` arrives.
///
/// **Expected**: The new file becomes `ver3`, the old ones are untouched.
#[test]
fn test_existing_library_files_are_preserved() {
    let setup = Setup::new();
    let folder = setup.library().child("Title (2020)");
    folder
        .child("Title (2020).mkv")
        .write_str("original")
        .expect("Failed to seed library");
    folder
        .child("Title (2020) - ver2.mkv")
        .write_str("second")
        .expect("Failed to seed library");
    setup.download("Title.2020.mkv");

    setup.cmd("scan").assert().success();

    folder.child("Title (2020).mkv").assert("original");
    folder.child("Title (2020) - ver2.mkv").assert("second");
    folder.child("Title (2020) - ver3.mkv").assert("Title.2020.mkv");
}

/// Tests that an unparseable file is skipped without stopping the run.
#[test]
fn test_unparseable_file_is_left_in_place() {
    let setup = Setup::new();
    let noise = setup.download("1080p.BluRay.x264.mkv");
    setup.download("Alien.1979.mkv");

    setup
        .cmd("scan")
        .assert()
        .success()
        .stderr(predicate::str::contains("1080p.BluRay.x264.mkv"))
        .stderr(predicate::str::contains("parse stage"));

    noise.assert(predicate::path::exists());
    setup
        .library()
        .child("Alien (1979)/Alien (1979).mkv")
        .assert(predicate::path::exists());
}

/// Tests that files outside the extension allow-list are ignored.
#[test]
fn test_non_video_files_are_ignored() {
    let setup = Setup::new();
    let subtitle = setup.download("Alien.1979.srt");
    let partial = setup.download("Alien.1979.mkv.part");

    setup.cmd("scan").assert().success();

    subtitle.assert(predicate::path::exists());
    partial.assert(predicate::path::exists());
    setup
        .library()
        .child("Alien (1979)")
        .assert(predicate::path::missing());
}

/// Tests that a missing source directory fails the run without side effects.
#[test]
fn test_missing_source_directory_fails_cleanly() {
    let setup = Setup::new();
    fs::remove_dir(setup.temp.child(DOWNLOADS).path()).expect("Failed to remove downloads");

    setup
        .cmd("scan")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));

    setup.library().assert(predicate::path::missing());
}

/// Tests that the log file gets one timestamped line per event.
#[test]
fn test_log_file_lines_are_timestamped() {
    let setup = Setup::new();
    setup.download("Alpha.2001.mkv");
    let log = setup.temp.child("logs/reshelve.log");

    setup
        .cmd("scan")
        .arg("--log-file")
        .arg(log.path())
        .assert()
        .success();

    let contents = fs::read_to_string(log.path()).expect("Failed to read log file");
    let line_format = predicate::str::is_match(r"^\[\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\] \S")
        .expect("Failed to compile line format regex");
    assert!(contents.lines().count() >= 3);
    for line in contents.lines() {
        assert!(line_format.eval(line), "Unexpected log line: {line}");
    }
    assert!(contents.contains("Scanning"));
    assert!(contents.contains("Moved"));
    assert!(contents.contains("1 moved, 0 failed"));
}

/// Tests that an unusable log file fails the run instead of crashing it.
#[test]
fn test_log_file_that_is_a_directory_fails_cleanly() {
    let setup = Setup::new();
    let log = setup.temp.child("logs");
    log.create_dir_all().expect("Failed to create log directory");

    setup
        .cmd("scan")
        .arg("--log-file")
        .arg(log.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("cannot open log file"));
}

/// Tests that repeated scans of a locked downloads folder never duplicate files.
///
/// **Scenario**: The downloads folder is read-only, so the source cannot be
/// removed after it reaches the library. Three scans run back to back.
///
/// **Expected**: Every scan reports the failure, the source stays, and the
/// library holds no copy, versioned or not.
#[cfg(unix)]
#[test]
fn test_locked_downloads_are_not_duplicated() {
    use std::os::unix::fs::PermissionsExt;

    let setup = Setup::new();
    let download = setup.download("Heat.1995.mkv");
    let downloads = setup.temp.child(DOWNLOADS);
    fs::set_permissions(downloads.path(), fs::Permissions::from_mode(0o555))
        .expect("Failed to lock downloads");

    // Permissions are not enforced for root
    let check = downloads.child(".write-check");
    if fs::write(check.path(), b"").is_ok() {
        fs::remove_file(check.path()).expect("Failed to clean up");
        fs::set_permissions(downloads.path(), fs::Permissions::from_mode(0o755))
            .expect("Failed to unlock downloads");
        return;
    }

    for _ in 0..3 {
        setup
            .cmd("scan")
            .assert()
            .success()
            .stderr(predicate::str::contains("0 moved, 1 failed"));
    }
    fs::set_permissions(downloads.path(), fs::Permissions::from_mode(0o755))
        .expect("Failed to unlock downloads");

    download.assert(predicate::path::exists());
    let folder = setup.library().child("Heat (1995)");
    let copies = fs::read_dir(folder.path()).map_or(0, Iterator::count);
    assert_eq!(copies, 0);
}

/// Tests a library nested in downloads when both are given as relative paths.
#[test]
fn test_relative_nested_library_is_stable() {
    let setup = Setup::new();
    setup.download("Heat.1995.mkv");

    for _ in 0..3 {
        Command::new(env!("CARGO_BIN_EXE_reshelve"))
            .current_dir(setup.temp.path())
            .args(["scan", "--config", "config.toml"])
            .args(["--source", "./downloads", "--destination", "downloads/lib"])
            .env_remove("RESHELVE_LOG")
            .assert()
            .success();
    }

    let folder = setup.temp.child("downloads/lib/Heat (1995)");
    folder
        .child("Heat (1995).mkv")
        .assert("Heat.1995.mkv");
    folder
        .child("Heat (1995) - ver2.mkv")
        .assert(predicate::path::missing());
}

/// Tests fallback to filename parsing when the renamer cannot run.
#[test]
fn test_unavailable_renamer_falls_back_to_parsing() {
    let setup = Setup::with_config(
        r#"
        [collaborator]
        program = "reshelve-test-renamer-that-does-not-exist"
        timeout_secs = 5
        "#,
    );
    setup.download("Heat.1995.mkv");

    setup
        .cmd("scan")
        .assert()
        .success()
        .stderr(predicate::str::contains("falling back"));

    setup
        .library()
        .child("Heat (1995)/Heat (1995).mkv")
        .assert(predicate::path::exists());
}

/// Tests that `--no-collaborator` skips a configured renamer entirely.
#[test]
fn test_no_collaborator_flag_skips_renamer() {
    let setup = Setup::with_config(
        r#"
        [collaborator]
        program = "reshelve-test-renamer-that-does-not-exist"
        "#,
    );
    setup.download("Heat.1995.mkv");

    setup
        .cmd("scan")
        .arg("--no-collaborator")
        .assert()
        .success()
        .stderr(predicate::str::contains("falling back").not());
}

/// Tests that extra noise tokens from the config file are stripped.
#[test]
fn test_configured_noise_tokens() {
    let setup = Setup::with_config(r#"noise_tokens = ["PROPER"]"#);
    setup.download("Heat.PROPER.mkv");

    setup.cmd("scan").assert().success();

    setup
        .library()
        .child("Heat/Heat.mkv")
        .assert(predicate::path::exists());
}

/// Tests the print-configuration mode.
#[test]
fn test_config_mode_prints_resolved_settings() {
    let setup = Setup::with_config("scan_interval_secs = 42");

    setup
        .cmd("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("scan_interval_secs = 42"))
        .stdout(predicate::str::contains("destination_dir"))
        .stdout(predicate::str::contains("mpeg"));

    setup.library().assert(predicate::path::missing());
}

/// Tests that an invalid config file is reported, not ignored.
#[test]
fn test_invalid_config_fails() {
    let setup = Setup::with_config("scan_interval_secs = \"soon\"");

    setup
        .cmd("scan")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to parse config file"));
}

/// Tests exit codes for help and invalid invocations.
#[test]
fn test_help_and_invalid_invocation() {
    Command::new(env!("CARGO_BIN_EXE_reshelve"))
        .arg("--help")
        .assert()
        .success();

    Command::new(env!("CARGO_BIN_EXE_reshelve"))
        .arg("explode")
        .assert()
        .failure()
        .code(2);
}
