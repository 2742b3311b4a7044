//! CLI integration tests
//!
//! Covers the flag surface, required-argument validation and the
//! package-passthrough flow end to end (the only flow that runs without a
//! real node toolchain).

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn tsforge_cmd() -> Command {
    Command::cargo_bin("tsforge").unwrap()
}

mod help_messages {
    use super::*;

    #[test]
    fn test_main_help_shows_all_commands() {
        let mut cmd = tsforge_cmd();
        cmd.arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build-tsc"))
            .stdout(predicate::str::contains("build-webpack"))
            .stdout(predicate::str::contains("build-vite"))
            .stdout(predicate::str::contains("build-rspack"))
            .stdout(predicate::str::contains("build-package"))
            .stdout(predicate::str::contains("build-ts-proto"))
            .stdout(predicate::str::contains("prepare-deps"));
    }

    #[test]
    fn test_main_help_shows_environment_variables() {
        let mut cmd = tsforge_cmd();
        cmd.arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("TSFORGE_VERBOSE"));
    }

    #[test]
    fn test_subcommand_help() {
        let mut cmd = tsforge_cmd();
        cmd.args(["build-tsc", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--tsconfigs"))
            .stdout(predicate::str::contains("--output-file"));
    }
}

mod argument_validation {
    use super::*;

    #[test]
    fn test_missing_base_args_fails() {
        let mut cmd = tsforge_cmd();
        cmd.arg("build-tsc")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--source-root"));
    }

    #[test]
    fn test_missing_tsconfigs_fails() {
        let tmp = TempDir::new().unwrap();
        let mut cmd = tsforge_cmd();
        base_args(&mut cmd, tmp.path());
        cmd.args(["build-tsc", "--output-file", "/tmp/out.tar"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--tsconfigs"));
    }

    #[test]
    fn test_unknown_pm_type_fails() {
        let tmp = TempDir::new().unwrap();
        seed_module(tmp.path());
        let mut cmd = tsforge_cmd();
        base_args_with_pm(&mut cmd, tmp.path(), "yarn");
        cmd.args([
            "build-package",
            "--output-file",
            tmp.path().join("out.tar").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("yarn"));
    }
}

mod build_package_flow {
    use super::*;

    #[test]
    fn test_package_passthrough_succeeds_without_tool() {
        let tmp = TempDir::new().unwrap();
        seed_module(tmp.path());

        let mut cmd = tsforge_cmd();
        base_args(&mut cmd, tmp.path());
        cmd.args([
            "build-package",
            "--output-file",
            tmp.path().join("module.output.tar").to_str().unwrap(),
        ])
        .assert()
        .success();

        // Staged into the build directory, ignore set respected
        let build_dir = tmp.path().join("build/libs/ui");
        assert!(build_dir.join("index.ts").exists());
        assert!(build_dir.join("package.json").exists());
        assert!(!build_dir.join(".idea").exists());
        // No output dirs declared, so no artifact is produced
        assert!(!tmp.path().join("module.output.tar").exists());
    }

    #[test]
    fn test_package_passthrough_bundles_declared_dirs() {
        let tmp = TempDir::new().unwrap();
        seed_module(tmp.path());
        let prebuilt = tmp.path().join("source/libs/ui/prebuilt");
        fs::create_dir_all(&prebuilt).unwrap();
        fs::write(prebuilt.join("index.js"), "module.exports = {}\n").unwrap();

        let output_file = tmp.path().join("module.output.tar");
        let mut cmd = tsforge_cmd();
        base_args(&mut cmd, tmp.path());
        cmd.args([
            "build-package",
            "--output-file",
            output_file.to_str().unwrap(),
            "--output-dirs",
            "prebuilt",
        ])
        .assert()
        .success();

        assert!(output_file.exists());
    }
}

/// Lay out a minimal pnpm module under `<root>/source/libs/ui`
fn seed_module(root: &Path) {
    let module = root.join("source/libs/ui");
    fs::create_dir_all(module.join(".idea")).unwrap();
    fs::write(
        module.join("package.json"),
        r#"{"name": "@libs/ui", "version": "1.0.0"}"#,
    )
    .unwrap();
    fs::write(module.join("pnpm-lock.yaml"), "lockfileVersion: \"9.0\"\n").unwrap();
    fs::write(module.join("index.ts"), "export {}\n").unwrap();
}

/// Base arguments pointing at the seeded layout; `/bin/true` stands in for
/// node so the package-manager script invocation is a no-op
fn base_args(cmd: &mut Command, root: &Path) {
    base_args_with_pm(cmd, root, "pnpm");
}

fn base_args_with_pm(cmd: &mut Command, root: &Path, pm_type: &str) {
    cmd.args([
        "--source-root",
        root.join("source").to_str().unwrap(),
        "--build-root",
        root.join("build").to_str().unwrap(),
        "--module-dir",
        "libs/ui",
        "--node-bin",
        "/bin/true",
        "--pm-script",
        "/dev/null",
        "--pm-type",
        pm_type,
        "--local-cli",
    ]);
}
