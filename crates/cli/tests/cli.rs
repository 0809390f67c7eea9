//! Binary-level tests for the dockprep CLI
//!
//! Only steps that need no package manager on the host are exercised here;
//! the rest is covered by unit tests against recorded invocations.

use std::env;
use std::fs;
use std::io::{BufRead, BufReader};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;
use yare::parameterized;

/// Helper to get the path to the dockprep binary
fn dockprep_bin() -> PathBuf {
    let mut path = env::current_exe()
        .expect("Failed to get current executable path")
        .parent()
        .expect("No parent")
        .to_path_buf();

    // If we're in deps/, go up one more level
    if path.ends_with("deps") {
        path = path.parent().expect("No parent").to_path_buf();
    }

    path.join("dockprep")
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(dockprep_bin())
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("DOCKPREP_ARTIFACTS_ROOT")
        .env_remove("DOCKPREP_BINSTUBS_DIR")
        .output()
        .expect("Failed to execute dockprep")
}

#[test]
fn test_cli_help() {
    let temp = TempDir::new().unwrap();
    let output = run(temp.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in [
        "packages",
        "bundle-install",
        "node-install",
        "js-install",
        "fix-binstubs",
        "relocate",
        "precompile-assets",
        "exec",
    ] {
        assert!(stdout.contains(command), "help is missing {}", command);
    }
}

#[test]
fn test_cli_version() {
    let temp = TempDir::new().unwrap();
    let output = run(temp.path(), &["--version"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("dockprep"));
}

#[test]
fn test_packages_dry_run_buildtime() {
    let temp = TempDir::new().unwrap();
    let output = run(temp.path(), &["packages", "--buildtime", "--dry-run"]);

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "build-essential pkg-config git python-is-python3 curl"
    );
}

#[test]
fn test_packages_dry_run_reads_lockfile() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("Gemfile"), "gem 'pg'\ngem 'sqlite3'\n").unwrap();
    fs::write(
        temp.path().join("Gemfile.lock"),
        "GEM\n  remote: https://rubygems.org/\n  specs:\n    pg (1.5.4)\n    sqlite3 (1.7.2-x86_64-linux)\n",
    )
    .unwrap();

    let output = run(temp.path(), &["packages", "--gem-buildtime", "--dry-run"]);

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "libpq-dev libsqlite3-dev"
    );
}

#[test]
fn test_fix_binstubs() {
    let temp = TempDir::new().unwrap();
    let bin = temp.path().join("bin");
    fs::create_dir(&bin).unwrap();
    fs::write(bin.join("rails"), "#!/usr/local/bin/ruby\r\nrequire_relative '../config/boot'\r\n").unwrap();
    fs::write(bin.join("setup"), "#!/bin/sh\necho ok\n").unwrap();
    fs::set_permissions(bin.join("rails"), fs::Permissions::from_mode(0o644)).unwrap();

    let output = run(
        temp.path(),
        &["fix-binstubs", "--ruby-install-name", "ruby3.3"],
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        fs::read_to_string(bin.join("rails")).unwrap(),
        "#!/usr/bin/env ruby3.3\nrequire_relative '../config/boot'\n"
    );
    assert_eq!(fs::read_to_string(bin.join("setup")).unwrap(), "#!/bin/sh\necho ok\n");

    let mode = fs::metadata(bin.join("rails")).unwrap().permissions().mode();
    assert_ne!(mode & 0o100, 0);
}

#[test]
fn test_fix_binstubs_missing_dir_fails() {
    let temp = TempDir::new().unwrap();

    let output = run(temp.path(), &["fix-binstubs", "scripts"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("scripts"));
}

#[test]
fn test_relocate() {
    let temp = TempDir::new().unwrap();
    let root = fs::canonicalize(temp.path()).unwrap();
    let modules = root.join("app/node_modules");
    fs::create_dir_all(modules.join("left-pad")).unwrap();
    fs::write(modules.join("left-pad/index.js"), "module.exports = 1;").unwrap();
    let artifacts = root.join("artifacts");

    let output = run(
        &root,
        &[
            "relocate",
            "--root",
            artifacts.to_str().unwrap(),
            modules.to_str().unwrap(),
        ],
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let moved = artifacts.join(modules.strip_prefix("/").unwrap());
    assert!(moved.join("left-pad/index.js").is_file());
    assert!(modules.is_symlink());
    assert_eq!(fs::read_link(&modules).unwrap(), moved);
}

#[test]
fn test_relocate_missing_path_fails() {
    let temp = TempDir::new().unwrap();
    let artifacts = temp.path().join("artifacts");

    let output = run(
        temp.path(),
        &["relocate", "--root", artifacts.to_str().unwrap(), "missing"],
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(!artifacts.exists());
}

#[test]
fn test_js_install_without_lockfile_fails() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("package.json"), "{}").unwrap();

    let output = run(temp.path(), &["js-install", "--optional"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("yarn.lock"));
    assert!(stderr.contains("package-lock.json"));
    assert!(stderr.contains("pnpm-lock.yaml"));
}

#[test]
fn test_optional_steps_skip_empty_dir() {
    let temp = TempDir::new().unwrap();

    assert!(run(temp.path(), &["js-install", "--optional"]).status.success());
    assert!(run(temp.path(), &["node-install", "--optional"]).status.success());
    assert!(run(temp.path(), &["precompile-assets"]).status.success());
}

#[test]
fn test_node_install_without_version_fails() {
    let temp = TempDir::new().unwrap();

    let output = run(temp.path(), &["node-install"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("node --version > .node-version"));
}

#[parameterized(
    success = { "exit 0", 0 },
    failure = { "exit 7", 7 },
)]
fn test_exec_forwards_exit_code(script: &str, expected: i32) {
    let temp = TempDir::new().unwrap();
    let output = run(temp.path(), &["exec", "--", "sh", "-c", script]);
    assert_eq!(output.status.code(), Some(expected));
}

#[test]
fn test_exec_replaces_process() {
    let temp = TempDir::new().unwrap();
    let mut child = Command::new(dockprep_bin())
        .args(["exec", "--", "sh", "-c", "echo $$; exec sleep 30"])
        .current_dir(temp.path())
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to execute dockprep");

    let mut line = String::new();
    BufReader::new(child.stdout.take().unwrap())
        .read_line(&mut line)
        .unwrap();
    assert_eq!(line.trim(), child.id().to_string());

    Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .unwrap();
    let status = child.wait().unwrap();
    assert_eq!(status.signal(), Some(15));
}

#[test]
fn test_exec_missing_program() {
    let temp = TempDir::new().unwrap();
    let output = run(temp.path(), &["exec", "dockprep-no-such-program"]);
    assert_eq!(output.status.code(), Some(127));
}

#[test]
fn test_invalid_config_is_rejected() {
    let temp = TempDir::new().unwrap();
    let output = Command::new(dockprep_bin())
        .args(["relocate", "anything"])
        .current_dir(temp.path())
        .env("DOCKPREP_ARTIFACTS_ROOT", "relative/path")
        .output()
        .expect("Failed to execute dockprep");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("absolute"));
}
