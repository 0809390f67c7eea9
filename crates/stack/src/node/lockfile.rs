//! JavaScript package manager selection by lockfile

use anyhow::Result;
use dockprep_core::{CommandRunner, CommandSpec, FileSystem};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

pub const PACKAGE_JSON: &str = "package.json";
const YARN_BERRY_RC: &str = ".yarnrc.yml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Yarn,
    Npm,
    Pnpm,
}

impl PackageManager {
    /// Detection order. The first lockfile present wins.
    pub const ALL: [PackageManager; 3] = [Self::Yarn, Self::Npm, Self::Pnpm];

    pub fn lockfile(&self) -> &'static str {
        match self {
            Self::Yarn => "yarn.lock",
            Self::Npm => "package-lock.json",
            Self::Pnpm => "pnpm-lock.yaml",
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            Self::Yarn => "yarn",
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
        }
    }

    /// Whether the shim ships through corepack rather than with node itself.
    pub fn needs_corepack(&self) -> bool {
        !matches!(self, Self::Npm)
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockfileError {
    #[error(
        "No lockfile found in {dir}: expected one of yarn.lock, package-lock.json or pnpm-lock.yaml. \
         Commit a lockfile so dependencies install reproducibly"
    )]
    Missing { dir: String },
}

/// Finds the authoritative lockfile in `dir`.
///
/// With `optional` set, a directory without `package.json` and without any
/// lockfile is skipped. A `package.json` with no lockfile is always an error.
pub fn detect(dir: &Path, fs: &dyn FileSystem, optional: bool) -> Result<Option<PackageManager>> {
    if let Some(pm) = PackageManager::ALL
        .into_iter()
        .find(|pm| fs.is_file(&dir.join(pm.lockfile())))
    {
        debug!("Found {} in {}", pm.lockfile(), dir.display());
        return Ok(Some(pm));
    }

    if optional && !fs.exists(&dir.join(PACKAGE_JSON)) {
        info!("No JavaScript project in {}, skipping", dir.display());
        return Ok(None);
    }

    Err(LockfileError::Missing {
        dir: dir.display().to_string(),
    }
    .into())
}

/// Frozen install invocation for `pm`, preceded by `corepack enable` when
/// the shim is not already on `PATH`.
pub fn install_commands(
    pm: PackageManager,
    dir: &Path,
    fs: &dyn FileSystem,
    runner: &dyn CommandRunner,
) -> Vec<CommandSpec> {
    let mut commands = Vec::new();

    if pm.needs_corepack() && !runner.on_path(pm.program()) {
        commands.push(CommandSpec::new("corepack").arg("enable").current_dir(dir));
    }

    let install = match pm {
        PackageManager::Yarn if fs.exists(&dir.join(YARN_BERRY_RC)) => {
            CommandSpec::new("yarn").args(["install", "--immutable"])
        }
        PackageManager::Yarn => CommandSpec::new("yarn").args(["install", "--frozen-lockfile"]),
        PackageManager::Npm => CommandSpec::new("npm").arg("ci"),
        PackageManager::Pnpm => CommandSpec::new("pnpm").args(["install", "--frozen-lockfile"]),
    };
    commands.push(install.current_dir(dir));

    commands
}

/// Detects the package manager and runs its frozen install.
pub fn js_install(
    dir: &Path,
    fs: &dyn FileSystem,
    runner: &dyn CommandRunner,
    optional: bool,
) -> Result<Option<PackageManager>> {
    let Some(pm) = detect(dir, fs, optional)? else {
        return Ok(None);
    };

    info!("Installing JavaScript dependencies with {}", pm);
    runner.run_all(&install_commands(pm, dir, fs, runner))?;
    Ok(Some(pm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockprep_core::{MockFileSystem, RecordingRunner};
    use yare::parameterized;

    fn root() -> &'static Path {
        Path::new("/mock")
    }

    #[parameterized(
        yarn = { &["yarn.lock"], PackageManager::Yarn },
        npm = { &["package-lock.json"], PackageManager::Npm },
        pnpm = { &["pnpm-lock.yaml"], PackageManager::Pnpm },
        yarn_over_npm = { &["package-lock.json", "yarn.lock"], PackageManager::Yarn },
        npm_over_pnpm = { &["pnpm-lock.yaml", "package-lock.json"], PackageManager::Npm },
    )]
    fn test_detect_priority(files: &[&str], expected: PackageManager) {
        let fs = MockFileSystem::new();
        fs.add_file(PACKAGE_JSON, "{}");
        for file in files {
            fs.add_file(file, "");
        }

        assert_eq!(detect(root(), &fs, false).unwrap(), Some(expected));
    }

    #[test]
    fn test_detect_optional_without_manifest_skips() {
        let fs = MockFileSystem::new();
        assert_eq!(detect(root(), &fs, true).unwrap(), None);
    }

    #[test]
    fn test_detect_manifest_without_lockfile_fails_even_if_optional() {
        let fs = MockFileSystem::new();
        fs.add_file(PACKAGE_JSON, "{}");

        let err = detect(root(), &fs, true).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("yarn.lock"));
        assert!(message.contains("package-lock.json"));
        assert!(message.contains("pnpm-lock.yaml"));
        assert!(err.downcast_ref::<LockfileError>().is_some());
    }

    #[test]
    fn test_detect_required_without_anything_fails() {
        let fs = MockFileSystem::new();
        assert!(detect(root(), &fs, false).is_err());
    }

    #[test]
    fn test_corepack_enabled_when_shim_missing() {
        let fs = MockFileSystem::new();
        let runner = RecordingRunner::new();

        let lines: Vec<String> = install_commands(PackageManager::Pnpm, root(), &fs, &runner)
            .iter()
            .map(CommandSpec::command_line)
            .collect();

        assert_eq!(lines, vec!["corepack enable", "pnpm install --frozen-lockfile"]);
    }

    #[test]
    fn test_no_corepack_when_shim_present() {
        let fs = MockFileSystem::new();
        let runner = RecordingRunner::new().with_on_path("yarn");

        let lines: Vec<String> = install_commands(PackageManager::Yarn, root(), &fs, &runner)
            .iter()
            .map(CommandSpec::command_line)
            .collect();

        assert_eq!(lines, vec!["yarn install --frozen-lockfile"]);
    }

    #[test]
    fn test_npm_never_uses_corepack() {
        let fs = MockFileSystem::new();
        let runner = RecordingRunner::new();

        let commands = install_commands(PackageManager::Npm, root(), &fs, &runner);

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].command_line(), "npm ci");
    }

    #[test]
    fn test_yarn_berry_uses_immutable() {
        let fs = MockFileSystem::new();
        fs.add_file(".yarnrc.yml", "nodeLinker: node-modules\n");
        let runner = RecordingRunner::new().with_on_path("yarn");

        let commands = install_commands(PackageManager::Yarn, root(), &fs, &runner);

        assert_eq!(commands[0].command_line(), "yarn install --immutable");
    }

    #[test]
    fn test_js_install_runs_in_dir() {
        let fs = MockFileSystem::new();
        fs.add_file("package-lock.json", "{}");
        let runner = RecordingRunner::new();

        let pm = js_install(root(), &fs, &runner, false).unwrap();

        assert_eq!(pm, Some(PackageManager::Npm));
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].cwd.as_deref(), Some(root()));
    }

    #[test]
    fn test_js_install_propagates_failure() {
        let fs = MockFileSystem::new();
        fs.add_file("yarn.lock", "");
        let runner = RecordingRunner::new().with_exit_code("yarn", 1);

        assert!(js_install(root(), &fs, &runner, false).is_err());
        assert_eq!(runner.command_lines().len(), 2);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&PackageManager::Pnpm).unwrap(), "\"pnpm\"");
    }
}
