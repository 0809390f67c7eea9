//! Node.js toolchain version discovery and installer invocation

use super::lockfile::PACKAGE_JSON;
use anyhow::{Context, Result};
use dockprep_core::{CommandRunner, CommandSpec, FileSystem};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Version files in priority order.
pub const VERSION_FILES: [&str; 2] = [".node-version", ".nvmrc"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VersionSource {
    File { name: String, version: String },
    Manifest { version: String },
}

impl VersionSource {
    pub fn version(&self) -> &str {
        match self {
            Self::File { version, .. } | Self::Manifest { version } => version,
        }
    }

    pub fn is_manifest(&self) -> bool {
        matches!(self, Self::Manifest { .. })
    }
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { name, version } => write!(f, "{} ({})", version, name),
            Self::Manifest { version } => write!(f, "{} ({} engines.node)", version, PACKAGE_JSON),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolchainError {
    #[error(
        "No Node.js version specified in {dir}: add .node-version, .nvmrc or an engines.node \
         field to package.json, e.g. `node --version > .node-version`"
    )]
    MissingVersion { dir: String },
}

fn read_version_file(dir: &Path, fs: &dyn FileSystem) -> Result<Option<VersionSource>> {
    for name in VERSION_FILES {
        let path = dir.join(name);
        if !fs.is_file(&path) {
            continue;
        }
        let content = fs
            .read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let version = content.lines().next().unwrap_or("").trim();
        if version.is_empty() {
            debug!("{} is empty, ignoring", path.display());
            continue;
        }
        return Ok(Some(VersionSource::File {
            name: name.to_string(),
            version: version.to_string(),
        }));
    }
    Ok(None)
}

fn parse_engines_node(manifest: &str) -> serde_json::Result<Option<String>> {
    let package: serde_json::Value = serde_json::from_str(manifest)?;
    Ok(package["engines"]["node"]
        .as_str()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string))
}

/// Resolves where the Node.js version comes from.
///
/// A version file beats `engines.node`. With `optional` set and no
/// `package.json`, a directory without any source is skipped.
pub fn select_version_source(
    dir: &Path,
    fs: &dyn FileSystem,
    optional: bool,
) -> Result<Option<VersionSource>> {
    if let Some(source) = read_version_file(dir, fs)? {
        return Ok(Some(source));
    }

    let manifest = dir.join(PACKAGE_JSON);
    if fs.is_file(&manifest) {
        let content = fs
            .read_to_string(&manifest)
            .with_context(|| format!("Failed to read {}", manifest.display()))?;
        let engines_node = parse_engines_node(&content)
            .with_context(|| format!("Invalid JSON in {}", manifest.display()))?;
        if let Some(version) = engines_node {
            return Ok(Some(VersionSource::Manifest { version }));
        }
    } else if optional {
        info!("No Node.js project in {}, skipping", dir.display());
        return Ok(None);
    }

    Err(ToolchainError::MissingVersion {
        dir: dir.display().to_string(),
    }
    .into())
}

/// Installer invocations for `source`.
///
/// The installer's `auto` mode needs a working node to read `engines.node`,
/// so a manifest-only source on a bare image bootstraps the LTS release first.
pub fn install_plan(source: &VersionSource, node_on_path: bool, installer: &str) -> Vec<CommandSpec> {
    let mut plan = Vec::new();
    if source.is_manifest() && !node_on_path {
        plan.push(CommandSpec::new(installer).arg("lts"));
    }
    plan.push(CommandSpec::new(installer).arg("auto"));
    plan
}

pub fn node_install(
    dir: &Path,
    fs: &dyn FileSystem,
    runner: &dyn CommandRunner,
    installer: &str,
    optional: bool,
) -> Result<Option<VersionSource>> {
    let Some(source) = select_version_source(dir, fs, optional)? else {
        return Ok(None);
    };

    info!("Installing Node.js {}", source);
    let plan: Vec<CommandSpec> = install_plan(&source, runner.on_path("node"), installer)
        .into_iter()
        .map(|cmd| cmd.current_dir(dir))
        .collect();
    runner.run_all(&plan)?;

    Ok(Some(source))
}
