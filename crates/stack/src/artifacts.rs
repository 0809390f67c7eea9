//! Moving build outputs into the shadow artifacts tree

use anyhow::{Context, Result};
use dockprep_core::FileSystem;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RelocateError {
    #[error("Moved {original} to {target} but could not link it back")]
    LinkFailed {
        original: PathBuf,
        target: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// `root` followed by every component of the absolute `path`.
pub fn artifact_path(root: &Path, path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .fold(root.to_path_buf(), |acc, c| acc.join(c))
}

/// Moves `path` under `root` and leaves a symlink behind. Returns the new location.
pub fn relocate_one(path: &Path, root: &Path, fs: &dyn FileSystem) -> Result<PathBuf> {
    let original = fs
        .canonicalize(path)
        .with_context(|| format!("Cannot relocate {}", path.display()))?;
    let target = artifact_path(root, &original);

    if let Some(parent) = target.parent() {
        fs.create_dir_all(parent)?;
    }
    fs.rename(&original, &target)?;

    fs.symlink(&target, &original)
        .map_err(|source| RelocateError::LinkFailed {
            original: original.clone(),
            target: target.clone(),
            source: source.into(),
        })?;

    info!("Relocated {} -> {}", original.display(), target.display());
    Ok(target)
}

/// Relocates each path in order. The first failure stops the run; nothing
/// already moved is rolled back.
pub fn relocate<P: AsRef<Path>>(paths: &[P], root: &Path, fs: &dyn FileSystem) -> Result<Vec<PathBuf>> {
    paths
        .iter()
        .map(|path| relocate_one(path.as_ref(), root, fs))
        .collect()
}
