use super::{DirEntry, FileMetadata, FileSystem, FileType};
use anyhow::{Context, Result};
use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const DEFAULT_UMASK: u32 = 0o022;

pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn file_type_of(file_type: fs::FileType) -> FileType {
    if file_type.is_symlink() {
        FileType::Symlink
    } else if file_type.is_dir() {
        FileType::Directory
    } else {
        FileType::File
    }
}

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_symlink(&self, path: &Path) -> bool {
        path.is_symlink()
    }

    fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let meta = fs::symlink_metadata(path)
            .context(format!("Failed to get metadata for {:?}", path))?;

        Ok(FileMetadata {
            size: meta.len(),
            mode: meta.permissions().mode() & 0o7777,
            file_type: file_type_of(meta.file_type()),
        })
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).context(format!("Failed to read file {:?}", path))
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).context(format!("Failed to read file {:?}", path))
    }

    fn read_bytes(&self, path: &Path, max_bytes: usize) -> Result<Vec<u8>> {
        let file = fs::File::open(path).context(format!("Failed to open file {:?}", path))?;
        let mut buffer = Vec::with_capacity(max_bytes);
        file.take(max_bytes as u64)
            .read_to_end(&mut buffer)
            .context(format!("Failed to read bytes from {:?}", path))?;
        Ok(buffer)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let entries = fs::read_dir(path).context(format!("Failed to read directory {:?}", path))?;

        let mut result = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read directory entry")?;
            let file_type = entry
                .file_type()
                .context(format!("Failed to get file type for {:?}", entry.path()))?;

            result.push(DirEntry {
                path: entry.path(),
                name: entry.file_name().to_string_lossy().to_string(),
                file_type: file_type_of(file_type),
            });
        }

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        path.canonicalize()
            .context(format!("Failed to canonicalize path {:?}", path))
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)
            .context(format!("Failed to create temporary file in {:?}", dir))?;
        tmp.write_all(contents)
            .context(format!("Failed to write temporary file for {:?}", path))?;
        tmp.as_file()
            .sync_all()
            .context(format!("Failed to flush temporary file for {:?}", path))?;

        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(tmp.path(), meta.permissions())
                .context(format!("Failed to copy permissions of {:?}", path))?;
        }

        tmp.persist(path)
            .map_err(|e| e.error)
            .context(format!("Failed to replace {:?}", path))?;
        Ok(())
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .context(format!("Failed to set mode {:o} on {:?}", mode, path))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).context(format!("Failed to create directory {:?}", path))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).context(format!("Failed to move {:?} to {:?}", from, to))
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        std::os::unix::fs::symlink(target, link)
            .context(format!("Failed to link {:?} to {:?}", link, target))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).context(format!("Failed to remove {:?}", path))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path).context(format!("Failed to remove {:?}", path))
    }
}

/// Returns the file mode creation mask of the current process.
///
/// Read from `/proc/self/status` so the mask is never modified; falls back
/// to `0o022` where that file is unavailable or predates the `Umask` field.
pub fn current_umask() -> u32 {
    fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| parse_umask(&status))
        .unwrap_or(DEFAULT_UMASK)
}

fn parse_umask(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Umask:"))
        .and_then(|value| u32::from_str_radix(value.trim(), 8).ok())
}
