//! FileSystem trait definition

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Metadata about a file
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub mode: u32,
    pub file_type: FileType,
}

/// Type of file system entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

impl FileMetadata {
    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type == FileType::Symlink
    }

    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// A directory entry returned by read_dir
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub path: PathBuf,
    pub name: String,
    pub file_type: FileType,
}

impl DirEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.name
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }
}

/// Abstraction over file system operations for testability.
///
/// Entry types reported by `read_dir` and `metadata` never follow symlinks,
/// so a symlinked directory shows up as [`FileType::Symlink`].
pub trait FileSystem: Send + Sync {
    /// Check if a path exists (following symlinks)
    fn exists(&self, path: &Path) -> bool;

    /// Check if path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Check if path is a file
    fn is_file(&self, path: &Path) -> bool;

    /// Check if the path itself is a symbolic link
    fn is_symlink(&self, path: &Path) -> bool;

    /// Get file/directory metadata without following symlinks
    fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Read the whole file
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Read file contents as string
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Read first N bytes of file
    fn read_bytes(&self, path: &Path, max_bytes: usize) -> Result<Vec<u8>>;

    /// List directory contents
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Canonicalize a path
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    /// Replace the file contents so readers observe either the old or the new bytes.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Set permission bits
    fn set_mode(&self, path: &Path, mode: u32) -> Result<()>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Move `from` to `to`, keeping content, permissions and ownership
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Create a symbolic link at `link` pointing to `target`
    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;

    fn remove_file(&self, path: &Path) -> Result<()>;

    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Join paths
    fn join(&self, base: &Path, path: &str) -> PathBuf {
        base.join(path)
    }
}
