use super::{DirEntry, FileMetadata, FileSystem, FileType};
use anyhow::{anyhow, bail, Result};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

const MAX_SYMLINK_HOPS: usize = 32;

#[derive(Debug, Clone)]
pub struct MockEntry {
    pub content: Option<Vec<u8>>,
    pub file_type: FileType,
    pub mode: u32,
    pub target: Option<PathBuf>,
}

impl MockEntry {
    fn dir() -> Self {
        Self {
            content: None,
            file_type: FileType::Directory,
            mode: 0o755,
            target: None,
        }
    }

    fn file(content: &[u8], mode: u32) -> Self {
        Self {
            content: Some(content.to_vec()),
            file_type: FileType::File,
            mode,
            target: None,
        }
    }
}

/// In-memory file tree with permission bits and symlinks.
pub struct MockFileSystem {
    files: RwLock<BTreeMap<PathBuf, MockEntry>>,
    root: PathBuf,
    deny_symlinks: AtomicBool,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from("/mock"))
    }

    pub fn with_root(root: PathBuf) -> Self {
        let fs = Self {
            files: RwLock::new(BTreeMap::new()),
            root: root.clone(),
            deny_symlinks: AtomicBool::new(false),
        };
        fs.add_dir(root);
        fs
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: &str) {
        self.add_file_with_mode(path, content.as_bytes(), 0o644);
    }

    pub fn add_file_with_mode(&self, path: impl AsRef<Path>, content: &[u8], mode: u32) {
        let path = self.normalize_path(path.as_ref());
        let mut files = self.files.write().unwrap();

        if let Some(parent) = path.parent() {
            ensure_parents(&mut files, parent);
        }

        files.insert(path, MockEntry::file(content, mode));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = self.normalize_path(path.as_ref());
        let mut files = self.files.write().unwrap();
        ensure_parents(&mut files, &path);
    }

    /// Makes every later `symlink` call fail with a permission error.
    pub fn deny_symlinks(&self) {
        self.deny_symlinks.store(true, Ordering::SeqCst);
    }

    /// Target of the symlink at `path`, without following it
    pub fn link_target(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
        let path = self.normalize_path(path.as_ref());
        self.files
            .read()
            .unwrap()
            .get(&path)
            .and_then(|e| e.target.clone())
    }

    pub fn mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        let path = self.normalize_path(path.as_ref());
        let files = self.files.read().unwrap();
        let resolved = resolve(&files, &path).ok()?;
        files.get(&resolved).map(|e| e.mode)
    }

    fn normalize_path(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other),
            }
        }
        normalized
    }

    fn with_resolved<T>(
        &self,
        path: &Path,
        f: impl FnOnce(&PathBuf, &MockEntry) -> Result<T>,
    ) -> Result<T> {
        let path = self.normalize_path(path);
        let files = self.files.read().unwrap();
        let resolved = resolve(&files, &path)?;
        let entry = files
            .get(&resolved)
            .ok_or_else(|| anyhow!("Path not found: {:?}", path))?;
        f(&resolved, entry)
    }

    fn followed_type(&self, path: &Path) -> Option<FileType> {
        self.with_resolved(path, |_, e| Ok(e.file_type)).ok()
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_parents(files: &mut BTreeMap<PathBuf, MockEntry>, path: &Path) {
    let mut current = PathBuf::new();
    for component in path.components() {
        current.push(component);
        files.entry(current.clone()).or_insert_with(MockEntry::dir);
    }
}

/// Follows symlinks in every component of `path`.
fn resolve(files: &BTreeMap<PathBuf, MockEntry>, path: &Path) -> Result<PathBuf> {
    let mut hops = 0;
    let mut current = path.to_path_buf();

    'restart: loop {
        let mut prefix = PathBuf::new();
        let components: Vec<Component> = current.components().collect();

        for (idx, component) in components.iter().enumerate() {
            prefix.push(component);
            if let Some(target) = files.get(&prefix).and_then(|e| e.target.clone()) {
                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    bail!("Too many levels of symbolic links: {:?}", path);
                }
                let mut next = target;
                for rest in &components[idx + 1..] {
                    next.push(rest);
                }
                current = next;
                continue 'restart;
            }
        }

        return Ok(current);
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.followed_type(path).is_some()
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.followed_type(path) == Some(FileType::Directory)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.followed_type(path) == Some(FileType::File)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        let path = self.normalize_path(path);
        self.files
            .read()
            .unwrap()
            .get(&path)
            .map(|e| e.file_type == FileType::Symlink)
            .unwrap_or(false)
    }

    fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let path = self.normalize_path(path);
        let files = self.files.read().unwrap();
        let entry = files
            .get(&path)
            .ok_or_else(|| anyhow!("Path not found: {:?}", path))?;

        Ok(FileMetadata {
            size: entry.content.as_ref().map(|c| c.len() as u64).unwrap_or(0),
            mode: entry.mode,
            file_type: entry.file_type,
        })
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.with_resolved(path, |resolved, entry| {
            entry
                .content
                .clone()
                .ok_or_else(|| anyhow!("Not a file: {:?}", resolved))
        })
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| anyhow!("File {:?} is not UTF-8: {}", path, e))
    }

    fn read_bytes(&self, path: &Path, max_bytes: usize) -> Result<Vec<u8>> {
        let bytes = self.read(path)?;
        Ok(bytes[..bytes.len().min(max_bytes)].to_vec())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let path = self.normalize_path(path);
        let files = self.files.read().unwrap();
        let dir = resolve(&files, &path)?;

        match files.get(&dir) {
            Some(e) if e.file_type == FileType::Directory => {}
            Some(_) => bail!("Not a directory: {:?}", path),
            None => bail!("Directory not found: {:?}", path),
        }

        let entries = files
            .iter()
            .filter(|(p, _)| p.parent() == Some(dir.as_path()) && **p != dir)
            .map(|(p, e)| {
                let name = p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("")
                    .to_string();
                DirEntry {
                    path: path.join(&name),
                    name,
                    file_type: e.file_type,
                }
            })
            .collect();

        Ok(entries)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        self.with_resolved(path, |resolved, _| Ok(resolved.clone()))
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let path = self.normalize_path(path);
        let mut files = self.files.write().unwrap();
        let resolved = resolve(&files, &path)?;

        let parent_is_dir = resolved
            .parent()
            .and_then(|p| files.get(p))
            .map(|e| e.file_type == FileType::Directory)
            .unwrap_or(false);
        if !parent_is_dir {
            bail!("Parent directory missing for {:?}", path);
        }

        match files.get_mut(&resolved) {
            Some(entry) if entry.file_type == FileType::File => {
                entry.content = Some(contents.to_vec());
            }
            Some(_) => bail!("Not a file: {:?}", path),
            None => {
                files.insert(resolved, MockEntry::file(contents, 0o644));
            }
        }
        Ok(())
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        let path = self.normalize_path(path);
        let mut files = self.files.write().unwrap();
        let resolved = resolve(&files, &path)?;
        let entry = files
            .get_mut(&resolved)
            .ok_or_else(|| anyhow!("Path not found: {:?}", path))?;
        entry.mode = mode;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let path = self.normalize_path(path);
        let mut files = self.files.write().unwrap();
        let resolved = resolve(&files, &path)?;

        if let Some(entry) = files.get(&resolved) {
            if entry.file_type != FileType::Directory {
                bail!("Not a directory: {:?}", path);
            }
        }
        ensure_parents(&mut files, &resolved);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from = self.normalize_path(from);
        let to = self.normalize_path(to);
        let mut files = self.files.write().unwrap();

        if !files.contains_key(&from) {
            bail!("Path not found: {:?}", from);
        }
        if files.contains_key(&to) {
            bail!("Destination already exists: {:?}", to);
        }
        let to_parent_ok = to
            .parent()
            .and_then(|p| files.get(p))
            .map(|e| e.file_type == FileType::Directory)
            .unwrap_or(false);
        if !to_parent_ok {
            bail!("Parent directory missing for {:?}", to);
        }

        let moved: Vec<PathBuf> = files
            .keys()
            .filter(|p| p.starts_with(&from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(entry) = files.remove(&old) {
                let new_path = match old.strip_prefix(&from) {
                    Ok(suffix) if !suffix.as_os_str().is_empty() => to.join(suffix),
                    _ => to.clone(),
                };
                files.insert(new_path, entry);
            }
        }
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let link = self.normalize_path(link);
        if self.deny_symlinks.load(Ordering::SeqCst) {
            bail!("Permission denied creating symlink {:?}", link);
        }

        let mut files = self.files.write().unwrap();
        if files.contains_key(&link) {
            bail!("File exists: {:?}", link);
        }
        files.insert(
            link,
            MockEntry {
                content: None,
                file_type: FileType::Symlink,
                mode: 0o777,
                target: Some(target.to_path_buf()),
            },
        );
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let path = self.normalize_path(path);
        let mut files = self.files.write().unwrap();

        match files.get(&path) {
            Some(e) if e.file_type == FileType::Directory => bail!("Is a directory: {:?}", path),
            Some(_) => {
                files.remove(&path);
                Ok(())
            }
            None => bail!("Path not found: {:?}", path),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let path = self.normalize_path(path);
        let mut files = self.files.write().unwrap();

        if !files.contains_key(&path) {
            bail!("Path not found: {:?}", path);
        }
        files.retain(|p, _| !p.starts_with(&path));
        Ok(())
    }
}
