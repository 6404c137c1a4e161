// ABOUTME: Filesystem facade the runner writes through, plus local and in-memory backends.
// ABOUTME: Also owns path resolution so actions can never escape the working directory.

use crate::error::{ActionError, FsError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// How file content is represented as a string at the facade boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Base64,
}

impl Encoding {
    pub fn for_binary(binary: bool) -> Self {
        if binary {
            Encoding::Base64
        } else {
            Encoding::Utf8
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Base64 => "base64",
        }
    }
}

/// Narrow filesystem contract the runner depends on. Paths are absolute and
/// live under [`FileSystem::workdir`].
#[async_trait]
pub trait FileSystem: Send + Sync {
    fn workdir(&self) -> PathBuf;

    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<(), FsError>;

    async fn read_file(&self, path: &Path, encoding: Encoding) -> Result<String, FsError>;

    async fn write_file(&self, path: &Path, content: &str, encoding: Encoding)
        -> Result<(), FsError>;

    async fn rm(&self, path: &Path, force: bool, recursive: bool) -> Result<(), FsError>;

    async fn exists(&self, path: &Path) -> bool;
}

/// Resolve an action's `filePath` to an absolute path inside `workdir`.
///
/// Absolute paths are accepted only when they already point inside `workdir`.
/// Any `..` component is rejected outright.
pub fn resolve_path(workdir: &Path, file_path: &str) -> Result<PathBuf, ActionError> {
    let invalid = |reason: &'static str| ActionError::InvalidPath {
        path: file_path.to_string(),
        reason,
    };

    let raw = Path::new(file_path.trim());
    if raw.as_os_str().is_empty() {
        return Err(invalid("path is empty"));
    }

    let relative = if raw.is_absolute() {
        raw.strip_prefix(workdir)
            .map_err(|_| invalid("absolute path outside the working directory"))?
    } else {
        raw
    };

    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(invalid("parent directory components are not allowed")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("unexpected root component"))
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(invalid("path resolves to the working directory itself"));
    }
    Ok(workdir.join(clean))
}

fn encode(path: &Path, bytes: Vec<u8>, encoding: Encoding) -> Result<String, FsError> {
    match encoding {
        Encoding::Utf8 => String::from_utf8(bytes).map_err(|e| FsError::Encoding {
            path: path.to_path_buf(),
            encoding: encoding.name(),
            reason: e.to_string(),
        }),
        Encoding::Base64 => Ok(BASE64.encode(bytes)),
    }
}

fn decode(path: &Path, content: &str, encoding: Encoding) -> Result<Vec<u8>, FsError> {
    match encoding {
        Encoding::Utf8 => Ok(content.as_bytes().to_vec()),
        Encoding::Base64 => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            BASE64.decode(compact).map_err(|e| FsError::Encoding {
                path: path.to_path_buf(),
                encoding: encoding.name(),
                reason: e.to_string(),
            })
        }
    }
}

/// Files on local disk, confined to `root`.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn check(&self, path: &Path) -> Result<(), FsError> {
        if path.starts_with(&self.root) {
            Ok(())
        } else {
            Err(FsError::OutsideRoot(path.to_path_buf()))
        }
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    fn workdir(&self) -> PathBuf {
        self.root.clone()
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<(), FsError> {
        self.check(path)?;
        let result = if recursive {
            tokio::fs::create_dir_all(path).await
        } else {
            tokio::fs::create_dir(path).await
        };
        result.map_err(|e| FsError::io(path, e))
    }

    async fn read_file(&self, path: &Path, encoding: Encoding) -> Result<String, FsError> {
        self.check(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| FsError::io(path, e))?;
        encode(path, bytes, encoding)
    }

    async fn write_file(
        &self,
        path: &Path,
        content: &str,
        encoding: Encoding,
    ) -> Result<(), FsError> {
        self.check(path)?;
        let bytes = decode(path, content, encoding)?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| FsError::io(path, e))?;
        tracing::debug!(path = %path.display(), "Wrote file");
        Ok(())
    }

    async fn rm(&self, path: &Path, force: bool, recursive: bool) -> Result<(), FsError> {
        self.check(path)?;
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if force && e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(FsError::io(path, e)),
        };
        let result = if metadata.is_dir() {
            if recursive {
                tokio::fs::remove_dir_all(path).await
            } else {
                tokio::fs::remove_dir(path).await
            }
        } else {
            tokio::fs::remove_file(path).await
        };
        result.map_err(|e| FsError::io(path, e))
    }

    async fn exists(&self, path: &Path) -> bool {
        self.check(path).is_ok() && tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

/// In-memory filesystem for tests and dry runs. Directories must exist before
/// files are written into them, like on disk.
#[derive(Debug)]
pub struct MemoryFileSystem {
    workdir: PathBuf,
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
    writes: Mutex<Vec<PathBuf>>,
}

impl MemoryFileSystem {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        let mut dirs = BTreeSet::new();
        dirs.insert(workdir.clone());
        Self {
            workdir,
            files: Mutex::new(BTreeMap::new()),
            dirs: Mutex::new(dirs),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Seed a text file (parents are created implicitly).
    pub fn insert(&self, relative: &str, content: &str) {
        let path = self.workdir.join(relative);
        self.add_ancestors(&path);
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path, content.as_bytes().to_vec());
    }

    /// Text content of a file relative to the workdir.
    pub fn get(&self, relative: &str) -> Option<String> {
        self.get_bytes(relative)
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    pub fn get_bytes(&self, relative: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&self.workdir.join(relative))
            .cloned()
    }

    /// Every path written through the facade, in write order.
    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn add_ancestors(&self, path: &Path) {
        let mut dirs = self.dirs.lock().unwrap_or_else(|e| e.into_inner());
        for ancestor in path.ancestors().skip(1) {
            if !ancestor.starts_with(&self.workdir) {
                break;
            }
            dirs.insert(ancestor.to_path_buf());
        }
    }

    fn has_dir(&self, path: &Path) -> bool {
        self.dirs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(path)
    }

    fn check(&self, path: &Path) -> Result<(), FsError> {
        if path.starts_with(&self.workdir) {
            Ok(())
        } else {
            Err(FsError::OutsideRoot(path.to_path_buf()))
        }
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    fn workdir(&self) -> PathBuf {
        self.workdir.clone()
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<(), FsError> {
        self.check(path)?;
        if recursive {
            self.add_ancestors(&path.join("_"));
            return Ok(());
        }
        match path.parent() {
            Some(parent) if self.has_dir(parent) => {
                self.dirs
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(path.to_path_buf());
                Ok(())
            }
            _ => Err(FsError::NotFound(path.to_path_buf())),
        }
    }

    async fn read_file(&self, path: &Path, encoding: Encoding) -> Result<String, FsError> {
        self.check(path)?;
        let bytes = self
            .files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))?;
        encode(path, bytes, encoding)
    }

    async fn write_file(
        &self,
        path: &Path,
        content: &str,
        encoding: Encoding,
    ) -> Result<(), FsError> {
        self.check(path)?;
        let parent_exists = path.parent().map(|p| self.has_dir(p)).unwrap_or(false);
        if !parent_exists {
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        let bytes = decode(path, content, encoding)?;
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_path_buf(), bytes);
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.to_path_buf());
        Ok(())
    }

    async fn rm(&self, path: &Path, force: bool, recursive: bool) -> Result<(), FsError> {
        self.check(path)?;
        let removed_file = self
            .files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path)
            .is_some();
        if removed_file {
            return Ok(());
        }
        if self.has_dir(path) {
            let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
            let has_children = files.keys().any(|f| f.starts_with(path));
            if has_children && !recursive {
                return Err(FsError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::other("directory not empty"),
                });
            }
            files.retain(|f, _| !f.starts_with(path));
            self.dirs
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|d| !d.starts_with(path));
            return Ok(());
        }
        if force {
            Ok(())
        } else {
            Err(FsError::NotFound(path.to_path_buf()))
        }
    }

    async fn exists(&self, path: &Path) -> bool {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(path)
            || self.has_dir(path)
    }
}
