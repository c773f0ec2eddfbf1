//! Project-root confinement for file operations
//!
//! Every path handed to a tool is resolved against the project root, with
//! `.`/`..` segments and symbolic links followed, and accepted only when the
//! resolved path is the root itself or lies beneath it. The check runs on the
//! resolved path, never the literal string.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during sandboxed file operations
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Resolved path escapes the project root
    #[error("access outside project directory is forbidden")]
    OutsideRoot(PathBuf),

    /// Project root does not exist or is not a directory
    #[error("project root is not a directory: {0}")]
    InvalidRoot(PathBuf),

    /// File not found
    #[error("file not found: {0}")]
    NotFound(String),

    /// Directory not found
    #[error("directory does not exist")]
    DirectoryNotFound(String),

    /// Expected a directory
    #[error("path is not a directory")]
    NotADirectory(String),

    /// Expected a file
    #[error("path is a directory, not a file: {0}")]
    IsDirectory(String),

    /// Permission denied
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid UTF-8 in file
    #[error("invalid UTF-8 in file: {0}")]
    InvalidUtf8(String),

    /// Any other IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// File access confined to a single project root
#[derive(Debug, Clone)]
pub struct Sandbox {
    /// Canonical project root
    root: PathBuf,
}

impl Sandbox {
    /// Create a sandbox rooted at an existing directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root).map_err(|_| SandboxError::InvalidRoot(root.to_path_buf()))?;

        if !root.is_dir() {
            return Err(SandboxError::InvalidRoot(root));
        }

        Ok(Self { root })
    }

    /// The canonical project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a requested path and confirm it stays inside the root
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, SandboxError> {
        let resolved = resolve_path(&self.root.join(requested))?;

        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            tracing::debug!("Rejected path outside project root: {}", requested);
            Err(SandboxError::OutsideRoot(resolved))
        }
    }

    /// Whether an absolute path, once resolved, is inside the root
    pub fn contains(&self, path: &Path) -> bool {
        resolve_path(path).is_ok_and(|resolved| resolved.starts_with(&self.root))
    }

    /// Root-relative display form of a path, `/`-separated
    pub fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Read a UTF-8 text file inside the root
    pub async fn read_file(&self, requested: &str) -> Result<String, SandboxError> {
        let path = self.resolve(requested)?;

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SandboxError::NotFound(requested.to_string()))
            }
            Err(e) => return Err(map_io(e, requested)),
        };

        if metadata.is_dir() {
            return Err(SandboxError::IsDirectory(requested.to_string()));
        }

        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| map_io(e, requested))
    }

    /// Write a text file inside the root, creating parent directories
    pub async fn write_file(&self, requested: &str, content: &str) -> Result<PathBuf, SandboxError> {
        let path = self.resolve(requested)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(e, requested))?;
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| map_io(e, requested))?;

        Ok(path)
    }

    /// Names of the entries of a directory inside the root, sorted
    pub async fn list_entries(&self, requested: &str) -> Result<Vec<String>, SandboxError> {
        let dir = self.existing_dir(requested).await?;

        let mut names = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }

        names.sort();
        Ok(names)
    }

    /// Every file beneath a directory inside the root.
    ///
    /// Directory entries are visited in name order. Symbolic links to
    /// directories are not descended into, and each candidate file is
    /// re-checked against the root so links pointing outside are dropped.
    pub async fn walk_files(&self, requested: &str) -> Result<Vec<PathBuf>, SandboxError> {
        let dir = self.existing_dir(requested).await?;

        let mut files = Vec::new();
        self.collect_files(&dir, &mut files).await;
        Ok(files)
    }

    async fn existing_dir(&self, requested: &str) -> Result<PathBuf, SandboxError> {
        let dir = self.resolve(requested)?;

        match tokio::fs::metadata(&dir).await {
            Ok(metadata) if metadata.is_dir() => Ok(dir),
            Ok(_) => Err(SandboxError::NotADirectory(requested.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SandboxError::DirectoryNotFound(requested.to_string()))
            }
            Err(e) => Err(map_io(e, requested)),
        }
    }

    /// Unreadable directories and entries that vanish mid-walk are skipped.
    fn collect_files<'a>(
        &'a self,
        dir: &'a Path,
        files: &'a mut Vec<PathBuf>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let entries = match read_dir_sorted(dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                    return;
                }
            };

            for (path, is_dir) in entries {
                if is_dir {
                    self.collect_files(&path, files).await;
                } else if self.contains(&path) {
                    files.push(path);
                } else {
                    tracing::warn!("Skipping link outside project root: {}", path.display());
                }
            }
        })
    }
}

/// Entries of a directory with a flag for subdirectories, in name order
async fn read_dir_sorted(dir: &Path) -> io::Result<Vec<(PathBuf, bool)>> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;

    loop {
        let entry = match read_dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Stopped listing {}: {}", dir.display(), e);
                break;
            }
        };

        match entry.file_type().await {
            Ok(file_type) => entries.push((entry.path(), file_type.is_dir())),
            Err(e) => tracing::warn!("Skipping entry {}: {}", entry.path().display(), e),
        }
    }

    entries.sort();
    Ok(entries)
}

fn map_io(e: io::Error, requested: &str) -> SandboxError {
    match e.kind() {
        io::ErrorKind::NotFound => SandboxError::NotFound(requested.to_string()),
        io::ErrorKind::PermissionDenied => SandboxError::PermissionDenied(requested.to_string()),
        io::ErrorKind::InvalidData => SandboxError::InvalidUtf8(requested.to_string()),
        _ => SandboxError::Io(e),
    }
}

/// Upper bound on links followed while resolving one path
const MAX_LINK_HOPS: usize = 40;

/// Resolve `.`/`..` and symbolic links component by component.
///
/// Links are followed even when their target does not exist, so a dangling
/// link resolves to where a write through it would land. Components that do
/// not exist yet are kept lexically, so paths for files about to be created
/// still resolve.
fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    let mut resolved = PathBuf::new();
    let mut pending: VecDeque<OsString> = path.components().map(|c| c.as_os_str().to_owned()).collect();
    let mut hops = 0;

    while let Some(part) = pending.pop_front() {
        match Path::new(&part).components().next() {
            Some(Component::Prefix(_)) => resolved = PathBuf::from(&part),
            // absolute link targets start over from the filesystem root
            Some(Component::RootDir) => resolved.push(&part),
            Some(Component::ParentDir) => {
                resolved.pop();
            }
            Some(Component::Normal(name)) => {
                let candidate = resolved.join(name);
                let is_link = std::fs::symlink_metadata(&candidate)
                    .map(|m| m.file_type().is_symlink())
                    .unwrap_or(false);

                if !is_link {
                    resolved = candidate;
                    continue;
                }

                hops += 1;
                if hops > MAX_LINK_HOPS {
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        format!("too many levels of symbolic links: {}", path.display()),
                    ));
                }

                // relative targets resolve against the link's parent, which is `resolved`
                let target = std::fs::read_link(&candidate)?;
                for component in target.components().rev() {
                    pending.push_front(component.as_os_str().to_owned());
                }
            }
            Some(Component::CurDir) | None => {}
        }
    }

    Ok(resolved)
}
