//! Local mirror tree.
//!
//! Repository metadata uses POSIX relative paths. [`MirrorRoot`] maps them onto
//! the local filesystem and refuses any path that would land outside the root.
//! Writes go to a temporary sibling and are renamed into place, so readers never
//! observe a half-written file at its final path.

use std::ffi::OsStr;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{MirrorError, MirrorResult};

/// Relative path of the repository index.
pub const INDEX_PATH: &str = "repodata/repomd.xml";

/// Relative path of the detached index signature.
pub const SIGNATURE_PATH: &str = "repodata/repomd.xml.asc";

/// Name prefix of staging files.
const STAGING_PREFIX: &str = ".repomirror-";

/// Name suffix of staging files.
const STAGING_SUFFIX: &str = ".part";

fn is_staging_name(name: &OsStr) -> bool {
    name.to_str()
        .is_some_and(|n| n.starts_with(STAGING_PREFIX) && n.ends_with(STAGING_SUFFIX))
}

/// The local directory a repository is mirrored into.
#[derive(Debug, Clone)]
pub struct MirrorRoot {
    root: PathBuf,
}

impl MirrorRoot {
    /// Wrap a local directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a repository-relative path under the root.
    ///
    /// Absolute paths and `..` components are rejected.
    pub fn resolve(&self, relative: &str) -> MirrorResult<PathBuf> {
        let relative_path = Path::new(relative);
        let mut resolved = self.root.clone();
        let mut has_component = false;

        for component in relative_path.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    has_component = true;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(MirrorError::UnsafePath(relative.to_string()));
                }
            }
        }

        if !has_component {
            return Err(MirrorError::UnsafePath(relative.to_string()));
        }

        Ok(resolved)
    }

    /// Create the parent directory of `path` if it does not exist yet.
    pub fn ensure_parent(&self, path: &Path) -> MirrorResult<PathBuf> {
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).map_err(|e| MirrorError::CreateDirFailed {
            path: parent.clone(),
            source: e,
        })?;
        Ok(parent)
    }

    /// Create a temporary file next to the final location of `path`.
    ///
    /// Keeping the temporary file in the same directory makes the final
    /// [`persist`](Self::persist) a plain rename.
    pub fn staging_file(&self, path: &Path) -> MirrorResult<NamedTempFile> {
        let parent = self.ensure_parent(path)?;
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(&parent)
            .map_err(|e| MirrorError::WriteFailed {
                path: path.to_path_buf(),
                source: e,
            })
    }

    /// Remove staging files an interrupted run left in `dir`.
    ///
    /// Must not run while another writer may be staging into `dir`. A missing
    /// directory has nothing to sweep. Returns the number of files removed.
    pub fn sweep_staging(&self, dir: &Path) -> MirrorResult<usize> {
        let read_failed = |e| MirrorError::ReadFailed {
            path: dir.to_path_buf(),
            source: e,
        };

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(read_failed(e)),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(read_failed)?;
            let is_file = entry.file_type().map_err(read_failed)?.is_file();
            if !is_file || !is_staging_name(&entry.file_name()) {
                continue;
            }
            let path = entry.path();
            fs::remove_file(&path).map_err(|e| MirrorError::WriteFailed { path, source: e })?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Move a finished temporary file over `path`.
    pub fn persist(&self, staged: NamedTempFile, path: &Path) -> MirrorResult<()> {
        staged.persist(path).map_err(|e| MirrorError::WriteFailed {
            path: path.to_path_buf(),
            source: e.error,
        })?;
        Ok(())
    }

    /// Atomically write `data` to the repository-relative path.
    pub fn write_atomic(&self, relative: &str, data: &[u8]) -> MirrorResult<PathBuf> {
        let path = self.resolve(relative)?;
        let mut staged = self.staging_file(&path)?;

        staged
            .write_all(data)
            .and_then(|_| staged.flush())
            .map_err(|e| MirrorError::WriteFailed {
                path: path.clone(),
                source: e,
            })?;

        self.persist(staged, &path)?;
        Ok(path)
    }
}
