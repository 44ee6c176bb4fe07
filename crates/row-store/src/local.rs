//! Directory handle for pipeline working directories
//!
//! Every operation resolves names against an explicit base directory; no
//! component depends on the process working directory.

use std::path::{Path, PathBuf};

use fit_core::{Error, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::row_file::temp_sibling;
use crate::RowFile;

/// Local filesystem directory holding pipeline files
///
/// Provides:
/// - Atomic writes (write to .tmp, then rename)
/// - Copy and rename by relative name
/// - Pattern listing of the directory's own files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStore {
    /// Base path for all operations
    base_path: PathBuf,
}

impl LocalStore {
    /// Create a new LocalStore rooted at `base_path`
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a relative name to a full path
    pub fn resolve(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    /// Row file handle for a relative name
    pub fn row_file(&self, name: &str) -> RowFile {
        RowFile::new(self.resolve(name))
    }

    /// Store rooted at a subdirectory
    pub fn child(&self, name: &str) -> LocalStore {
        LocalStore::new(self.resolve(name))
    }

    pub async fn exists(&self, name: &str) -> bool {
        fs::metadata(self.resolve(name)).await.is_ok()
    }

    /// Create the base directory (and parents)
    pub async fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    /// Create a subdirectory (and parents)
    pub async fn create_dir_all(&self, name: &str) -> Result<PathBuf> {
        let path = self.resolve(name);
        fs::create_dir_all(&path).await?;
        Ok(path)
    }

    /// Copy `from` to `to`, both relative, returning bytes copied
    #[instrument(skip(self), fields(dir = %self.base_path.display()))]
    pub async fn copy(&self, from: &str, to: &str) -> Result<u64> {
        let source = self.resolve(from);
        let bytes = fs::copy(&source, self.resolve(to)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::PathNotFound { path: source }
            } else {
                Error::Io(e)
            }
        })?;
        debug!(bytes, "Copied file");
        Ok(bytes)
    }

    /// Rename `from` to `to`, both relative
    #[instrument(skip(self), fields(dir = %self.base_path.display()))]
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let source = self.resolve(from);
        fs::rename(&source, self.resolve(to)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::PathNotFound { path: source }
            } else {
                Error::Io(e)
            }
        })
    }

    /// Write `data` to `name` atomically, returning bytes written
    #[instrument(skip(self, data), fields(dir = %self.base_path.display(), size = data.len()))]
    pub async fn write(&self, name: &str, data: &[u8]) -> Result<u64> {
        let full_path = self.resolve(name);
        let temp_path = temp_sibling(&full_path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await?;
        Ok(data.len() as u64)
    }

    pub async fn read_to_string(&self, name: &str) -> Result<String> {
        let path = self.resolve(name);
        fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::PathNotFound { path }
            } else {
                Error::Io(e)
            }
        })
    }

    /// Sorted names of regular files directly in this directory that look like
    /// `<prefix><something><suffix>` with a non-empty middle
    #[instrument(skip(self), fields(dir = %self.base_path.display()))]
    pub async fn list_matching(&self, prefix: &str, suffix: &str) -> Result<Vec<String>> {
        let mut results = Vec::new();
        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(results),
            Err(e) => return Err(Error::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.len() > prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
            {
                results.push(name);
            }
        }

        results.sort();
        debug!(count = results.len(), "Found files");
        Ok(results)
    }

    /// Delete every file `list_matching` would return, returning how many
    pub async fn remove_matching(&self, prefix: &str, suffix: &str) -> Result<usize> {
        let names = self.list_matching(prefix, suffix).await?;
        for name in &names {
            fs::remove_file(self.resolve(name)).await?;
        }
        if !names.is_empty() {
            debug!(count = names.len(), prefix, suffix, "Removed files");
        }
        Ok(names.len())
    }
}
