//! Ephemeral storage
//!
//! Filesystem-backed namespace for uploaded and converted files:
//! - Two roots (inbound, outbound), one subdirectory per session
//! - Idempotent directory creation and removal
//! - Age-based eviction of top-level entries

pub mod session;

pub use session::SessionId;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::StorageConfig;
use crate::error::{ConverterError, Result};

/// Which half of the storage area an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Uploaded source files
    Inbound,
    /// Converted files and archives
    Outbound,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Inbound => "inbound",
            StorageKind::Outbound => "outbound",
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-partitioned storage on the local filesystem
#[derive(Debug, Clone)]
pub struct StorageArea {
    inbound_root: PathBuf,
    outbound_root: PathBuf,
}

impl StorageArea {
    pub fn new(inbound_root: impl Into<PathBuf>, outbound_root: impl Into<PathBuf>) -> Self {
        Self {
            inbound_root: inbound_root.into(),
            outbound_root: outbound_root.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.inbound_root(), config.outbound_root())
    }

    /// Create both roots if they do not exist yet
    pub async fn init(&self) -> Result<()> {
        for root in [&self.inbound_root, &self.outbound_root] {
            tokio::fs::create_dir_all(root)
                .await
                .map_err(|e| ConverterError::storage("create root", root, e))?;
        }
        Ok(())
    }

    pub fn root(&self, kind: StorageKind) -> &Path {
        match kind {
            StorageKind::Inbound => &self.inbound_root,
            StorageKind::Outbound => &self.outbound_root,
        }
    }

    /// Directory owned by `session` under `kind`'s root
    pub fn session_dir(&self, session: &SessionId, kind: StorageKind) -> PathBuf {
        self.root(kind).join(session.as_str())
    }

    /// Create the session directory if absent and return its path
    pub async fn prepare_session_dir(&self, session: &SessionId, kind: StorageKind) -> Result<PathBuf> {
        let dir = self.session_dir(session, kind);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ConverterError::storage("create directory", &dir, e))?;
        Ok(dir)
    }

    /// Write `bytes` to `filename` inside the session directory.
    ///
    /// `filename` is used verbatim; callers must have reduced it to a single
    /// safe path component beforehand.
    #[cfg(test)]
    pub async fn write(
        &self,
        session: &SessionId,
        kind: StorageKind,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let dir = self.prepare_session_dir(session, kind).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ConverterError::storage("write", &path, e))?;
        Ok(path)
    }

    /// Create `filename` inside the session directory for incremental
    /// writes. `filename` is used verbatim, as in `write`.
    pub async fn create_file(
        &self,
        session: &SessionId,
        kind: StorageKind,
        filename: &str,
    ) -> Result<(PathBuf, tokio::fs::File)> {
        let dir = self.prepare_session_dir(session, kind).await?;
        let path = dir.join(filename);
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| ConverterError::storage("create", &path, e))?;
        Ok((path, file))
    }

    /// List the files currently stored for a session, sorted by name.
    /// A missing session directory yields an empty list.
    pub async fn list(&self, session: &SessionId, kind: StorageKind) -> Result<Vec<PathBuf>> {
        let dir = self.session_dir(session, kind);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ConverterError::storage("list", &dir, e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ConverterError::storage("list", &dir, e))?
        {
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    /// Remove the whole session directory. Removing a missing directory is not an error.
    pub async fn remove_session(&self, session: &SessionId, kind: StorageKind) -> Result<()> {
        let dir = self.session_dir(session, kind);
        remove_entry(&dir)
            .await
            .map_err(|e| ConverterError::storage("remove", &dir, e))
    }

    /// Remove top-level entries under `kind`'s root whose age is at least `max_age`.
    ///
    /// Per-entry failures are logged and skipped. Returns the number of entries removed.
    pub async fn sweep_older_than(&self, kind: StorageKind, max_age: Duration) -> Result<usize> {
        let root = self.root(kind);
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(ConverterError::storage("scan", root, e)),
        };

        let now = SystemTime::now();
        let mut removed = 0;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read entry under {}: {}", root.display(), e);
                    break;
                }
            };
            let path = entry.path();

            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!("Failed to stat {}: {}", path.display(), e);
                    continue;
                }
            };

            // Timestamps in the future count as brand new
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age < max_age {
                continue;
            }

            match remove_entry(&path).await {
                Ok(()) => {
                    tracing::debug!("Swept {} (age {}s)", path.display(), age.as_secs());
                    removed += 1;
                }
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        Ok(removed)
    }
}

/// Remove a file or directory tree, treating "already gone" as success
async fn remove_entry(path: &Path) -> std::io::Result<()> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
