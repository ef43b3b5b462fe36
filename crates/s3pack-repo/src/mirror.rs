//! Local index mirror
//!
//! On-disk copy of the last index this machine persisted or fetched. It is
//! only ever overwritten with the exact bytes of a remote document, and it is
//! never used as the source of a remote write.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{RepoError, Result};
use crate::index::RepositoryIndex;

/// Outcome of refreshing the mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorUpdate {
    /// Versions in the previous mirror, if one could be read
    pub previous_entries: Option<usize>,
    /// Versions in the new mirror
    pub entries: usize,
}

/// Local copy of a repository index
#[derive(Debug, Clone)]
pub struct LocalMirror {
    path: PathBuf,
}

impl LocalMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the mirror; `None` when it does not exist yet
    pub fn load(&self) -> Result<Option<RepositoryIndex>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => RepositoryIndex::from_bytes(&bytes)
                .map(Some)
                .map_err(|e| self.error(e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.error(e)),
        }
    }

    /// Replace the mirror content atomically
    pub fn write(&self, encoded: &[u8]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| self.error(e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.error(e))?;
        tmp.write_all(encoded).map_err(|e| self.error(e))?;
        tmp.persist(&self.path).map_err(|e| self.error(e.error))?;
        Ok(())
    }

    /// Replace the mirror with a document just persisted remotely
    ///
    /// `encoded` must be the bytes that were written remotely, so the mirror
    /// ends up byte-identical to the remote index. An unreadable previous
    /// mirror is simply overwritten.
    pub fn reconcile(&self, index: &RepositoryIndex, encoded: &[u8]) -> Result<MirrorUpdate> {
        let previous_entries = match self.load() {
            Ok(previous) => previous.map(|p| p.len()),
            Err(e) => {
                tracing::warn!("Discarding unreadable local index: {}", e);
                None
            }
        };

        self.write(encoded)?;
        Ok(MirrorUpdate {
            previous_entries,
            entries: index.len(),
        })
    }

    fn error(&self, e: impl std::fmt::Display) -> RepoError {
        RepoError::LocalMirror {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }
}
