//! Local directory store
//!
//! Serves `file:///path` locations. Object metadata is kept next to each
//! object in `<object>.metadata.json`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use url::Url;

use super::{ObjectStore, PutOptions};
use crate::error::{RepoError, Result};
use crate::metadata::ObjectMetadata;

const METADATA_SUFFIX: &str = ".metadata.json";

/// Object store backed by the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FileStore;

impl FileStore {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a `file://` location to a path
    pub fn path_for(location: &str) -> Result<PathBuf> {
        let invalid = |reason: &str| RepoError::InvalidRepositoryUrl {
            url: location.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(location).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "file" {
            return Err(invalid("expected a file:// URL"));
        }
        url.to_file_path()
            .map_err(|_| invalid("file URL must name an absolute local path"))
    }

    fn sidecar(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(METADATA_SUFFIX);
        PathBuf::from(name)
    }
}

fn unavailable(location: &str, e: impl std::fmt::Display) -> RepoError {
    RepoError::RemoteUnavailable {
        location: location.to_string(),
        message: e.to_string(),
    }
}

fn io_error(location: &str, e: std::io::Error) -> RepoError {
    if e.kind() == ErrorKind::NotFound {
        RepoError::ObjectNotFound {
            location: location.to_string(),
        }
    } else {
        unavailable(location, e)
    }
}

/// Write through a temporary file in the same directory so readers never
/// see partial content
fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("/"));
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

async fn write_object(path: PathBuf, content: Vec<u8>) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || write_atomic(&path, &content))
        .await
        .map_err(std::io::Error::other)?
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[async_trait]
impl ObjectStore for FileStore {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let path = Self::path_for(location)?;
        tracing::debug!("GET {}", path.display());
        tokio::fs::read(&path).await.map_err(|e| io_error(location, e))
    }

    async fn get_metadata(&self, location: &str) -> Result<ObjectMetadata> {
        let path = Self::path_for(location)?;
        tracing::debug!("HEAD {}", path.display());
        tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_error(location, e))?;

        match tokio::fs::read(Self::sidecar(&path)).await {
            Ok(bytes) => {
                let map: BTreeMap<String, String> =
                    serde_json::from_slice(&bytes).map_err(|e| unavailable(location, e))?;
                Ok(ObjectMetadata::from_map(map))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ObjectMetadata::default()),
            Err(e) => Err(unavailable(location, e)),
        }
    }

    async fn put(&self, location: &str, content: Vec<u8>, options: &PutOptions) -> Result<()> {
        let path = Self::path_for(location)?;
        tracing::debug!("PUT {} ({} bytes)", path.display(), content.len());
        if let Some(acl) = options.acl {
            tracing::debug!("ignoring ACL {} for local store", acl);
        }

        let sidecar = Self::sidecar(&path);
        if options.metadata.is_empty() {
            remove_if_exists(&sidecar)
                .await
                .map_err(|e| unavailable(location, e))?;
        } else {
            let json = serde_json::to_vec_pretty(&options.metadata.to_map())?;
            write_object(sidecar, json)
                .await
                .map_err(|e| unavailable(location, e))?;
        }

        write_object(path, content)
            .await
            .map_err(|e| unavailable(location, e))
    }

    async fn delete(&self, location: &str) -> Result<()> {
        let path = Self::path_for(location)?;
        tracing::debug!("DELETE {}", path.display());
        remove_if_exists(&path)
            .await
            .map_err(|e| unavailable(location, e))?;
        remove_if_exists(&Self::sidecar(&path))
            .await
            .map_err(|e| unavailable(location, e))
    }
}
