//! Object store abstraction
//!
//! Whole-object get/put/delete plus metadata reads. Calls are independent:
//! nothing here spans more than one object, and no call is retried.
//!
//! Backends:
//! - `s3://bucket/prefix` - S3 REST API ([`S3Store`])
//! - `file:///path` - a local directory acting as a bucket ([`FileStore`])
//! - [`MemoryStore`] - in-process, for tests

mod file;
mod memory;
mod s3;
mod sigv4;

pub use file::FileStore;
pub use memory::{MemoryStore, OperationCounts, StoreOperation};
pub use s3::{S3Options, S3Store};
pub use sigv4::Credentials;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{RepoError, Result};
use crate::metadata::{Acl, ObjectMetadata};

/// Content type of index objects
pub const INDEX_CONTENT_TYPE: &str = "application/x-yaml";

/// Content type of chart archives
pub const CHART_CONTENT_TYPE: &str = "application/gzip";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for a single upload
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub acl: Option<Acl>,
    pub metadata: ObjectMetadata,
}

/// Whole-object storage
///
/// Missing objects are reported as [`RepoError::ObjectNotFound`]; transport
/// and permission failures as [`RepoError::RemoteUnavailable`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object's content
    async fn fetch(&self, location: &str) -> Result<Vec<u8>>;

    /// Read an object's user metadata
    async fn get_metadata(&self, location: &str) -> Result<ObjectMetadata>;

    /// Create or replace an object
    async fn put(&self, location: &str, content: Vec<u8>, options: &PutOptions) -> Result<()>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, location: &str) -> Result<()>;

    /// Check whether an object exists
    async fn exists(&self, location: &str) -> Result<bool> {
        match self.get_metadata(location).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write an index object with its metadata and ACL
    async fn put_index(
        &self,
        location: &str,
        metadata: &ObjectMetadata,
        acl: Option<Acl>,
        content: Vec<u8>,
    ) -> Result<()> {
        let options = PutOptions {
            content_type: Some(INDEX_CONTENT_TYPE.to_string()),
            acl,
            metadata: metadata.clone(),
        };
        self.put(location, content, &options).await
    }
}

/// Backend-independent settings
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Supported location schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    S3,
    File,
}

impl StoreKind {
    /// Detect the backend from a location
    pub fn detect(location: &str) -> Result<Self> {
        if location.starts_with("s3://") {
            Ok(StoreKind::S3)
        } else if location.starts_with("file://") {
            Ok(StoreKind::File)
        } else {
            Err(RepoError::InvalidRepositoryUrl {
                url: location.to_string(),
                reason: "URL must start with s3:// or file://".to_string(),
            })
        }
    }
}

/// Create the store serving `location`
pub fn create_store(location: &str, options: &StoreOptions) -> Result<Box<dyn ObjectStore>> {
    match StoreKind::detect(location)? {
        StoreKind::S3 => {
            let s3 = S3Store::new(S3Options::from_env(options.timeout))?;
            Ok(Box::new(s3))
        }
        StoreKind::File => Ok(Box::new(FileStore::new())),
    }
}

/// Append an object name to a base location
pub fn join_location(base: &str, name: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        name.trim_start_matches('/')
    )
}
