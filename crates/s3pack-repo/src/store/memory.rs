//! In-memory object store for testing
//!
//! Objects live in a shared map, so clones of one store observe each
//! other's writes. Every trait call is counted, and individual calls can be
//! made to fail.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ObjectStore, PutOptions};
use crate::error::{RepoError, Result};
use crate::metadata::{Acl, ObjectMetadata};

#[derive(Debug, Clone)]
struct StoredObject {
    content: Vec<u8>,
    metadata: ObjectMetadata,
    acl: Option<Acl>,
    content_type: Option<String>,
}

/// Store operations that can be counted or made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Fetch,
    GetMetadata,
    Put,
    Delete,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub fetches: usize,
    pub metadata_reads: usize,
    pub puts: usize,
    pub deletes: usize,
}

/// In-memory object store
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
    operations: Arc<RwLock<OperationCounts>>,
    failures: Arc<RwLock<HashSet<(StoreOperation, String)>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting an operation
    pub fn insert(&self, location: &str, content: Vec<u8>, metadata: ObjectMetadata) {
        write(&self.objects).insert(
            location.to_string(),
            StoredObject {
                content,
                metadata,
                acl: None,
                content_type: None,
            },
        );
    }

    /// Content of an object, if present
    pub fn object(&self, location: &str) -> Option<Vec<u8>> {
        read(&self.objects).get(location).map(|o| o.content.clone())
    }

    /// Metadata of an object, if present
    pub fn metadata(&self, location: &str) -> Option<ObjectMetadata> {
        read(&self.objects).get(location).map(|o| o.metadata.clone())
    }

    /// ACL the object was last written with
    pub fn acl(&self, location: &str) -> Option<Acl> {
        read(&self.objects).get(location).and_then(|o| o.acl)
    }

    /// Content type the object was last written with
    pub fn content_type(&self, location: &str) -> Option<String> {
        read(&self.objects)
            .get(location)
            .and_then(|o| o.content_type.clone())
    }

    pub fn contains(&self, location: &str) -> bool {
        read(&self.objects).contains_key(location)
    }

    /// All object locations, sorted
    pub fn locations(&self) -> Vec<String> {
        read(&self.objects).keys().cloned().collect()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        read(&self.operations).clone()
    }

    /// Make every `operation` on `location` fail
    pub fn fail(&self, operation: StoreOperation, location: &str) {
        write(&self.failures).insert((operation, location.to_string()));
    }

    fn record(&self, operation: StoreOperation, location: &str) -> Result<()> {
        {
            let mut ops = write(&self.operations);
            match operation {
                StoreOperation::Fetch => ops.fetches += 1,
                StoreOperation::GetMetadata => ops.metadata_reads += 1,
                StoreOperation::Put => ops.puts += 1,
                StoreOperation::Delete => ops.deletes += 1,
            }
        }

        if read(&self.failures).contains(&(operation, location.to_string())) {
            return Err(RepoError::RemoteUnavailable {
                location: location.to_string(),
                message: format!("injected {:?} failure", operation),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        self.record(StoreOperation::Fetch, location)?;
        self.object(location).ok_or_else(|| RepoError::ObjectNotFound {
            location: location.to_string(),
        })
    }

    async fn get_metadata(&self, location: &str) -> Result<ObjectMetadata> {
        self.record(StoreOperation::GetMetadata, location)?;
        self.metadata(location).ok_or_else(|| RepoError::ObjectNotFound {
            location: location.to_string(),
        })
    }

    async fn put(&self, location: &str, content: Vec<u8>, options: &PutOptions) -> Result<()> {
        self.record(StoreOperation::Put, location)?;
        write(&self.objects).insert(
            location.to_string(),
            StoredObject {
                content,
                metadata: options.metadata.clone(),
                acl: options.acl,
                content_type: options.content_type.clone(),
            },
        );
        Ok(())
    }

    async fn delete(&self, location: &str) -> Result<()> {
        self.record(StoreOperation::Delete, location)?;
        write(&self.objects).remove(location);
        Ok(())
    }
}
