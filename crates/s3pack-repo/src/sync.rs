//! Index synchronization pipeline
//!
//! Every write follows the same sequence:
//!
//! 1. resolve the repository
//! 2. fetch and decode the remote index
//! 3. mutate a local copy
//! 4. apply the artifact side effect (upload or delete)
//! 5. persist the index, re-checking for concurrent writers first
//! 6. refresh the local mirror from the persisted bytes
//!
//! Steps 1-3 have no side effects and abort cleanly. Step 4 always happens
//! before step 5, so a failure in between can leave the index pointing at a
//! deleted artifact; such errors report [`RepoError::requires_reconciliation`].
//! A failure in step 6 only produces a warning.

use std::fmt;
use std::path::PathBuf;

use s3pack_core::{ChartArchive, compute_digest};

use crate::config::{INDEX_FILE, RepoEntry, RepositoryConfig};
use crate::error::{RepoError, Result};
use crate::index::{ChartEntry, RepositoryIndex};
use crate::metadata::{Acl, ObjectMetadata};
use crate::mirror::LocalMirror;
use crate::store::{CHART_CONTENT_TYPE, ObjectStore, PutOptions, StoreKind, join_location};

/// Default number of persist attempts before giving up on a busy index
pub const DEFAULT_MAX_PERSIST_ATTEMPTS: u32 = 3;

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// How often to re-check and merge before giving up on a busy index
    pub max_persist_attempts: u32,

    /// Stop after the in-memory mutation
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_persist_attempts: DEFAULT_MAX_PERSIST_ATTEMPTS,
            dry_run: false,
        }
    }
}

/// Furthest step an operation reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyncStage {
    Resolved,
    Fetched,
    Decoded,
    Mutated,
    ArtifactUploaded,
    ArtifactRemoved,
    RemotePersisted,
    LocalReconciled,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStage::Resolved => "resolved",
            SyncStage::Fetched => "fetched",
            SyncStage::Decoded => "decoded",
            SyncStage::Mutated => "mutated",
            SyncStage::ArtifactUploaded => "artifact uploaded",
            SyncStage::ArtifactRemoved => "artifact removed",
            SyncStage::RemotePersisted => "index persisted",
            SyncStage::LocalReconciled => "local index updated",
        };
        f.write_str(s)
    }
}

/// Non-fatal problem encountered during an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncWarning {
    /// An existing entry with the same name and version was overwritten
    ReplacedExisting { name: String, version: String },

    /// The local mirror could not be refreshed
    LocalReconcile { path: String, message: String },
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncWarning::ReplacedExisting { name, version } => {
                write!(f, "replaced existing chart {}@{}", name, version)
            }
            SyncWarning::LocalReconcile { path, message } => {
                write!(f, "local index {} not updated: {}", path, message)
            }
        }
    }
}

/// What an operation did
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub repository: String,
    pub index_url: String,
    pub cache_file: PathBuf,
    pub chart: String,
    pub version: String,
    /// Artifact uploaded or deleted (or that would be, on a dry run)
    pub artifact: String,
    pub stage: SyncStage,
    pub dry_run: bool,
    /// Concurrent updates merged before the index could be persisted
    pub merges: u32,
    pub warnings: Vec<SyncWarning>,
}

impl SyncReport {
    fn new(repo: &RepoEntry, chart: &str, version: &str, dry_run: bool) -> Self {
        Self {
            repository: repo.name.clone(),
            index_url: repo.index_url(),
            cache_file: repo.cache_file.clone(),
            chart: chart.to_string(),
            version: version.to_string(),
            artifact: String::new(),
            stage: SyncStage::Resolved,
            dry_run,
            merges: 0,
            warnings: Vec::new(),
        }
    }

    fn advance(&mut self, stage: SyncStage) {
        self.stage = stage;
        tracing::info!(
            "{}: {} ({}@{})",
            self.repository,
            stage,
            self.chart,
            self.version
        );
    }
}

/// Index fetched at the start of an operation
struct Snapshot {
    index: RepositoryIndex,
    bytes: Vec<u8>,
}

/// Runs index-changing operations against one object store
pub struct ChartSync {
    store: Box<dyn ObjectStore>,
    options: SyncOptions,
}

impl ChartSync {
    pub fn new(store: Box<dyn ObjectStore>) -> Self {
        Self::with_options(store, SyncOptions::default())
    }

    pub fn with_options(store: Box<dyn ObjectStore>, options: SyncOptions) -> Self {
        Self { store, options }
    }

    /// Create an empty repository index at `<uri>/index.yaml`
    ///
    /// Returns the index location. An existing index is only replaced when
    /// `force` is set.
    pub async fn init(
        &self,
        uri: &str,
        acl: Option<Acl>,
        publish_uri: Option<String>,
        force: bool,
    ) -> Result<String> {
        StoreKind::detect(uri)?;
        let location = join_location(uri, INDEX_FILE);

        if !force && self.store.exists(&location).await? {
            return Err(RepoError::IndexAlreadyExists { location });
        }

        let encoded = RepositoryIndex::default().to_bytes()?;
        let metadata = ObjectMetadata::for_index(publish_uri);
        self.store
            .put_index(&location, &metadata, acl, encoded)
            .await
            .map_err(|e| RepoError::IndexPersist {
                location: location.clone(),
                message: e.to_string(),
                removed_artifact: None,
            })?;

        tracing::info!("Initialized repository index {}", location);
        Ok(location)
    }

    /// Publish a chart archive and add it to the index
    ///
    /// An existing entry for the same version is replaced with a warning,
    /// unless `allow_replace` is false.
    pub async fn push(
        &self,
        config: &RepositoryConfig,
        repo_name: &str,
        chart: &ChartArchive,
        acl: Option<Acl>,
        allow_replace: bool,
    ) -> Result<SyncReport> {
        let name = chart.metadata.name.as_str();
        let version = chart.metadata.version.to_string();

        let repo = config.lookup(repo_name)?;
        let mut report = SyncReport::new(&repo, name, &version, self.options.dry_run);
        report.advance(SyncStage::Resolved);

        let snapshot = self.fetch_index(&repo, &mut report).await?;
        let metadata = self.index_metadata(&repo).await?;

        let publish_base = metadata
            .publish_uri
            .as_deref()
            .or(repo.publish_uri.as_deref())
            .unwrap_or(&repo.url);
        let entry = ChartEntry::from_chart(
            &chart.metadata,
            join_location(publish_base, &chart.file_name()),
            chart.digest.clone(),
        );

        let mut index = snapshot.index.clone();
        if index.add(entry).is_some() {
            if !allow_replace {
                return Err(RepoError::ChartAlreadyExists {
                    name: name.to_string(),
                    version,
                    repo: repo.name.clone(),
                });
            }
            tracing::warn!("Replacing existing chart {}@{} in {}", name, version, repo.name);
            report.warnings.push(SyncWarning::ReplacedExisting {
                name: name.to_string(),
                version: version.clone(),
            });
        }
        report.artifact = repo.artifact_url(name, &version);
        report.advance(SyncStage::Mutated);

        if self.options.dry_run {
            return Ok(report);
        }

        let upload = PutOptions {
            content_type: Some(CHART_CONTENT_TYPE.to_string()),
            acl: acl.or(repo.acl),
            metadata: ObjectMetadata::for_chart(chart.metadata.to_json()?, chart.digest.clone()),
        };
        self.store
            .put(&report.artifact, chart.data.clone(), &upload)
            .await
            .map_err(|e| RepoError::ArtifactUpload {
                location: report.artifact.clone(),
                message: e.to_string(),
            })?;
        report.advance(SyncStage::ArtifactUploaded);

        self.finish(&repo, snapshot, index, metadata, acl, None, &mut report)
            .await?;
        Ok(report)
    }

    /// Remove a chart version from the index and delete its archive
    pub async fn delete(
        &self,
        config: &RepositoryConfig,
        repo_name: &str,
        name: &str,
        version: &str,
        acl: Option<Acl>,
    ) -> Result<SyncReport> {
        let repo = config.lookup(repo_name)?;
        let mut report = SyncReport::new(&repo, name, version, self.options.dry_run);
        report.advance(SyncStage::Resolved);

        let snapshot = self.fetch_index(&repo, &mut report).await?;

        let mut index = snapshot.index.clone();
        let removed = index
            .remove(name, version)
            .map_err(|_| RepoError::VersionNotFound {
                name: name.to_string(),
                version: version.to_string(),
                repo: repo.name.clone(),
            })?;
        report.advance(SyncStage::Mutated);

        let metadata = self.index_metadata(&repo).await?;
        report.artifact = artifact_location(&repo, &removed, name, version);

        if self.options.dry_run {
            return Ok(report);
        }

        self.store
            .delete(&report.artifact)
            .await
            .map_err(|e| RepoError::ArtifactDelete {
                location: report.artifact.clone(),
                message: e.to_string(),
            })?;
        report.advance(SyncStage::ArtifactRemoved);

        let removed_artifact = report.artifact.clone();
        self.finish(
            &repo,
            snapshot,
            index,
            metadata,
            acl,
            Some(&removed_artifact),
            &mut report,
        )
        .await?;
        Ok(report)
    }

    async fn fetch_index(&self, repo: &RepoEntry, report: &mut SyncReport) -> Result<Snapshot> {
        let location = repo.index_url();

        let bytes = self.store.fetch(&location).await.map_err(|e| {
            if e.is_not_found() {
                RepoError::IndexNotFound {
                    location: location.clone(),
                }
            } else {
                e
            }
        })?;
        report.advance(SyncStage::Fetched);

        let index = RepositoryIndex::from_bytes(&bytes).map_err(|e| RepoError::CorruptIndex {
            location: location.clone(),
            message: e.to_string(),
        })?;
        report.advance(SyncStage::Decoded);

        Ok(Snapshot { index, bytes })
    }

    /// Metadata recorded on the index object, with the configured publish
    /// URI filled in when the object carries none
    async fn index_metadata(&self, repo: &RepoEntry) -> Result<ObjectMetadata> {
        let mut metadata = self.store.get_metadata(&repo.index_url()).await?;
        if metadata.publish_uri.is_none() {
            metadata.publish_uri = repo.publish_uri.clone();
        }
        Ok(metadata)
    }

    /// Persist the index, then refresh the local mirror
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        repo: &RepoEntry,
        snapshot: Snapshot,
        index: RepositoryIndex,
        metadata: ObjectMetadata,
        acl: Option<Acl>,
        removed_artifact: Option<&str>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let (persisted, encoded, merges) = self
            .persist(repo, snapshot, index, &metadata, acl.or(repo.acl), removed_artifact)
            .await
            .inspect_err(|e| {
                if e.requires_reconciliation() {
                    tracing::error!(
                        "Artifact {} was deleted but index {} still references it: {}",
                        removed_artifact.unwrap_or_default(),
                        repo.index_url(),
                        e
                    );
                }
            })?;
        report.merges = merges;
        report.advance(SyncStage::RemotePersisted);

        let mirror = LocalMirror::new(&repo.cache_file);
        match mirror.reconcile(&persisted, &encoded) {
            Ok(update) => {
                match update.previous_entries {
                    Some(previous) => tracing::debug!(
                        "Local index {}: {} -> {} chart versions",
                        repo.cache_file.display(),
                        previous,
                        update.entries
                    ),
                    None => tracing::debug!(
                        "Local index {} created with {} chart versions",
                        repo.cache_file.display(),
                        update.entries
                    ),
                }
                report.advance(SyncStage::LocalReconciled);
            }
            Err(e) => {
                tracing::warn!("{}", e);
                report.warnings.push(SyncWarning::LocalReconcile {
                    path: repo.cache_file.display().to_string(),
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Write the index unless another writer got there first
    ///
    /// The remote index is re-fetched and compared with the snapshot the
    /// mutation was based on. On a mismatch the other writer's changes are
    /// merged in and the check is repeated, up to `max_persist_attempts`
    /// times. Returns the persisted document, its bytes and the merge count.
    async fn persist(
        &self,
        repo: &RepoEntry,
        snapshot: Snapshot,
        mut index: RepositoryIndex,
        metadata: &ObjectMetadata,
        acl: Option<Acl>,
        removed_artifact: Option<&str>,
    ) -> Result<(RepositoryIndex, Vec<u8>, u32)> {
        let location = repo.index_url();
        let persist_error = |message: String| RepoError::IndexPersist {
            location: location.clone(),
            message,
            removed_artifact: removed_artifact.map(str::to_string),
        };

        let attempts = self.options.max_persist_attempts.max(1);
        let mut base = snapshot.index;
        let mut fingerprint = compute_digest(&snapshot.bytes);
        let mut merges = 0;

        for attempt in 1..=attempts {
            let current = self
                .store
                .fetch(&location)
                .await
                .map_err(|e| persist_error(e.to_string()))?;
            let current_fingerprint = compute_digest(&current);

            if current_fingerprint != fingerprint {
                let theirs = RepositoryIndex::from_bytes(&current).map_err(|e| {
                    persist_error(format!("index was replaced with an unreadable document: {}", e))
                })?;
                let summary = index.merge_from(&base, &theirs);
                tracing::warn!(
                    "Index {} changed concurrently (attempt {}/{}): +{} -{} entries merged",
                    location,
                    attempt,
                    attempts,
                    summary.added,
                    summary.removed
                );
                base = theirs;
                fingerprint = current_fingerprint;
                merges += 1;
                continue;
            }

            index.touch();
            let encoded = index
                .to_bytes()
                .map_err(|e| persist_error(e.to_string()))?;
            self.store
                .put_index(&location, metadata, acl, encoded.clone())
                .await
                .map_err(|e| persist_error(e.to_string()))?;

            return Ok((index, encoded, merges));
        }

        Err(RepoError::ConcurrentModification {
            location,
            attempts,
            removed_artifact: removed_artifact.map(str::to_string),
        })
    }
}

/// Object to delete for a removed entry
///
/// The URL stored in the entry is used when it points into the repository
/// itself. Entries published under a separate download URI are mapped back
/// to the canonical `<repo>/<name>-<version>.tgz` key.
fn artifact_location(repo: &RepoEntry, entry: &ChartEntry, name: &str, version: &str) -> String {
    let prefix = format!("{}/", repo.url);
    match entry.download_url() {
        Some(url) if url.starts_with(&prefix) => url.to_string(),
        _ => repo.artifact_url(name, version),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Repository;
    use crate::store::{MemoryStore, OperationCounts, StoreOperation};
    use async_trait::async_trait;
    use s3pack_core::ChartMetadata;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    const REPO_URL: &str = "s3://bucket/charts";
    const INDEX: &str = "s3://bucket/charts/index.yaml";
    const PUBLISH_URI: &str = "https://charts.example.com";

    fn artifact(name: &str, version: &str) -> String {
        format!("{}/{}-{}.tgz", REPO_URL, name, version)
    }

    fn test_config(temp: &TempDir) -> RepositoryConfig {
        let mut config = RepositoryConfig {
            cache_dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        config
            .add(Repository::new("demo", REPO_URL).unwrap())
            .unwrap();
        config
    }

    fn cache_file(temp: &TempDir) -> PathBuf {
        temp.path().join("demo-index.yaml")
    }

    /// Seed an index plus one artifact per chart version
    fn seed(store: &MemoryStore, charts: &[(&str, &str)]) -> Vec<u8> {
        let mut index = RepositoryIndex::default();
        for (name, version) in charts {
            index.add(ChartEntry {
                name: name.to_string(),
                version: version.to_string(),
                urls: vec![artifact(name, version)],
                ..Default::default()
            });
            store.insert(&artifact(name, version), b"tgz".to_vec(), ObjectMetadata::default());
        }
        let bytes = index.to_bytes().unwrap();
        store.insert(
            INDEX,
            bytes.clone(),
            ObjectMetadata::for_index(Some(PUBLISH_URI.to_string())),
        );
        bytes
    }

    fn remote_index(store: &MemoryStore) -> RepositoryIndex {
        RepositoryIndex::from_bytes(&store.object(INDEX).unwrap()).unwrap()
    }

    fn archive(name: &str, version: &str) -> ChartArchive {
        let metadata =
            ChartMetadata::from_yaml(&format!("name: {}\nversion: {}\n", name, version)).unwrap();
        let data = format!("archive of {}-{}", name, version).into_bytes();
        ChartArchive {
            path: PathBuf::from(format!("{}-{}.tgz", name, version)),
            digest: compute_digest(&data),
            metadata,
            data,
        }
    }

    // ============ Delete ============

    #[tokio::test]
    async fn test_delete_removes_artifact_entry_and_updates_cache() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        seed(&store, &[("app", "1.0.0"), ("app", "1.1.0"), ("web", "2.0.0")]);

        let sync = ChartSync::new(Box::new(store.clone()));
        let report = sync
            .delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap();

        assert_eq!(report.stage, SyncStage::LocalReconciled);
        assert_eq!(report.artifact, artifact("app", "1.0.0"));
        assert!(report.warnings.is_empty());
        assert_eq!(report.merges, 0);

        assert!(!store.contains(&artifact("app", "1.0.0")));
        assert!(store.contains(&artifact("app", "1.1.0")));

        let index = remote_index(&store);
        assert!(index.get_version("app", "1.0.0").is_none());
        assert!(index.get_version("app", "1.1.0").is_some());
        assert!(index.get_version("web", "2.0.0").is_some());

        // Mirror is byte-identical to the remote index
        assert_eq!(
            std::fs::read(cache_file(&temp)).unwrap(),
            store.object(INDEX).unwrap()
        );

        // Index metadata preserved
        assert_eq!(
            store.metadata(INDEX).unwrap().publish_uri.as_deref(),
            Some(PUBLISH_URI)
        );
    }

    #[tokio::test]
    async fn test_delete_last_version_drops_chart() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        seed(&store, &[("app", "1.0.0")]);

        let sync = ChartSync::new(Box::new(store.clone()));
        sync.delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap();

        let index = remote_index(&store);
        assert!(index.get("app").is_none());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_delete_absent_version_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        let original = seed(&store, &[("app", "1.0.0")]);
        let objects = store.locations();

        let sync = ChartSync::new(Box::new(store.clone()));
        let err = sync
            .delete(&config, "demo", "app", "2.0.0", None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RepoError::VersionNotFound { ref repo, .. } if repo == "demo"
        ));
        assert_eq!(store.object(INDEX).unwrap(), original);
        assert_eq!(store.locations(), objects);
        assert_eq!(
            store.operation_counts(),
            OperationCounts {
                fetches: 1,
                ..Default::default()
            }
        );
        assert!(!cache_file(&temp).exists());
    }

    #[tokio::test]
    async fn test_delete_twice_reports_not_found() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        seed(&store, &[("app", "1.0.0"), ("app", "1.1.0")]);

        let sync = ChartSync::new(Box::new(store.clone()));
        sync.delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap();
        let err = sync
            .delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_unknown_repository() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();

        let sync = ChartSync::new(Box::new(store.clone()));
        let err = sync
            .delete(&config, "nope", "app", "1.0.0", None)
            .await
            .unwrap_err();

        assert!(matches!(err, RepoError::RepositoryNotFound { .. }));
        assert_eq!(store.operation_counts(), OperationCounts::default());
    }

    #[tokio::test]
    async fn test_missing_index() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let sync = ChartSync::new(Box::new(MemoryStore::new()));

        let err = sync
            .delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::IndexNotFound { .. }));
    }

    #[tokio::test]
    async fn test_remote_unavailable_surfaces_unmodified() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        seed(&store, &[("app", "1.0.0")]);
        store.fail(StoreOperation::Fetch, INDEX);

        let sync = ChartSync::new(Box::new(store.clone()));
        let err = sync
            .delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap_err();

        assert!(matches!(err, RepoError::RemoteUnavailable { .. }));
        assert_eq!(store.operation_counts().fetches, 1);
        assert!(store.contains(&artifact("app", "1.0.0")));
    }

    #[tokio::test]
    async fn test_corrupt_index_aborts() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        seed(&store, &[("app", "1.0.0")]);
        store.insert(INDEX, b"entries: [not closed".to_vec(), ObjectMetadata::default());

        let sync = ChartSync::new(Box::new(store.clone()));
        let err = sync
            .delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap_err();

        assert!(matches!(err, RepoError::CorruptIndex { .. }));
        assert_eq!(store.object(INDEX).unwrap(), b"entries: [not closed");
        let counts = store.operation_counts();
        assert_eq!(counts.deletes, 0);
        assert_eq!(counts.puts, 0);
    }

    #[tokio::test]
    async fn test_artifact_delete_failure_leaves_index_alone() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        let original = seed(&store, &[("app", "1.0.0")]);
        store.fail(StoreOperation::Delete, &artifact("app", "1.0.0"));

        let sync = ChartSync::new(Box::new(store.clone()));
        let err = sync
            .delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap_err();

        assert!(matches!(err, RepoError::ArtifactDelete { .. }));
        assert!(!err.requires_reconciliation());
        assert!(store.contains(&artifact("app", "1.0.0")));
        assert_eq!(store.object(INDEX).unwrap(), original);
        assert_eq!(store.operation_counts().puts, 0);
    }

    #[tokio::test]
    async fn test_index_persist_failure_requires_reconciliation() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        let original = seed(&store, &[("app", "1.0.0")]);
        store.fail(StoreOperation::Put, INDEX);

        let sync = ChartSync::new(Box::new(store.clone()));
        let err = sync
            .delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap_err();

        assert!(matches!(err, RepoError::IndexPersist { .. }));
        assert!(err.requires_reconciliation());
        assert_eq!(err.removed_artifact(), Some(artifact("app", "1.0.0").as_str()));

        // Artifact gone, index still references it
        assert!(!store.contains(&artifact("app", "1.0.0")));
        assert_eq!(store.object(INDEX).unwrap(), original);
        assert!(!cache_file(&temp).exists());
    }

    #[tokio::test]
    async fn test_mirror_failure_is_only_a_warning() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut config = RepositoryConfig::default();
        let mut repo = Repository::new("demo", REPO_URL).unwrap();
        repo.cache = Some(blocker.join("demo-index.yaml"));
        config.add(repo).unwrap();

        let store = MemoryStore::new();
        seed(&store, &[("app", "1.0.0")]);

        let sync = ChartSync::new(Box::new(store.clone()));
        let report = sync
            .delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap();

        assert_eq!(report.stage, SyncStage::RemotePersisted);
        assert!(matches!(
            report.warnings.as_slice(),
            [SyncWarning::LocalReconcile { .. }]
        ));
        assert!(remote_index(&store).get("app").is_none());
    }

    #[tokio::test]
    async fn test_stale_mirror_is_replaced() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        std::fs::write(cache_file(&temp), "entries: {garbage").unwrap();

        let store = MemoryStore::new();
        seed(&store, &[("app", "1.0.0"), ("web", "1.0.0")]);

        let sync = ChartSync::new(Box::new(store.clone()));
        let report = sync
            .delete(&config, "demo", "web", "1.0.0", None)
            .await
            .unwrap();

        assert_eq!(report.stage, SyncStage::LocalReconciled);
        assert_eq!(
            std::fs::read(cache_file(&temp)).unwrap(),
            store.object(INDEX).unwrap()
        );
    }

    #[tokio::test]
    async fn test_delete_uses_repository_acl_unless_overridden() {
        let temp = TempDir::new().unwrap();
        let mut config = test_config(&temp);
        config.repositories[0].acl = Some(Acl::PublicRead);

        let store = MemoryStore::new();
        seed(&store, &[("app", "1.0.0"), ("app", "1.1.0")]);
        let sync = ChartSync::new(Box::new(store.clone()));

        sync.delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap();
        assert_eq!(store.acl(INDEX), Some(Acl::PublicRead));

        sync.delete(&config, "demo", "app", "1.1.0", Some(Acl::Private))
            .await
            .unwrap();
        assert_eq!(store.acl(INDEX), Some(Acl::Private));
    }

    #[tokio::test]
    async fn test_delete_maps_publish_url_to_repository_key() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();

        let mut index = RepositoryIndex::default();
        index.add(ChartEntry {
            name: "app".to_string(),
            version: "1.0.0".to_string(),
            urls: vec![format!("{}/app-1.0.0.tgz", PUBLISH_URI)],
            ..Default::default()
        });
        store.insert(INDEX, index.to_bytes().unwrap(), ObjectMetadata::default());
        store.insert(&artifact("app", "1.0.0"), b"tgz".to_vec(), ObjectMetadata::default());

        let sync = ChartSync::new(Box::new(store.clone()));
        let report = sync
            .delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap();

        assert_eq!(report.artifact, artifact("app", "1.0.0"));
        assert!(!store.contains(&artifact("app", "1.0.0")));
    }

    #[tokio::test]
    async fn test_delete_dry_run_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        let original = seed(&store, &[("app", "1.0.0")]);

        let sync = ChartSync::with_options(
            Box::new(store.clone()),
            SyncOptions {
                dry_run: true,
                ..Default::default()
            },
        );
        let report = sync
            .delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.stage, SyncStage::Mutated);
        assert_eq!(report.artifact, artifact("app", "1.0.0"));
        assert_eq!(store.object(INDEX).unwrap(), original);
        let counts = store.operation_counts();
        assert_eq!(counts.deletes, 0);
        assert_eq!(counts.puts, 0);
    }

    // ============ Concurrency ============

    /// Runs a second writer's delete right after this writer's artifact delete
    struct InterleavingStore {
        inner: MemoryStore,
        trigger: String,
        other: ChartSync,
        config: RepositoryConfig,
        other_delete: (String, String),
        fired: AtomicBool,
    }

    #[async_trait]
    impl ObjectStore for InterleavingStore {
        async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
            self.inner.fetch(location).await
        }

        async fn get_metadata(&self, location: &str) -> Result<ObjectMetadata> {
            self.inner.get_metadata(location).await
        }

        async fn put(&self, location: &str, content: Vec<u8>, options: &PutOptions) -> Result<()> {
            self.inner.put(location, content, options).await
        }

        async fn delete(&self, location: &str) -> Result<()> {
            if location == self.trigger && !self.fired.swap(true, Ordering::SeqCst) {
                let (name, version) = &self.other_delete;
                self.other
                    .delete(&self.config, "demo", name, version, None)
                    .await?;
            }
            self.inner.delete(location).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_deletes_are_both_kept() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        seed(&store, &[("app", "1.0.0"), ("db", "1.0.0"), ("web", "1.0.0")]);

        let writer_a = ChartSync::new(Box::new(InterleavingStore {
            inner: store.clone(),
            trigger: artifact("app", "1.0.0"),
            other: ChartSync::new(Box::new(store.clone())),
            config: config.clone(),
            other_delete: ("db".to_string(), "1.0.0".to_string()),
            fired: AtomicBool::new(false),
        }));

        let report = writer_a
            .delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap();
        assert_eq!(report.merges, 1);

        let index = remote_index(&store);
        assert!(index.get("app").is_none());
        assert!(index.get("db").is_none());
        assert!(index.get_version("web", "1.0.0").is_some());
        assert!(!store.contains(&artifact("app", "1.0.0")));
        assert!(!store.contains(&artifact("db", "1.0.0")));
        assert_eq!(
            std::fs::read(cache_file(&temp)).unwrap(),
            store.object(INDEX).unwrap()
        );
    }

    #[tokio::test]
    async fn test_concurrent_push_is_not_lost() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        seed(&store, &[("app", "1.0.0"), ("web", "1.0.0")]);

        // B pushes web 2.0.0 while A deletes app 1.0.0
        struct PushingStore {
            inner: MemoryStore,
            other: ChartSync,
            config: RepositoryConfig,
            fired: AtomicBool,
        }

        #[async_trait]
        impl ObjectStore for PushingStore {
            async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
                self.inner.fetch(location).await
            }
            async fn get_metadata(&self, location: &str) -> Result<ObjectMetadata> {
                self.inner.get_metadata(location).await
            }
            async fn put(
                &self,
                location: &str,
                content: Vec<u8>,
                options: &PutOptions,
            ) -> Result<()> {
                self.inner.put(location, content, options).await
            }
            async fn delete(&self, location: &str) -> Result<()> {
                if !self.fired.swap(true, Ordering::SeqCst) {
                    self.other
                        .push(&self.config, "demo", &archive("web", "2.0.0"), None, true)
                        .await?;
                }
                self.inner.delete(location).await
            }
        }

        let writer_a = ChartSync::new(Box::new(PushingStore {
            inner: store.clone(),
            other: ChartSync::new(Box::new(store.clone())),
            config: config.clone(),
            fired: AtomicBool::new(false),
        }));
        writer_a
            .delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap();

        let index = remote_index(&store);
        assert!(index.get("app").is_none());
        assert!(index.get_version("web", "1.0.0").is_some());
        assert!(index.get_version("web", "2.0.0").is_some());
    }

    /// Rewrites the index after every read of it
    struct ChurningStore {
        inner: MemoryStore,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for ChurningStore {
        async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
            let bytes = self.inner.fetch(location).await?;
            if location == INDEX {
                let n = self.reads.fetch_add(1, Ordering::SeqCst);
                let mut index = RepositoryIndex::from_bytes(&bytes)?;
                index.add(ChartEntry {
                    name: "churn".to_string(),
                    version: format!("0.0.{}", n),
                    ..Default::default()
                });
                let metadata = self.inner.metadata(location).unwrap_or_default();
                self.inner.insert(location, index.to_bytes()?, metadata);
            }
            Ok(bytes)
        }

        async fn get_metadata(&self, location: &str) -> Result<ObjectMetadata> {
            self.inner.get_metadata(location).await
        }

        async fn put(&self, location: &str, content: Vec<u8>, options: &PutOptions) -> Result<()> {
            self.inner.put(location, content, options).await
        }

        async fn delete(&self, location: &str) -> Result<()> {
            self.inner.delete(location).await
        }
    }

    #[tokio::test]
    async fn test_busy_index_gives_up() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        seed(&store, &[("app", "1.0.0")]);

        let sync = ChartSync::new(Box::new(ChurningStore {
            inner: store.clone(),
            reads: AtomicUsize::new(0),
        }));
        let err = sync
            .delete(&config, "demo", "app", "1.0.0", None)
            .await
            .unwrap_err();

        match &err {
            RepoError::ConcurrentModification { attempts, .. } => {
                assert_eq!(*attempts, DEFAULT_MAX_PERSIST_ATTEMPTS)
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.requires_reconciliation());
        assert_eq!(store.operation_counts().puts, 0);
    }

    // ============ Push ============

    #[tokio::test]
    async fn test_push_uploads_and_indexes() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        seed(&store, &[("app", "1.0.0")]);

        let chart = archive("app", "2.0.0");
        let sync = ChartSync::new(Box::new(store.clone()));
        let report = sync
            .push(&config, "demo", &chart, Some(Acl::PublicRead), true)
            .await
            .unwrap();

        assert_eq!(report.stage, SyncStage::LocalReconciled);
        assert_eq!(report.artifact, artifact("app", "2.0.0"));

        assert_eq!(store.object(&artifact("app", "2.0.0")).unwrap(), chart.data);
        assert_eq!(store.acl(&artifact("app", "2.0.0")), Some(Acl::PublicRead));
        let artifact_metadata = store.metadata(&artifact("app", "2.0.0")).unwrap();
        assert_eq!(artifact_metadata.chart_digest.as_deref(), Some(chart.digest.as_str()));
        assert_eq!(
            artifact_metadata.chart_metadata.as_deref(),
            Some(r#"{"apiVersion":"v2","name":"app","version":"2.0.0"}"#)
        );

        let index = remote_index(&store);
        let entry = index.get_version("app", "2.0.0").unwrap();
        assert_eq!(entry.download_url(), Some("https://charts.example.com/app-2.0.0.tgz"));
        assert_eq!(entry.digest.as_deref(), Some(chart.digest.as_str()));
        assert_eq!(index.get("app").unwrap()[0].version, "2.0.0");

        assert_eq!(
            std::fs::read(cache_file(&temp)).unwrap(),
            store.object(INDEX).unwrap()
        );
    }

    #[tokio::test]
    async fn test_push_without_publish_uri_uses_repository_url() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        store.insert(
            INDEX,
            RepositoryIndex::default().to_bytes().unwrap(),
            ObjectMetadata::default(),
        );

        let sync = ChartSync::new(Box::new(store.clone()));
        sync.push(&config, "demo", &archive("app", "1.0.0"), None, true)
            .await
            .unwrap();

        let index = remote_index(&store);
        assert_eq!(
            index.get_version("app", "1.0.0").unwrap().download_url(),
            Some(artifact("app", "1.0.0").as_str())
        );
    }

    #[tokio::test]
    async fn test_push_existing_version_warns() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        seed(&store, &[("app", "1.0.0")]);

        let sync = ChartSync::new(Box::new(store.clone()));
        let report = sync
            .push(&config, "demo", &archive("app", "1.0.0"), None, true)
            .await
            .unwrap();

        assert_eq!(
            report.warnings,
            vec![SyncWarning::ReplacedExisting {
                name: "app".to_string(),
                version: "1.0.0".to_string(),
            }]
        );
        assert_eq!(remote_index(&store).get("app").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_push_existing_version_refused() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        let original = seed(&store, &[("app", "1.0.0")]);

        let sync = ChartSync::new(Box::new(store.clone()));
        let err = sync
            .push(&config, "demo", &archive("app", "1.0.0"), None, false)
            .await
            .unwrap_err();

        assert!(matches!(err, RepoError::ChartAlreadyExists { .. }));
        assert_eq!(store.operation_counts().puts, 0);
        assert_eq!(store.object(INDEX).unwrap(), original);
        assert_eq!(store.object(&artifact("app", "1.0.0")).unwrap(), b"tgz");
    }

    #[tokio::test]
    async fn test_push_upload_failure_leaves_index_alone() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        let original = seed(&store, &[("app", "1.0.0")]);
        store.fail(StoreOperation::Put, &artifact("app", "2.0.0"));

        let sync = ChartSync::new(Box::new(store.clone()));
        let err = sync
            .push(&config, "demo", &archive("app", "2.0.0"), None, true)
            .await
            .unwrap_err();

        assert!(matches!(err, RepoError::ArtifactUpload { .. }));
        assert!(!err.requires_reconciliation());
        assert_eq!(store.object(INDEX).unwrap(), original);
    }

    #[tokio::test]
    async fn test_push_dry_run_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let store = MemoryStore::new();
        seed(&store, &[("app", "1.0.0")]);

        let sync = ChartSync::with_options(
            Box::new(store.clone()),
            SyncOptions {
                dry_run: true,
                ..Default::default()
            },
        );
        let report = sync
            .push(&config, "demo", &archive("app", "2.0.0"), None, true)
            .await
            .unwrap();

        assert_eq!(report.stage, SyncStage::Mutated);
        assert_eq!(store.operation_counts().puts, 0);
        assert!(!store.contains(&artifact("app", "2.0.0")));
    }

    // ============ Init ============

    #[tokio::test]
    async fn test_init_writes_empty_index() {
        let store = MemoryStore::new();
        let sync = ChartSync::new(Box::new(store.clone()));

        let location = sync
            .init(REPO_URL, Some(Acl::Private), Some(PUBLISH_URI.to_string()), false)
            .await
            .unwrap();

        assert_eq!(location, INDEX);
        assert!(remote_index(&store).is_empty());
        assert_eq!(store.acl(INDEX), Some(Acl::Private));
        assert_eq!(
            store.metadata(INDEX).unwrap().publish_uri.as_deref(),
            Some(PUBLISH_URI)
        );
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let store = MemoryStore::new();
        let original = seed(&store, &[("app", "1.0.0")]);
        let sync = ChartSync::new(Box::new(store.clone()));

        let err = sync.init(REPO_URL, None, None, false).await.unwrap_err();
        assert!(matches!(err, RepoError::IndexAlreadyExists { .. }));
        assert_eq!(store.object(INDEX).unwrap(), original);

        sync.init(REPO_URL, None, None, true).await.unwrap();
        assert!(remote_index(&store).is_empty());
    }

    #[tokio::test]
    async fn test_init_rejects_unsupported_scheme() {
        let sync = ChartSync::new(Box::new(MemoryStore::new()));
        let err = sync
            .init("https://charts.example.com", None, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidRepositoryUrl { .. }));
    }
}
