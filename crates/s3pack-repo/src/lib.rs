//! s3pack Repository Management
//!
//! Keeps a Helm chart repository stored in an object store consistent:
//!
//! - **Index document**: `index.yaml` lookup, insertion, removal and merging
//! - **Object stores**: S3 (`s3://`), local directories (`file://`) and an
//!   in-memory store for tests
//! - **Synchronization**: fetch, mutate, artifact side effect, persist with
//!   optimistic re-check, local mirror refresh
//!
//! ## Example
//!
//! ```rust,no_run
//! use s3pack_repo::{ChartSync, RepositoryConfig, StoreOptions, create_store};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RepositoryConfig::load_or_default(&RepositoryConfig::default_path()?)?;
//! let repo = config.lookup("demo")?;
//!
//! let sync = ChartSync::new(create_store(&repo.url, &StoreOptions::default())?);
//! let report = sync.delete(&config, "demo", "nginx", "15.0.0", None).await?;
//! for warning in &report.warnings {
//!     eprintln!("warning: {}", warning);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure model
//!
//! The artifact side effect always happens before the index is persisted.
//! Errors raised between the two carry the affected artifact and report
//! [`RepoError::requires_reconciliation`]; everything earlier leaves the
//! store untouched.

pub mod config;
pub mod error;
pub mod index;
pub mod metadata;
pub mod mirror;
pub mod store;
pub mod sync;

// Re-exports for convenience
pub use config::{INDEX_FILE, RepoEntry, Repository, RepositoryConfig};
pub use error::{RepoError, Result};
pub use index::{ChartEntry, MergeSummary, RepositoryIndex};
pub use metadata::{Acl, ObjectMetadata};
pub use mirror::{LocalMirror, MirrorUpdate};
pub use store::{
    FileStore, MemoryStore, ObjectStore, PutOptions, S3Options, S3Store, StoreKind, StoreOptions,
    create_store,
};
pub use sync::{ChartSync, SyncOptions, SyncReport, SyncStage, SyncWarning};
