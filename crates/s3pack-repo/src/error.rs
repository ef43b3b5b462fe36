//! Error types for repository operations

use thiserror::Error;

/// Repository operation errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error("Repository not found: {name}")]
    RepositoryNotFound { name: String },

    #[error("Repository already exists: {name}")]
    RepositoryAlreadyExists { name: String },

    #[error("Invalid repository URL: {url} - {reason}")]
    InvalidRepositoryUrl { url: String, reason: String },

    #[error("Invalid repository configuration: {message}")]
    InvalidConfig { message: String },

    // ============ Object Store Errors ============
    #[error("Object not found: {location}")]
    ObjectNotFound { location: String },

    #[error("Object store unavailable for {location}: {message}")]
    RemoteUnavailable { location: String, message: String },

    // ============ Index Errors ============
    #[error("Index not found at {location}")]
    IndexNotFound { location: String },

    #[error("Index already exists at {location}")]
    IndexAlreadyExists { location: String },

    #[error("Index at {location} is corrupt: {message}")]
    CorruptIndex { location: String, message: String },

    #[error("Index parse error: {message}")]
    IndexParseError { message: String },

    // ============ Chart Errors ============
    #[error("Version not found: {name}@{version} in repository {repo}")]
    VersionNotFound {
        name: String,
        version: String,
        repo: String,
    },

    #[error("Chart {name}@{version} already exists in repository {repo}")]
    ChartAlreadyExists {
        name: String,
        version: String,
        repo: String,
    },

    #[error("Invalid chart: {0}")]
    InvalidChart(#[from] s3pack_core::CoreError),

    // ============ Synchronization Errors ============
    #[error("Failed to delete chart artifact {location}: {message}")]
    ArtifactDelete { location: String, message: String },

    #[error("Failed to upload chart artifact {location}: {message}")]
    ArtifactUpload { location: String, message: String },

    #[error("Failed to persist index {location}: {message}")]
    IndexPersist {
        location: String,
        message: String,
        /// Artifact already deleted before the failure, if any
        removed_artifact: Option<String>,
    },

    #[error("Index {location} kept changing concurrently, gave up after {attempts} attempt(s)")]
    ConcurrentModification {
        location: String,
        attempts: u32,
        /// Artifact already deleted before the failure, if any
        removed_artifact: Option<String>,
    },

    // ============ Local Mirror Errors ============
    #[error("Local index {path}: {message}")]
    LocalMirror { path: String, message: String },

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ============ Other ============
    #[error("{0}")]
    Other(String),
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    /// The object a store call was made for does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RepoError::ObjectNotFound { .. } | RepoError::IndexNotFound { .. }
        )
    }

    /// The failure left an index that references a deleted artifact
    ///
    /// Operators must repair this by hand: there is no transaction to roll
    /// back across the artifact and the index object.
    pub fn requires_reconciliation(&self) -> bool {
        matches!(
            self,
            RepoError::IndexPersist {
                removed_artifact: Some(_),
                ..
            } | RepoError::ConcurrentModification {
                removed_artifact: Some(_),
                ..
            }
        )
    }

    /// Artifact involved in a reconciliation-window failure
    pub fn removed_artifact(&self) -> Option<&str> {
        match self {
            RepoError::IndexPersist {
                removed_artifact, ..
            }
            | RepoError::ConcurrentModification {
                removed_artifact, ..
            } => removed_artifact.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        let location = e.url().map(|u| u.to_string()).unwrap_or_default();
        let message = if e.is_timeout() {
            "request timed out".to_string()
        } else if e.is_connect() {
            format!("connection failed: {}", e)
        } else {
            e.to_string()
        };
        RepoError::RemoteUnavailable { location, message }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidRepositoryUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}
