//! CLI error types with exit code handling
//!
//! Library errors are mapped onto a small set of user-facing classes, each
//! with its own exit code and, where useful, a hint on what to do next.

use miette::Diagnostic;
use s3pack_core::CoreError;
use s3pack_repo::RepoError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Unknown repository or invalid configuration
    #[error("Configuration error: {message}")]
    #[diagnostic(code(s3pack::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Chart version, index or object does not exist
    #[error("{message}")]
    #[diagnostic(code(s3pack::cli::not_found))]
    NotFound {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Something already exists, or another writer kept winning
    #[error("{message}")]
    #[diagnostic(code(s3pack::cli::conflict))]
    Conflict {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Invalid chart archive
    #[error("Chart error: {message}")]
    #[diagnostic(code(s3pack::cli::chart))]
    Chart { message: String },

    /// Object store call failed
    #[error("{message}")]
    #[diagnostic(code(s3pack::cli::remote))]
    Remote {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Remote index cannot be decoded
    #[error("{message}")]
    #[diagnostic(
        code(s3pack::cli::corrupt_index),
        help("The remote index was left untouched. Repair it or run 's3pack init --force'.")
    )]
    CorruptIndex { message: String },

    /// Artifact deleted but the index still references it
    #[error("{message}")]
    #[diagnostic(code(s3pack::cli::reconcile_required))]
    ReconcileRequired {
        message: String,
        #[help]
        help: String,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(s3pack::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(s3pack::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Conflict { .. } => exit_codes::CONFLICT,
            CliError::Chart { .. } => exit_codes::CHART_ERROR,
            CliError::Remote { .. } => exit_codes::UNAVAILABLE,
            CliError::CorruptIndex { .. } => exit_codes::DATA_ERROR,
            CliError::ReconcileRequired { .. } => exit_codes::RECONCILE_REQUIRED,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        let message = err.to_string();

        if let Some(artifact) = err.removed_artifact() {
            return CliError::ReconcileRequired {
                help: format!(
                    "Artifact {} is already deleted but the index still lists it. \
                     Remove the entry from the index or upload the artifact again.",
                    artifact
                ),
                message,
            };
        }

        match err {
            RepoError::RepositoryNotFound { .. } => CliError::Config {
                message,
                help: Some("Run 's3pack repo list' to see configured repositories".to_string()),
            },
            RepoError::InvalidRepositoryUrl { .. } | RepoError::InvalidConfig { .. } => {
                CliError::Config {
                    message,
                    help: None,
                }
            }
            RepoError::RepositoryAlreadyExists { name } => CliError::Conflict {
                message,
                help: Some(format!("Remove it first with 's3pack repo remove {}'", name)),
            },
            RepoError::IndexNotFound { .. } => CliError::NotFound {
                message,
                help: Some("Create the repository with 's3pack init <uri>'".to_string()),
            },
            RepoError::ObjectNotFound { .. } => CliError::NotFound {
                message,
                help: None,
            },
            RepoError::VersionNotFound {
                name,
                version,
                repo,
            } => CliError::NotFound {
                message: format!(
                    "No such chart version: {}@{} in repository {}",
                    name, version, repo
                ),
                help: Some("Nothing was changed".to_string()),
            },
            RepoError::IndexAlreadyExists { .. } => CliError::Conflict {
                message,
                help: Some("Pass --force to replace it with an empty index".to_string()),
            },
            RepoError::ChartAlreadyExists { .. } => CliError::Conflict {
                message,
                help: Some("Drop --no-overwrite to replace it".to_string()),
            },
            RepoError::ConcurrentModification { .. } => CliError::Conflict {
                message,
                help: Some("Other writers are updating this repository. Retry later.".to_string()),
            },
            RepoError::CorruptIndex { .. } | RepoError::IndexParseError { .. } => {
                CliError::CorruptIndex { message }
            }
            RepoError::InvalidChart(_) => CliError::Chart { message },
            RepoError::RemoteUnavailable { .. } => CliError::Remote {
                message,
                help: Some(
                    "Check network access, the bucket region and the AWS_* credentials"
                        .to_string(),
                ),
            },
            RepoError::ArtifactDelete { .. } | RepoError::ArtifactUpload { .. } => {
                CliError::Remote {
                    message,
                    help: Some("The index was not modified".to_string()),
                }
            }
            RepoError::IndexPersist { .. } => CliError::Remote {
                message,
                help: Some("The index was not updated. Re-run the command.".to_string()),
            },
            RepoError::LocalMirror { .. } | RepoError::Io(_) => CliError::Io { message },
            RepoError::Serialization(_) | RepoError::Other(_) => CliError::Other { message },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
            other => CliError::Chart {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
