//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Chart archive not found: {path}")]
    ArchiveNotFound { path: String },

    #[error("Invalid chart archive {path}: {message}")]
    InvalidArchive { path: String, message: String },

    #[error("Invalid Chart.yaml: {message}")]
    InvalidChart { message: String },

    #[error("Failed to parse Chart.yaml: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to serialize JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
