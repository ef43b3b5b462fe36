//! CLI commands

use console::style;
use s3pack_repo::{RepositoryConfig, StoreOptions, SyncReport};
use std::path::PathBuf;

use crate::error::Result;

pub mod delete;
pub mod download;
pub mod init;
pub mod push;
pub mod repo;

/// Settings shared by all commands
pub struct Context {
    /// Explicit configuration file (`--config` / `S3PACK_CONFIG`)
    pub config_path: Option<PathBuf>,
    pub store: StoreOptions,
}

impl Context {
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Ok(RepositoryConfig::default_path()?),
        }
    }

    pub fn load_config(&self) -> Result<RepositoryConfig> {
        let path = self.config_path()?;
        tracing::debug!("Loading repositories from {}", path.display());
        Ok(RepositoryConfig::load_or_default(&path)?)
    }
}

/// Print the warnings collected during an operation
pub fn print_warnings(report: &SyncReport) {
    for warning in &report.warnings {
        eprintln!("{} {}", style("!").yellow().bold(), warning);
    }
}
