//! Repository configuration management
//!
//! Stores repository configuration in `~/.config/s3pack/repositories.yaml`.
//! The configuration is loaded once per invocation and handed to the
//! pipeline explicitly; nothing here is global.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RepoError, Result};
use crate::metadata::Acl;
use crate::store::{StoreKind, join_location};

/// Name of the index object inside a repository
pub const INDEX_FILE: &str = "index.yaml";

/// Repository configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Directory for local index mirrors (defaults to the user cache dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Configured repositories
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

fn default_api_version() -> String {
    "s3pack.io/v1".to_string()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            cache_dir: None,
            repositories: Vec::new(),
        }
    }
}

impl RepositoryConfig {
    /// Load configuration from `path`, or an empty one if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| RepoError::InvalidConfig {
            message: format!("{}: {}", path.display(), e),
        })?;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("s3pack").join("repositories.yaml"))
    }

    /// Directory holding local index mirrors
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine cache directory".to_string(),
        })?;
        Ok(cache_dir.join("s3pack").join("repository"))
    }

    /// Get a repository by name
    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Add a repository
    pub fn add(&mut self, repo: Repository) -> Result<()> {
        if self.get(&repo.name).is_some() {
            return Err(RepoError::RepositoryAlreadyExists {
                name: repo.name.clone(),
            });
        }
        self.repositories.push(repo);
        Ok(())
    }

    /// Remove a repository by name
    pub fn remove(&mut self, name: &str) -> Result<Repository> {
        let idx = self
            .repositories
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| RepoError::RepositoryNotFound {
                name: name.to_string(),
            })?;
        Ok(self.repositories.remove(idx))
    }

    /// Resolve a repository name to everything one operation needs
    pub fn lookup(&self, name: &str) -> Result<RepoEntry> {
        let repo = self.get(name).ok_or_else(|| RepoError::RepositoryNotFound {
            name: name.to_string(),
        })?;

        let cache_file = match &repo.cache {
            Some(path) => path.clone(),
            None => self.cache_dir()?.join(format!("{}-index.yaml", repo.name)),
        };

        Ok(RepoEntry {
            name: repo.name.clone(),
            url: repo.url.trim_end_matches('/').to_string(),
            cache_file,
            publish_uri: repo.publish_uri.clone(),
            acl: repo.acl,
        })
    }
}

/// Repository definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Unique name for this repository
    pub name: String,

    /// Base URI of the repository in the object store
    pub url: String,

    /// Local index mirror (defaults to `<cacheDir>/<name>-index.yaml`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<PathBuf>,

    /// Default ACL for uploaded objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<Acl>,

    /// Base URI clients download charts from, when it differs from `url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_uri: Option<String>,
}

impl Repository {
    /// Create a new repository from URL
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let url = url.into();
        StoreKind::detect(&url)?;

        if name.is_empty() || name.contains('/') {
            return Err(RepoError::InvalidConfig {
                message: format!("invalid repository name '{}'", name),
            });
        }

        Ok(Self {
            name,
            url: url.trim_end_matches('/').to_string(),
            cache: None,
            acl: None,
            publish_uri: None,
        })
    }
}

/// A repository resolved for one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoEntry {
    pub name: String,

    /// Base URI, without trailing slash
    pub url: String,

    /// Local index mirror
    pub cache_file: PathBuf,

    /// Configured publish URI, used when the index carries none
    pub publish_uri: Option<String>,

    /// Default ACL for writes
    pub acl: Option<Acl>,
}

impl RepoEntry {
    /// Location of the index object
    pub fn index_url(&self) -> String {
        join_location(&self.url, INDEX_FILE)
    }

    /// Location of a chart archive in this repository
    pub fn artifact_url(&self, name: &str, version: &str) -> String {
        join_location(&self.url, &s3pack_core::archive_file_name(name, version))
    }
}
