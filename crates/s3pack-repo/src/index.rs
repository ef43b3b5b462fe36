//! Repository index types
//!
//! Helm-compatible `index.yaml`. Maps are ordered so that encoding is
//! deterministic: decoding a document this crate wrote and encoding it again
//! yields the same bytes.

use chrono::{DateTime, Utc};
use s3pack_core::{ChartMetadata, Maintainer};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{RepoError, Result};

/// Repository index (Helm-compatible)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Chart versions indexed by chart name
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartEntry>>,

    /// When this index was generated
    #[serde(default = "Utc::now")]
    pub generated: DateTime<Utc>,

    /// Top-level fields this crate does not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl Default for RepositoryIndex {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            entries: BTreeMap::new(),
            generated: Utc::now(),
            extra: BTreeMap::new(),
        }
    }
}

/// Counts of what a concurrent-update merge changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: usize,
    pub removed: usize,
}

impl RepositoryIndex {
    /// Parse index from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::IndexParseError {
            message: e.to_string(),
        })
    }

    /// Parse index from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::IndexParseError {
            message: format!("Invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    /// Encode to the canonical YAML form
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_yaml::to_string(self)?.into_bytes())
    }

    /// Get all versions of a chart
    pub fn get(&self, name: &str) -> Option<&Vec<ChartEntry>> {
        self.entries.get(name)
    }

    /// Get a specific version of a chart
    pub fn get_version(&self, name: &str, version: &str) -> Option<&ChartEntry> {
        self.entries
            .get(name)?
            .iter()
            .find(|e| e.version == version)
    }

    /// Total number of chart versions
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert an entry, replacing any entry with the same name and version
    ///
    /// Returns the replaced entry. Published charts are expected to be
    /// immutable, so callers should surface a replacement to the user.
    pub fn add(&mut self, entry: ChartEntry) -> Option<ChartEntry> {
        let versions = self.entries.entry(entry.name.clone()).or_default();

        let previous = match versions.iter().position(|e| e.version == entry.version) {
            Some(pos) => Some(std::mem::replace(&mut versions[pos], entry)),
            None => {
                versions.push(entry);
                None
            }
        };

        // Newest first, like helm
        versions.sort_by(|a, b| compare_versions(&b.version, &a.version));
        previous
    }

    /// Remove a chart version
    ///
    /// Fails with `VersionNotFound` when there is nothing to remove, so the
    /// caller knows no artifact needs deleting. A chart whose last version is
    /// removed disappears from the index.
    pub fn remove(&mut self, name: &str, version: &str) -> Result<ChartEntry> {
        let not_found = || RepoError::VersionNotFound {
            name: name.to_string(),
            version: version.to_string(),
            repo: "index".to_string(),
        };

        let versions = self.entries.get_mut(name).ok_or_else(not_found)?;
        let pos = versions
            .iter()
            .position(|e| e.version == version)
            .ok_or_else(not_found)?;

        let removed = versions.remove(pos);
        if versions.is_empty() {
            self.entries.remove(name);
        }
        Ok(removed)
    }

    /// Fold in changes another writer made since `base`
    ///
    /// `base` is the document this index was derived from and `theirs` is
    /// the current remote document. Entries the other writer added or
    /// changed are taken, entries it removed are dropped, and anything this
    /// index changed itself relative to `base` is kept as-is. Local deletions
    /// therefore stay deleted.
    pub fn merge_from(
        &mut self,
        base: &RepositoryIndex,
        theirs: &RepositoryIndex,
    ) -> MergeSummary {
        let mut summary = MergeSummary::default();

        // Entries they added or changed
        for entry in theirs.entries.values().flatten() {
            let base_entry = base.get_version(&entry.name, &entry.version);
            if base_entry == Some(entry) {
                continue;
            }
            let ours = self.get_version(&entry.name, &entry.version);
            if ours != base_entry {
                // We touched it too; our mutation wins
                continue;
            }
            if ours.is_none() {
                summary.added += 1;
            }
            self.add(entry.clone());
        }

        // Entries they removed
        for entry in base.entries.values().flatten() {
            if theirs.get_version(&entry.name, &entry.version).is_some() {
                continue;
            }
            if self.get_version(&entry.name, &entry.version) == Some(entry) {
                // Unchanged on our side, so honour their removal
                if self.remove(&entry.name, &entry.version).is_ok() {
                    summary.removed += 1;
                }
            }
        }

        if self.extra == base.extra {
            self.extra = theirs.extra.clone();
        }

        summary
    }

    /// Stamp the generation time
    pub fn touch(&mut self) {
        self.generated = Utc::now();
    }
}

/// Order versions by semver, falling back to string order
fn compare_versions(a: &str, b: &str) -> Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Chart version entry in the index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    /// Chart API version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Chart name
    pub name: String,

    /// Chart version (semver)
    pub version: String,

    /// Application version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Home URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    /// Icon URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Source URLs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    /// Keywords for search
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    /// Maintainers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,

    /// Kubernetes version constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_version: Option<String>,

    /// Chart type (application or library)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// Deprecated flag
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,

    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// URLs to download the chart archive
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA256 digest of the archive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// Creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    /// Fields this crate does not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ChartEntry {
    /// Build an entry for a chart published at `url`
    pub fn from_chart(chart: &ChartMetadata, url: String, digest: String) -> Self {
        Self {
            api_version: Some(chart.api_version.clone()),
            name: chart.name.clone(),
            version: chart.version.to_string(),
            app_version: chart.app_version.clone(),
            description: chart.description.clone(),
            home: chart.home.clone(),
            icon: chart.icon.clone(),
            sources: chart.sources.clone(),
            keywords: chart.keywords.clone(),
            maintainers: chart.maintainers.clone(),
            kube_version: chart.kube_version.clone(),
            r#type: chart.r#type.clone(),
            deprecated: chart.deprecated,
            annotations: chart.annotations.clone(),
            urls: vec![url],
            digest: Some(digest),
            created: Some(Utc::now()),
            extra: BTreeMap::new(),
        }
    }

    /// Get the primary download URL
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }
}
