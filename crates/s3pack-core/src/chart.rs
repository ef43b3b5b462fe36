//! Chart metadata (`Chart.yaml`)

use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};

/// Metadata of a chart, as declared in its `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// Chart API version (v1 or v2)
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Chart name (required)
    pub name: String,

    /// Chart version (required, SemVer)
    #[serde(with = "version_serde")]
    pub version: Version,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Application version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    /// Kubernetes version constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_version: Option<String>,

    /// Chart type (application or library)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// Home URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    /// Icon URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Source URLs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    /// Keywords
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    /// Maintainers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,

    /// Deprecated flag
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,

    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

fn default_api_version() -> String {
    "v2".to_string()
}

/// Maintainer information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ChartMetadata {
    /// Parse and validate a `Chart.yaml` document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let metadata: Self = serde_yaml::from_str(yaml)?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Check the fields that identify a chart in a repository
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "name".to_string(),
            });
        }

        // The name ends up in object keys and file names
        if self.name.contains('/') || self.name.contains('\\') || self.name.contains("..") {
            return Err(CoreError::InvalidChart {
                message: format!("chart name '{}' must not contain path separators", self.name),
            });
        }

        if self.api_version != "v1" && self.api_version != "v2" {
            return Err(CoreError::InvalidChart {
                message: format!(
                    "unsupported apiVersion '{}', expected v1 or v2",
                    self.api_version
                ),
            });
        }

        Ok(())
    }

    /// Serialize as compact JSON, the form stored in object metadata
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Custom serde for semver::Version
mod version_serde {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Version::parse(s.trim_start_matches('v')).map_err(serde::de::Error::custom)
    }
}
