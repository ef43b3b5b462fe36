//! Object metadata and access control
//!
//! Object stores attach a flat string map to every object. A few keys carry
//! meaning for chart repositories; everything else is kept as-is so metadata
//! written by newer tools survives a round trip through this one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::RepoError;

/// Base URI under which chart archives are published (set on the index object)
pub const META_PUBLISH_URI: &str = "chart-publish-uri";

/// JSON-encoded `Chart.yaml` (set on chart archive objects)
pub const META_CHART_METADATA: &str = "chart-metadata";

/// SHA256 digest of the archive (set on chart archive objects)
pub const META_CHART_DIGEST: &str = "chart-digest";

/// Typed view over an object's string metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub publish_uri: Option<String>,
    pub chart_metadata: Option<String>,
    pub chart_digest: Option<String>,
    /// Unrecognized keys, passed through unchanged
    pub extra: BTreeMap<String, String>,
}

impl ObjectMetadata {
    /// Metadata for an index object
    pub fn for_index(publish_uri: Option<String>) -> Self {
        Self {
            publish_uri,
            ..Default::default()
        }
    }

    /// Metadata for a chart archive object
    pub fn for_chart(chart_metadata: String, chart_digest: String) -> Self {
        Self {
            chart_metadata: Some(chart_metadata),
            chart_digest: Some(chart_digest),
            ..Default::default()
        }
    }

    /// Build from a raw map. Keys are matched case-insensitively since
    /// stores disagree on how they capitalize user metadata.
    pub fn from_map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut metadata = Self::default();
        for (key, value) in entries {
            let key = key.as_ref().to_ascii_lowercase();
            let value = value.into();
            match key.as_str() {
                META_PUBLISH_URI => metadata.publish_uri = Some(value),
                META_CHART_METADATA => metadata.chart_metadata = Some(value),
                META_CHART_DIGEST => metadata.chart_digest = Some(value),
                _ => {
                    metadata.extra.insert(key, value);
                }
            }
        }
        metadata
    }

    /// Flatten back into a raw map
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = self.extra.clone();
        if let Some(uri) = &self.publish_uri {
            map.insert(META_PUBLISH_URI.to_string(), uri.clone());
        }
        if let Some(chart) = &self.chart_metadata {
            map.insert(META_CHART_METADATA.to_string(), chart.clone());
        }
        if let Some(digest) = &self.chart_digest {
            map.insert(META_CHART_DIGEST.to_string(), digest.clone());
        }
        map
    }

    pub fn is_empty(&self) -> bool {
        self.publish_uri.is_none()
            && self.chart_metadata.is_none()
            && self.chart_digest.is_none()
            && self.extra.is_empty()
    }
}

/// Canned access control list applied to uploaded objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Acl {
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    AwsExecRead,
    BucketOwnerRead,
    BucketOwnerFullControl,
    LogDeliveryWrite,
}

impl Acl {
    pub const ALL: [Acl; 8] = [
        Acl::Private,
        Acl::PublicRead,
        Acl::PublicReadWrite,
        Acl::AuthenticatedRead,
        Acl::AwsExecRead,
        Acl::BucketOwnerRead,
        Acl::BucketOwnerFullControl,
        Acl::LogDeliveryWrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
            Acl::PublicReadWrite => "public-read-write",
            Acl::AuthenticatedRead => "authenticated-read",
            Acl::AwsExecRead => "aws-exec-read",
            Acl::BucketOwnerRead => "bucket-owner-read",
            Acl::BucketOwnerFullControl => "bucket-owner-full-control",
            Acl::LogDeliveryWrite => "log-delivery-write",
        }
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Acl {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Acl::ALL
            .into_iter()
            .find(|acl| acl.as_str() == s)
            .ok_or_else(|| RepoError::InvalidConfig {
                message: format!(
                    "unknown ACL '{}', expected one of: {}",
                    s,
                    Acl::ALL.map(|a| a.as_str()).join(", ")
                ),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_map_recognizes_keys_case_insensitively() {
        let metadata = ObjectMetadata::from_map([
            ("Chart-Publish-Uri", "https://charts.example.com"),
            ("X-Custom", "kept"),
        ]);

        assert_eq!(
            metadata.publish_uri.as_deref(),
            Some("https://charts.example.com")
        );
        assert_eq!(metadata.extra.get("x-custom").map(String::as_str), Some("kept"));
    }

    #[test]
    fn test_to_map_keeps_unrecognized_keys() {
        let mut metadata = ObjectMetadata::for_index(Some("https://cdn.example.com".to_string()));
        metadata
            .extra
            .insert("future-field".to_string(), "value".to_string());

        let map = metadata.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map[META_PUBLISH_URI], "https://cdn.example.com");
        assert_eq!(map["future-field"], "value");

        assert_eq!(ObjectMetadata::from_map(map), metadata);
    }

    #[test]
    fn test_is_empty() {
        assert!(ObjectMetadata::default().is_empty());
        assert!(!ObjectMetadata::for_chart("{}".to_string(), "abc".to_string()).is_empty());
    }

    #[test]
    fn test_acl_parse() {
        assert_eq!("public-read".parse::<Acl>().unwrap(), Acl::PublicRead);
        assert_eq!(
            "bucket-owner-full-control".parse::<Acl>().unwrap(),
            Acl::BucketOwnerFullControl
        );
        assert!("world-writable".parse::<Acl>().is_err());
    }

    #[test]
    fn test_acl_serde_matches_header_value() {
        for acl in Acl::ALL {
            let yaml = serde_yaml::to_string(&acl).unwrap();
            assert_eq!(yaml.trim(), acl.as_str());
        }
    }
}
