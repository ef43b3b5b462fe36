//! Packaged chart archives
//!
//! A chart archive is a `.tgz` whose top-level directory is named after the
//! chart and contains a `Chart.yaml`. Only the metadata is read here; the rest
//! of the archive is treated as opaque bytes.

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive;

use crate::chart::ChartMetadata;
use crate::error::{CoreError, Result};

/// A chart archive loaded from disk
#[derive(Debug, Clone)]
pub struct ChartArchive {
    /// Where the archive was read from
    pub path: PathBuf,

    /// Parsed `Chart.yaml`
    pub metadata: ChartMetadata,

    /// SHA256 digest of the archive bytes (hex)
    pub digest: String,

    /// Raw archive bytes
    pub data: Vec<u8>,
}

impl ChartArchive {
    /// Load an archive and read its chart metadata
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(CoreError::ArchiveNotFound {
                path: path.display().to_string(),
            });
        }

        let data = std::fs::read(path)?;
        let metadata = read_chart_metadata(&data).map_err(|e| match e {
            CoreError::InvalidArchive { message, .. } => CoreError::InvalidArchive {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            digest: compute_digest(&data),
            metadata,
            data,
        })
    }

    /// Canonical object name: `<name>-<version>.tgz`
    pub fn file_name(&self) -> String {
        archive_file_name(&self.metadata.name, &self.metadata.version.to_string())
    }
}

/// Object name of a chart archive in a repository
#[must_use]
pub fn archive_file_name(name: &str, version: &str) -> String {
    format!("{}-{}.tgz", name, version)
}

/// SHA256 digest of the given bytes, hex encoded
#[must_use]
pub fn compute_digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Find and parse `<chart>/Chart.yaml` inside a gzipped tarball
pub fn read_chart_metadata(data: &[u8]) -> Result<ChartMetadata> {
    let decoder = GzDecoder::new(data);
    let mut archive = Archive::new(decoder);

    let entries = archive.entries().map_err(|e| invalid(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| invalid(e.to_string()))?;
        if entry.header().entry_type().is_dir() {
            continue;
        }

        let path = entry.path()?.to_string_lossy().to_string();
        let components: Vec<_> = path.trim_start_matches("./").split('/').collect();

        // Only the top-level chart's Chart.yaml; subcharts live deeper
        if components.len() == 2 && components[1] == "Chart.yaml" {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| invalid(format!("Chart.yaml is not valid UTF-8: {}", e)))?;
            return ChartMetadata::from_yaml(&content);
        }
    }

    Err(invalid("no Chart.yaml found in archive".to_string()))
}

fn invalid(message: String) -> CoreError {
    CoreError::InvalidArchive {
        path: String::new(),
        message,
    }
}
