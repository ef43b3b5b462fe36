//! s3pack Core - chart types shared by the repository and CLI crates
//!
//! This crate provides:
//! - `ChartMetadata`: the contents of a chart's `Chart.yaml`
//! - `ChartArchive`: a packaged chart (`.tgz`) loaded from disk, with its digest

pub mod archive;
pub mod chart;
pub mod error;

pub use archive::{ChartArchive, archive_file_name, compute_digest};
pub use chart::{ChartMetadata, Maintainer};
pub use error::{CoreError, Result};
