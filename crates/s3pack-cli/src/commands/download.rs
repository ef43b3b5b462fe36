//! Download command - serve Helm's downloader protocol
//!
//! Helm invokes downloader plugins with `certFile keyFile caFile url` and
//! reads the object from stdout.

use s3pack_repo::create_store;
use std::io::Write;

use super::Context;
use crate::error::{CliError, Result};

pub async fn run(ctx: &Context, tls_files: [&str; 3], url: &str) -> Result<()> {
    if tls_files.iter().any(|f| !f.is_empty()) {
        tracing::debug!("Ignoring TLS files {:?}", tls_files);
    }

    let store = create_store(url, &ctx.store)?;
    let content = store.fetch(url).await?;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(&content)
        .and_then(|()| stdout.flush())
        .map_err(|e| CliError::Io {
            message: format!("writing {} to stdout: {}", url, e),
        })
}
