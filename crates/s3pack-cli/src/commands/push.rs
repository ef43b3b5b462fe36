//! Push command - publish a chart archive to a repository

use console::style;
use s3pack_core::ChartArchive;
use s3pack_repo::{Acl, ChartSync, SyncOptions, create_store};
use std::path::Path;

use super::{Context, print_warnings};
use crate::error::Result;

pub async fn run(
    ctx: &Context,
    chart_path: &Path,
    repo_name: &str,
    acl: Option<Acl>,
    allow_replace: bool,
    dry_run: bool,
) -> Result<()> {
    let config = ctx.load_config()?;
    let repo = config.lookup(repo_name)?;
    let chart = ChartArchive::load(chart_path)?;

    println!(
        "{} Pushing {}@{} to {}",
        style("→").blue().bold(),
        chart.metadata.name,
        chart.metadata.version,
        repo.name
    );

    let sync = ChartSync::with_options(
        create_store(&repo.url, &ctx.store)?,
        SyncOptions {
            dry_run,
            ..Default::default()
        },
    );
    let report = sync
        .push(&config, repo_name, &chart, acl, allow_replace)
        .await?;
    print_warnings(&report);

    if report.dry_run {
        println!(
            "{} Dry run: would upload {} and add {}@{} to {}",
            style("○").yellow(),
            report.artifact,
            report.chart,
            report.version,
            report.index_url
        );
        return Ok(());
    }

    println!(
        "{} Uploaded {}",
        style("✓").green().bold(),
        style(&report.artifact).cyan()
    );
    println!("  Index: {}", report.index_url);
    if report.merges > 0 {
        println!(
            "  {}",
            style(format!("Merged {} concurrent update(s)", report.merges)).dim()
        );
    }

    Ok(())
}
