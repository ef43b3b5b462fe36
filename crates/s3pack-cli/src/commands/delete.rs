//! Delete command - remove a chart version from a repository

use console::style;
use s3pack_repo::{Acl, ChartSync, SyncOptions, create_store};

use super::{Context, print_warnings};
use crate::error::Result;

pub async fn run(
    ctx: &Context,
    name: &str,
    version: &str,
    repo_name: &str,
    acl: Option<Acl>,
    dry_run: bool,
) -> Result<()> {
    let config = ctx.load_config()?;
    let repo = config.lookup(repo_name)?;

    let sync = ChartSync::with_options(
        create_store(&repo.url, &ctx.store)?,
        SyncOptions {
            dry_run,
            ..Default::default()
        },
    );
    let report = sync.delete(&config, repo_name, name, version, acl).await?;
    print_warnings(&report);

    if report.dry_run {
        println!(
            "{} Dry run: would delete {} and remove {}@{} from {}",
            style("○").yellow(),
            report.artifact,
            name,
            version,
            report.index_url
        );
        return Ok(());
    }

    println!(
        "{} Deleted {}@{} from {}",
        style("✓").green().bold(),
        name,
        version,
        repo.name
    );
    println!("  Artifact: {}", report.artifact);
    if report.merges > 0 {
        println!(
            "  {}",
            style(format!("Merged {} concurrent update(s)", report.merges)).dim()
        );
    }

    Ok(())
}
