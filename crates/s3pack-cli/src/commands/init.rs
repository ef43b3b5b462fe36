//! Init command - create an empty repository index

use console::style;
use s3pack_repo::{Acl, ChartSync, create_store};

use super::Context;
use crate::error::Result;

pub async fn run(
    ctx: &Context,
    uri: &str,
    acl: Option<Acl>,
    publish: Option<String>,
    force: bool,
) -> Result<()> {
    let sync = ChartSync::new(create_store(uri, &ctx.store)?);
    let location = sync.init(uri, acl, publish, force).await?;

    println!(
        "{} Initialized empty repository at {}",
        style("✓").green().bold(),
        style(&location).cyan()
    );
    println!();
    println!("Register it with: s3pack repo add <name> {}", uri);

    Ok(())
}
