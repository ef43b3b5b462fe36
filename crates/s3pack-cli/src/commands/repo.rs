//! Repository management commands

use console::style;
use s3pack_repo::{Acl, Repository};
use std::path::PathBuf;

use super::Context;
use crate::error::Result;

/// Add a new repository
pub fn add(
    ctx: &Context,
    name: &str,
    uri: &str,
    cache: Option<PathBuf>,
    acl: Option<Acl>,
    publish: Option<String>,
) -> Result<()> {
    let path = ctx.config_path()?;
    let mut config = ctx.load_config()?;

    let mut repo = Repository::new(name, uri)?;
    repo.cache = cache;
    repo.acl = acl;
    repo.publish_uri = publish;

    config.add(repo)?;
    config.save_to(&path)?;

    println!("\"{}\" has been added to your repositories", name);
    println!();
    println!("Push a chart with: s3pack push <chart.tgz> {}", name);

    Ok(())
}

/// List configured repositories
pub fn list(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;

    if config.repositories.is_empty() {
        println!("No repositories configured.");
        println!();
        println!("Add one with: s3pack repo add <name> <uri>");
        return Ok(());
    }

    println!("{:<20} {:<12} {}", "NAME", "ACL", "URL");
    println!("{}", "-".repeat(80));

    for repo in &config.repositories {
        let acl = repo.acl.map(|a| a.as_str()).unwrap_or("-");
        println!("{:<20} {:<12} {}", repo.name, acl, repo.url);
        if let Some(publish) = &repo.publish_uri {
            println!("{:<20} {:<12} {}", "", "", style(format!("published at {}", publish)).dim());
        }
    }

    Ok(())
}

/// Remove a repository
pub fn remove(ctx: &Context, name: &str) -> Result<()> {
    let path = ctx.config_path()?;
    let mut config = ctx.load_config()?;

    config.remove(name)?;
    config.save_to(&path)?;

    println!("\"{}\" has been removed from your repositories", name);
    Ok(())
}
