//! s3pack CLI - manage Helm chart repositories stored in S3

use clap::{CommandFactory, Parser, Subcommand};
use s3pack_repo::{Acl, StoreKind, StoreOptions};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

mod commands;
mod error;
mod exit_codes;

use commands::Context;
use error::Result;

#[derive(Parser)]
#[command(name = "s3pack")]
#[command(version)]
#[command(about = "Manage Helm chart repositories stored in S3", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Repository configuration file
    #[arg(long, global = true, env = "S3PACK_CONFIG")]
    config: Option<PathBuf>,

    /// Object store request timeout in seconds
    #[arg(long, global = true, env = "S3PACK_TIMEOUT", default_value_t = 30)]
    timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty repository index at a bucket location
    Init {
        /// Repository location (s3://bucket/path or file:///path)
        uri: String,

        /// Canned ACL for the index object
        #[arg(long)]
        acl: Option<Acl>,

        /// Base URI clients download charts from
        #[arg(long)]
        publish: Option<String>,

        /// Replace an existing index
        #[arg(long)]
        force: bool,
    },

    /// Upload a packaged chart and add it to a repository index
    Push {
        /// Path to the chart archive (.tgz)
        chart: PathBuf,

        /// Repository name
        repo: String,

        /// Canned ACL for uploaded objects
        #[arg(long)]
        acl: Option<Acl>,

        /// Fail if the chart version already exists
        #[arg(long)]
        no_overwrite: bool,

        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove a chart version from a repository
    Delete {
        /// Chart name
        name: String,

        /// Chart version
        #[arg(id = "chart_version", value_name = "VERSION")]
        version: String,

        /// Repository name
        repo: String,

        /// Canned ACL for the rewritten index
        #[arg(long)]
        acl: Option<Acl>,

        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage configured repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// Write an object to stdout (Helm downloader protocol)
    #[command(hide = true)]
    Download {
        cert_file: String,
        key_file: String,
        ca_file: String,

        /// Object location (s3://bucket/key or file:///path)
        url: String,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Register a repository
    Add {
        /// Repository name
        name: String,

        /// Repository location (s3://bucket/path or file:///path)
        uri: String,

        /// Local index mirror path
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Default canned ACL for writes
        #[arg(long)]
        acl: Option<Acl>,

        /// Base URI clients download charts from
        #[arg(long)]
        publish: Option<String>,
    },

    /// List registered repositories
    List,

    /// Unregister a repository
    Remove {
        /// Repository name
        name: String,
    },
}

/// Helm calls downloader plugins as `<cmd> certFile keyFile caFile url`;
/// route that shape to the hidden `download` command
fn downloader_args(mut args: Vec<OsString>) -> Vec<OsString> {
    let is_downloader = args.len() == 5
        && args[1].to_str().is_some_and(|first| {
            !first.starts_with('-') && Cli::command().find_subcommand(first).is_none()
        })
        && args[4]
            .to_str()
            .is_some_and(|url| StoreKind::detect(url).is_ok());

    if is_downloader {
        args.insert(1, OsString::from("download"));
    }
    args
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("S3PACK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = Context {
        config_path: cli.config,
        store: StoreOptions {
            timeout: Duration::from_secs(cli.timeout),
        },
    };

    match cli.command {
        Commands::Init {
            uri,
            acl,
            publish,
            force,
        } => commands::init::run(&ctx, &uri, acl, publish, force).await,

        Commands::Push {
            chart,
            repo,
            acl,
            no_overwrite,
            dry_run,
        } => commands::push::run(&ctx, &chart, &repo, acl, !no_overwrite, dry_run).await,

        Commands::Delete {
            name,
            version,
            repo,
            acl,
            dry_run,
        } => commands::delete::run(&ctx, &name, &version, &repo, acl, dry_run).await,

        Commands::Repo { command } => match command {
            RepoCommands::Add {
                name,
                uri,
                cache,
                acl,
                publish,
            } => commands::repo::add(&ctx, &name, &uri, cache, acl, publish),
            RepoCommands::List => commands::repo::list(&ctx),
            RepoCommands::Remove { name } => commands::repo::remove(&ctx, &name),
        },

        Commands::Download {
            cert_file,
            key_file,
            ca_file,
            url,
        } => {
            let tls_files = [cert_file.as_str(), key_file.as_str(), ca_file.as_str()];
            commands::download::run(&ctx, tls_files, &url).await
        }
    }
}


#[tokio::main]
async fn main() -> ExitCode {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse_from(downloader_args(std::env::args_os().collect()));
    init_logging(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
