//! extsync - command-line driver for the extension sync engine.
//!
//! Wires a directory-backed host into the core and exposes the startup
//! flow, mirror watching, update checks, installs and repository mapping.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use extsync_core::{
    CancellationToken, ExtSync, FailureCategory, FsHost, ImportOutcome, SyncError,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "extsync")]
#[command(about = "Keep installed extensions, mirror documents and remote versions in sync")]
struct Args {
    /// Host configuration directory (extensions/, enabled list, registry)
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Mirror directory, overriding the persisted setting
    #[arg(long)]
    mirror_dir: Option<PathBuf>,

    /// Id of the extension running this engine
    #[arg(long, default_value = "extsync")]
    self_id: String,

    /// GitHub token for authenticated requests
    #[arg(long, env = "EXTSYNC_GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Migrate, reconcile with the host and export mirror documents
    Sync,
    /// Sync, then import mirror edits until interrupted
    Watch {
        /// Also run the delayed startup of delayed extensions
        #[arg(long)]
        delayed_start: bool,
    },
    /// Check for updates (all extensions, or one)
    Check { id: Option<String> },
    /// Install an extension or theme from a repository
    Install {
        /// owner/name, web URL or SSH locator
        repo: String,
        /// Release tag (defaults to the latest release)
        #[arg(long)]
        tag: Option<String>,
        /// Install as a theme
        #[arg(long)]
        theme: bool,
    },
    /// Remove an installed extension
    Uninstall { id: String },
    /// List release versions of a repository
    Versions { repo: String },
    /// Print the repository an extension resolves to
    Resolve { id: String },
    /// Map an extension to a repository
    SetRepo { id: String, repo: String },
    /// Import one mirror document
    Import { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Host root: {}", args.root.display());

    let host = Arc::new(FsHost::new(&args.root, &args.self_id));
    let mut builder = ExtSync::builder(&args.root).host(host);
    if let Some(dir) = &args.mirror_dir {
        builder = builder.mirror_dir(dir);
    }
    if let Some(token) = &args.token {
        builder = builder.github_token(token);
    }
    let sync = builder
        .build()
        .await
        .context("Failed to initialize sync engine")?;

    match args.command {
        Command::Sync => {
            let report = sync.startup().await?;
            println!(
                "added {}, removed {}, exported {}",
                report.reconcile.added.len(),
                report.reconcile.removed.len(),
                report.exported
            );
        }
        Command::Watch { delayed_start } => {
            sync.startup().await?;
            if !sync.start_watching().await? {
                warn!("Mirroring is disabled; nothing to watch");
            }
            if delayed_start {
                let cancel = CancellationToken::new();
                tokio::select! {
                    result = sync.run_delayed_startup(&cancel) => {
                        info!("Delayed startup enabled {} extensions", result?.len());
                        tokio::signal::ctrl_c().await?;
                    }
                    _ = tokio::signal::ctrl_c() => cancel.cancel(),
                }
            } else {
                tokio::signal::ctrl_c().await?;
            }
            sync.stop_watching().await;
            info!("Shutdown signal received, exiting");
        }
        Command::Check { id } => {
            sync.startup().await?;
            let statuses = match id {
                Some(id) => {
                    let status = sync.check_one(&id).await.map_err(explain)?;
                    std::iter::once((id, status)).collect()
                }
                None => {
                    let progress = |id: &str| info!("Checked {}", id);
                    sync.check_all(&progress, &CancellationToken::new()).await
                }
            };
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
        Command::Install { repo, tag, theme } => {
            sync.startup().await?;
            if theme {
                let report = sync
                    .install_theme(&repo, tag.as_deref())
                    .await
                    .map_err(explain)?;
                println!("installed theme {} {} from {}", report.name, report.version, report.repository);
            } else {
                let report = sync
                    .install_extension(&repo, tag.as_deref())
                    .await
                    .map_err(explain)?;
                println!("installed {} {} from {}", report.id, report.version, report.repository);
            }
        }
        Command::Uninstall { id } => {
            sync.startup().await?;
            sync.uninstall(&id).await?;
            println!("uninstalled {}", id);
        }
        Command::Versions { repo } => {
            let versions = sync.list_release_versions(&repo).await.map_err(explain)?;
            println!("{}", serde_json::to_string_pretty(&versions)?);
        }
        Command::Resolve { id } => match sync.resolve_repo(&id).await {
            Some(repo) => println!("{}", repo),
            None => println!("{}: unresolved", id),
        },
        Command::SetRepo { id, repo } => {
            let repo = sync.set_repo(&id, &repo).await?;
            println!("{} -> {}", id, repo);
        }
        Command::Import { path } => match sync.import_document(&path).await? {
            Some(ImportOutcome::Applied { id }) => println!("applied edits to {}", id),
            Some(ImportOutcome::Skipped(reason)) => println!("skipped: {:?}", reason),
            None => println!("mirroring is disabled"),
        },
    }

    Ok(())
}

/// Attach a user-facing hint to failures of explicit remote operations.
fn explain(err: SyncError) -> anyhow::Error {
    let hint = match err.category() {
        FailureCategory::RateLimited {
            authenticated: false,
        } => "rate limited; set EXTSYNC_GITHUB_TOKEN to raise the limit",
        FailureCategory::RateLimited {
            authenticated: true,
        } => "rate limited; try again later",
        FailureCategory::NotFound => "not found; check the repository and tag",
        FailureCategory::Generic => "request failed",
    };
    anyhow::Error::new(err).context(hint)
}
