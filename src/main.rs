// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use corral::config::Config;
use corral::constants::{concurrency, timeouts, DOWNLOAD_FILE_EXTENSION};
use corral::filter::{build_filter, ClusterFilter};
use corral::kubeconfig::{merge_kubeconfigs, MergeOptions, MergeSummary};
use corral::kubernetes::client::install_crypto_provider;
use corral::kubernetes::{check_contexts, ContextStatus};
use corral::rancher::RancherClient;
use corral::store::{cleanup, CredentialStore, FsStore};
use corral::sync::{SyncManager, SyncReport};

#[derive(Parser)]
#[command(name = "corral")]
#[command(version)]
#[command(about = "Sync kubeconfigs from multiple Rancher servers into one file")]
#[command(after_long_help = r#"EXAMPLES
    Download every cluster and merge into ~/.kube/config:
        $ corral sync

    Leave management clusters out of the merged file:
        $ corral sync --exclude '^local-'

    Re-merge earlier downloads into another file:
        $ corral merge --output /tmp/all.yaml

ENVIRONMENT VARIABLES
    CORRAL_CONFIG             Config file (default: <config dir>/corral/config.yaml)
    CORRAL_OUTPUT             Merged kubeconfig path
    CORRAL_DOWNLOAD_DIR       Where per-cluster kubeconfigs are saved
    CORRAL_EXCLUDE            Comma-separated exclude patterns
    CORRAL_PASSWORD_<ID>      Password for the server with that id (see `corral servers`)
"#)]
struct Cli {
    /// Config file
    #[arg(short, long, global = true, env = "CORRAL_CONFIG")]
    config: Option<PathBuf>,

    /// More logging; repeat for trace output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover clusters, download their kubeconfigs and merge them
    Sync(SyncArgs),
    /// Merge already downloaded kubeconfigs
    Merge(MergeArgs),
    /// Probe the API server behind every context of the merged kubeconfig
    Check(CheckArgs),
    /// List configured servers
    Servers,
}

/// Options shared by the commands that write a merged kubeconfig
#[derive(Debug, Clone, Args)]
struct OutputOptions {
    /// Regex for contexts or clusters to leave out; may be repeated
    #[arg(short, long = "exclude", value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Merged kubeconfig to write
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SyncArgs {
    #[command(flatten)]
    common: OutputOptions,

    /// Keep the per-cluster kubeconfigs after merging
    #[arg(long)]
    keep_downloads: bool,

    /// Give up on the whole run after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

#[derive(Debug, Args)]
struct MergeArgs {
    #[command(flatten)]
    common: OutputOptions,

    /// Kubeconfigs to merge (default: everything in the download directory)
    files: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Kubeconfig to check (default: the merged output)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "corral=debug,info",
        _ => "corral=trace,debug",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel `cancel` on the first Ctrl+C; exit on the second
fn setup_shutdown_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            return;
        }
        warn!("Shutdown requested, finishing current operations (Ctrl+C again to force quit)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    install_crypto_provider();

    let config = Config::load(cli.config.as_deref())?;
    let cancel = CancellationToken::new();
    setup_shutdown_handler(cancel.clone());

    match cli.command {
        Commands::Sync(args) => run_sync(config, args, cancel).await,
        Commands::Merge(args) => run_merge(config, args).await,
        Commands::Check(args) => run_check(config, args, cancel).await,
        Commands::Servers => {
            print_servers(&config);
            Ok(())
        }
    }
}

fn exclude_patterns(config: &Config, options: &OutputOptions) -> Vec<String> {
    config
        .exclude
        .iter()
        .chain(options.exclude.iter())
        .cloned()
        .collect()
}

async fn run_sync(config: Config, args: SyncArgs, cancel: CancellationToken) -> Result<()> {
    let filter: Arc<dyn ClusterFilter> =
        Arc::from(build_filter(&exclude_patterns(&config, &args.common))?);
    let output = args.common.output.clone().unwrap_or_else(|| config.output.clone());

    if let Some(secs) = args.timeout {
        let deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("Run deadline of {}s reached, cancelling", secs);
            deadline.cancel();
        });
    }

    let credentials = config.credentials(|key| std::env::var(key).ok());
    let provider = Arc::new(RancherClient::new()?);
    let store: Arc<dyn CredentialStore> = Arc::new(FsStore);
    let manager = SyncManager::new(provider, Arc::clone(&store), Arc::clone(&filter), config.sync.clone());

    let report = manager.run(credentials, &config.download_dir, cancel).await;

    if report.saved.is_empty() {
        return match report.error() {
            Some(e) => Err(e.into()),
            None => {
                info!("No kubeconfigs downloaded, {} left untouched", output.display());
                Ok(())
            }
        };
    }

    let summary = merge_kubeconfigs(
        store.as_ref(),
        &report.saved,
        &output,
        filter.as_ref(),
        &MergeOptions::default(),
    )
    .await?;
    print_merge_summary(&summary, &output);

    if !args.keep_downloads {
        cleanup(store.as_ref(), &report.saved).await;
    }

    report_outcome(&report)
}

fn report_outcome(report: &SyncReport) -> Result<()> {
    if let Some(e) = report.error() {
        return Err(e.into());
    }
    if report.is_degraded() {
        println!(
            "Completed with failures: {} of {} downloads failed, {} of {} servers unreachable",
            report.failed_downloads,
            report.downloads,
            report.servers_failed,
            report.servers - report.servers_skipped
        );
    }
    Ok(())
}

async fn run_merge(config: Config, args: MergeArgs) -> Result<()> {
    let filter = build_filter(&exclude_patterns(&config, &args.common))?;
    let output = args.common.output.clone().unwrap_or_else(|| config.output.clone());

    let files = if args.files.is_empty() {
        downloaded_files(&config.download_dir)?
    } else {
        args.files
    };

    let summary = merge_kubeconfigs(
        &FsStore,
        &files,
        &output,
        filter.as_ref(),
        &MergeOptions::default(),
    )
    .await?;
    print_merge_summary(&summary, &output);
    Ok(())
}

/// Every kubeconfig saved in `dir`, sorted by name
fn downloaded_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read download directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == DOWNLOAD_FILE_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn print_merge_summary(summary: &MergeSummary, output: &Path) {
    println!(
        "Wrote {} context(s) from {} file(s) to {}",
        summary.contexts,
        summary.files_merged,
        output.display()
    );
    if summary.files_skipped > 0 {
        println!("Skipped {} unreadable file(s)", summary.files_skipped);
    }
    if summary.files_empty > 0 {
        println!("Skipped {} file(s) without contexts", summary.files_empty);
    }
    if summary.contexts_excluded > 0 {
        println!("Excluded {} context(s)", summary.contexts_excluded);
    }
    if let Some(current) = &summary.current_context {
        println!("Current context: {}", current);
    }
}

async fn run_check(config: Config, args: CheckArgs, cancel: CancellationToken) -> Result<()> {
    let path = args.output.unwrap_or(config.output);
    let results = check_contexts(
        &path,
        concurrency::CHECK,
        Duration::from_secs(timeouts::CHECK_SECS),
        &cancel,
    )
    .await?;

    let width = results.iter().map(|r| r.context.len()).max().unwrap_or(0);
    for health in &results {
        match &health.status {
            ContextStatus::Reachable { version } => {
                println!("{:<width$}  ok     {}", health.context, version, width = width)
            }
            ContextStatus::Unreachable { error } => {
                println!("{:<width$}  FAIL   {}", health.context, error, width = width)
            }
        }
    }

    let reachable = results.iter().filter(|r| r.is_reachable()).count();
    println!("{} of {} context(s) reachable", reachable, results.len());
    Ok(())
}

fn print_servers(config: &Config) {
    if config.servers.is_empty() {
        println!("No servers configured");
        return;
    }
    for server in &config.servers {
        let identity = &server.identity;
        let has_password = std::env::var(&server.password_env).is_ok_and(|p| !p.is_empty());
        println!(
            "{}  id={}  host={}  user={}  password={} ({})",
            identity,
            identity.id(),
            identity.host_slug(),
            identity.username(),
            if has_password { "set" } else { "missing" },
            server.password_env
        );
    }
}
