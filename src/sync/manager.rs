// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Central coordinator for discovering clusters and downloading their kubeconfigs.

use crate::constants::{concurrency, timeouts};
use crate::error::{CorralError, Result};
use crate::filter::ClusterFilter;
use crate::kubeconfig::{preprocess, renamed};
use crate::rancher::ClusterProvider;
use crate::retry::{retry, RetryPolicy};
use crate::store::CredentialStore;
use crate::types::{
    Cluster, DiscoveryResult, DownloadResult, DownloadTask, ServerCredential, ServerIdentity,
};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Tuning knobs for one sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Servers authenticated and listed at the same time
    pub discovery_concurrency: usize,
    /// Size of the download worker pool
    pub download_workers: usize,
    pub authenticate_timeout: Duration,
    pub list_timeout: Duration,
    /// Applies to each fetch attempt
    pub download_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            discovery_concurrency: concurrency::DISCOVERY,
            download_workers: concurrency::DOWNLOAD,
            authenticate_timeout: Duration::from_secs(timeouts::AUTHENTICATE_SECS),
            list_timeout: Duration::from_secs(timeouts::LIST_SECS),
            download_timeout: Duration::from_secs(timeouts::DOWNLOAD_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

/// What a sync run achieved. Saved paths are in completion order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub saved: Vec<PathBuf>,
    pub servers: usize,
    /// Servers without a password
    pub servers_skipped: usize,
    /// Servers whose login or cluster listing failed
    pub servers_failed: usize,
    pub clusters_discovered: usize,
    pub clusters_excluded: usize,
    pub downloads: usize,
    pub failed_downloads: usize,
    pub cancelled: bool,
}

impl SyncReport {
    /// The error a caller should surface, if the run as a whole failed.
    ///
    /// Partial failure is not an error; see [`SyncReport::is_degraded`].
    pub fn error(&self) -> Option<CorralError> {
        if self.cancelled {
            return Some(CorralError::SyncCancelled {
                saved: self.saved.len(),
                total: self.downloads,
            });
        }

        let attempted = self.servers - self.servers_skipped;
        if attempted > 0 && self.servers_failed == attempted {
            return Some(CorralError::NoServersReachable {
                failed: self.servers_failed,
            });
        }

        if self.downloads > 0 && self.saved.is_empty() {
            return Some(CorralError::AllDownloadsFailed {
                failed: self.downloads,
            });
        }

        None
    }

    /// Something failed, yet the run still produced kubeconfigs
    pub fn is_degraded(&self) -> bool {
        self.error().is_none() && (self.failed_downloads > 0 || self.servers_failed > 0)
    }
}

/// Runs discovery across all servers, then downloads every discovered
/// cluster's kubeconfig through a fixed worker pool.
pub struct SyncManager {
    provider: Arc<dyn ClusterProvider>,
    store: Arc<dyn CredentialStore>,
    filter: Arc<dyn ClusterFilter>,
    options: SyncOptions,
}

impl SyncManager {
    pub fn new(
        provider: Arc<dyn ClusterProvider>,
        store: Arc<dyn CredentialStore>,
        filter: Arc<dyn ClusterFilter>,
        options: SyncOptions,
    ) -> Self {
        Self {
            provider,
            store,
            filter,
            options,
        }
    }

    pub async fn run(
        &self,
        credentials: Vec<ServerCredential>,
        output_dir: &Path,
        cancel: CancellationToken,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        info!(
            "SyncManager started for {} server(s), discovering clusters...",
            credentials.len()
        );

        let tasks = self
            .discover(credentials, output_dir, &cancel, &mut report)
            .await;

        if cancel.is_cancelled() {
            warn!("Sync cancelled during discovery");
            report.downloads += tasks.len();
            report.cancelled = true;
            return report;
        }

        info!(
            "Discovery complete: {} cluster(s) to download, {} excluded",
            tasks.len(),
            report.clusters_excluded
        );

        self.download(tasks, &cancel, &mut report).await;

        if cancel.is_cancelled() && report.saved.len() < report.downloads {
            warn!(
                "Sync cancelled after saving {} of {} kubeconfigs",
                report.saved.len(),
                report.downloads
            );
            report.cancelled = true;
        }

        report
    }

    async fn discover(
        &self,
        credentials: Vec<ServerCredential>,
        output_dir: &Path,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> Vec<DownloadTask> {
        let credentials = mark_shared_host_slugs(credentials);
        let semaphore = Arc::new(Semaphore::new(self.options.discovery_concurrency.max(1)));
        let mut handles = Vec::with_capacity(credentials.len());

        for credential in credentials {
            report.servers += 1;
            let ServerCredential { server, password } = credential;
            let Some(password) = password else {
                warn!("No password available for {}, skipping", server);
                report.servers_skipped += 1;
                continue;
            };

            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let options = self.options.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return DiscoveryResult {
                            server,
                            token: None,
                            clusters: Vec::new(),
                            error: Some(CorralError::Cancelled),
                        }
                    }
                };
                discover_server(&*provider, &options, server, &password, &cancel).await
            }));
        }

        let mut tasks = Vec::new();
        let mut claimed = HashSet::new();
        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!("Discovery task failed: {}", e);
                    report.servers_failed += 1;
                    continue;
                }
            };

            if let Some(e) = result.error {
                if !matches!(e, CorralError::Cancelled) {
                    error!("Skipping {}: {}", result.server, e);
                }
                report.servers_failed += 1;
                continue;
            }
            let Some(token) = result.token else {
                report.servers_failed += 1;
                continue;
            };

            report.clusters_discovered += result.clusters.len();
            for cluster in result.clusters {
                if self.excluded(&cluster, &result.server) {
                    info!("Excluding cluster '{}' on {}", cluster.name, result.server);
                    report.clusters_excluded += 1;
                    continue;
                }
                let task = DownloadTask {
                    server: result.server.clone(),
                    cluster,
                    token: token.clone(),
                    output_dir: output_dir.to_path_buf(),
                };
                let path = task.output_path();
                if !claimed.insert(path.clone()) {
                    error!(
                        "Not downloading cluster '{}' ({}) on {}: {} belongs to another cluster",
                        task.cluster.name,
                        task.cluster.id,
                        task.server,
                        path.display()
                    );
                    report.downloads += 1;
                    report.failed_downloads += 1;
                    continue;
                }
                tasks.push(task);
            }
        }

        tasks
    }

    /// Checked against the name the server reports and the name it will carry
    /// in the merged kubeconfig
    fn excluded(&self, cluster: &Cluster, server: &ServerIdentity) -> bool {
        self.filter.should_exclude(&cluster.name)
            || self.filter.should_exclude(&renamed(&cluster.name, server))
    }

    async fn download(
        &self,
        tasks: Vec<DownloadTask>,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) {
        report.downloads += tasks.len();
        if tasks.is_empty() {
            return;
        }

        let workers = self.options.download_workers.max(1).min(tasks.len());
        debug!("Starting {} download worker(s) for {} task(s)", workers, tasks.len());

        let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));
        let (result_tx, mut result_rx) = mpsc::channel::<DownloadResult>(workers * 2);

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let result_tx = result_tx.clone();
            let provider = Arc::clone(&self.provider);
            let store = Arc::clone(&self.store);
            let options = self.options.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        debug!("Worker {} stopping, sync cancelled", worker);
                        break;
                    }
                    let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
                    let Some(task) = next else {
                        break;
                    };
                    let result = download_one(&*provider, &*store, &options, task, &cancel).await;
                    if result_tx.send(result).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        while let Some(result) = result_rx.recv().await {
            match (result.path, result.error) {
                (Some(path), _) => report.saved.push(path),
                (None, Some(CorralError::Cancelled)) => {}
                (None, Some(e)) => {
                    error!(
                        "Failed to download kubeconfig for cluster '{}' on {}: {}",
                        result.task.cluster.name, result.task.server, e
                    );
                    report.failed_downloads += 1;
                }
                (None, None) => report.failed_downloads += 1,
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Download worker failed: {}", e);
            }
        }

        info!(
            "Downloaded {} of {} kubeconfig(s), {} failed",
            report.saved.len(),
            report.downloads,
            report.failed_downloads
        );
    }
}

/// Flag servers whose different hostnames sanitize to the same host slug, so
/// that each of their `local` clusters keeps a name of its own.
fn mark_shared_host_slugs(credentials: Vec<ServerCredential>) -> Vec<ServerCredential> {
    let mut hosts_by_slug: HashMap<String, BTreeSet<String>> = HashMap::new();
    for credential in &credentials {
        hosts_by_slug
            .entry(credential.server.host_slug())
            .or_default()
            .insert(credential.server.hostname());
    }

    credentials
        .into_iter()
        .map(|ServerCredential { server, password }| {
            let shared = hosts_by_slug
                .get(&server.host_slug())
                .is_some_and(|hosts| hosts.len() > 1);
            let server = server.with_shared_host_slug(shared);
            if shared {
                warn!(
                    "Host slug '{}' of {} is shared with another server, its local cluster becomes '{}'",
                    server.host_slug(),
                    server,
                    server.local_name()
                );
            }
            ServerCredential { server, password }
        })
        .collect()
}

/// Bound `operation` by `limit` and abandon it as soon as `cancel` fires
async fn bounded<T>(
    what: &str,
    limit: Duration,
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(CorralError::Cancelled),
        outcome = tokio::time::timeout(limit, operation) => outcome.unwrap_or_else(|_| {
            Err(CorralError::Timeout(format!("{} after {:?}", what, limit)))
        }),
    }
}

#[instrument(skip_all, fields(server = %server))]
async fn discover_server(
    provider: &dyn ClusterProvider,
    options: &SyncOptions,
    server: ServerIdentity,
    password: &str,
    cancel: &CancellationToken,
) -> DiscoveryResult {
    let authenticated = bounded(
        "authenticate",
        options.authenticate_timeout,
        cancel,
        provider.authenticate(&server, password),
    )
    .await;

    let token = match authenticated {
        Ok(token) => token,
        Err(e) => {
            return DiscoveryResult {
                server,
                token: None,
                clusters: Vec::new(),
                error: Some(e),
            }
        }
    };

    let listed = {
        let (token, server) = (&token, &server);
        retry(&options.retry, cancel, "list clusters", move || {
            bounded(
                "list clusters",
                options.list_timeout,
                cancel,
                provider.list_clusters(token, server),
            )
        })
        .await
    };

    match listed {
        Ok(clusters) => {
            info!("Discovered {} cluster(s)", clusters.len());
            DiscoveryResult {
                server,
                token: Some(token),
                clusters,
                error: None,
            }
        }
        Err(e) => DiscoveryResult {
            server,
            token: Some(token),
            clusters: Vec::new(),
            error: Some(e),
        },
    }
}

#[instrument(skip_all, fields(server = %task.server, cluster = %task.cluster.name))]
async fn download_one(
    provider: &dyn ClusterProvider,
    store: &dyn CredentialStore,
    options: &SyncOptions,
    task: DownloadTask,
    cancel: &CancellationToken,
) -> DownloadResult {
    if !task.token.is_valid() {
        let error = CorralError::TokenExpired {
            server: task.server.to_string(),
        };
        return DownloadResult::failed(task, error);
    }

    let fetched = {
        let (token, server, cluster_id) = (&task.token, &task.server, task.cluster.id.as_str());
        retry(&options.retry, cancel, "fetch kubeconfig", move || {
            bounded(
                "fetch kubeconfig",
                options.download_timeout,
                cancel,
                provider.fetch_kubeconfig(token, server, cluster_id),
            )
        })
        .await
    };

    let raw = match fetched {
        Ok(raw) => raw,
        Err(e) => return DownloadResult::failed(task, e),
    };

    let processed = match preprocess(&raw, &task.server) {
        Ok(processed) => processed,
        Err(e) => return DownloadResult::failed(task, e),
    };

    let path = task.output_path();
    match store.save(&path, &processed).await {
        Ok(()) => {
            info!("Saved kubeconfig to {}", path.display());
            DownloadResult::saved(task, &path)
        }
        Err(e) => DownloadResult::failed(task, e),
    }
}
