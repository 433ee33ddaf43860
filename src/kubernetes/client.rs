// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-context client creation and API server reachability checks

use crate::error::{CorralError, Result};
use futures::stream::{self, StreamExt};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextStatus {
    Reachable { version: String },
    Unreachable { error: String },
}

/// Result of probing one kubeconfig context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextHealth {
    pub context: String,
    pub cluster: String,
    pub status: ContextStatus,
}

impl ContextHealth {
    pub fn is_reachable(&self) -> bool {
        matches!(self.status, ContextStatus::Reachable { .. })
    }
}

/// Make the process-wide TLS crypto provider explicit before any client is built
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Load a kubeconfig file the way kubectl would read it
pub async fn load_kubeconfig(path: &Path) -> Result<Kubeconfig> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CorralError::io(path, e))?;

    serde_yaml::from_str(&raw).map_err(|e| {
        CorralError::KubeconfigParse(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// Create a Kubernetes client for one named context of `kubeconfig`
pub async fn client_for_context(kubeconfig: Kubeconfig, context: &str) -> Result<Client> {
    let options = KubeConfigOptions {
        context: Some(context.to_string()),
        ..Default::default()
    };

    let client_config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(|e| {
            CorralError::KubeconfigParse(format!(
                "Failed to create config for context {}: {}",
                context, e
            ))
        })?;

    Ok(Client::try_from(client_config)?)
}

/// Ask the API server behind `client` for its version
pub async fn probe(client: &Client, timeout: Duration) -> ContextStatus {
    match tokio::time::timeout(timeout, client.apiserver_version()).await {
        Ok(Ok(info)) => ContextStatus::Reachable {
            version: info.git_version,
        },
        Ok(Err(e)) => ContextStatus::Unreachable {
            error: e.to_string(),
        },
        Err(_) => ContextStatus::Unreachable {
            error: format!("timed out after {:?}", timeout),
        },
    }
}

#[instrument(skip_all, fields(context = %context))]
async fn check_context(kubeconfig: Kubeconfig, context: String, timeout: Duration) -> ContextStatus {
    let client = match client_for_context(kubeconfig, &context).await {
        Ok(client) => client,
        Err(e) => {
            return ContextStatus::Unreachable {
                error: e.to_string(),
            }
        }
    };

    let status = probe(&client, timeout).await;
    debug!("Probed: {:?}", status);
    status
}

/// Probe every context of the kubeconfig at `path`, at most `concurrency` at a
/// time. Results are sorted by context name.
pub async fn check_contexts(
    path: &Path,
    concurrency: usize,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<ContextHealth>> {
    install_crypto_provider();
    let kubeconfig = load_kubeconfig(path).await?;

    let targets: Vec<(String, String)> = kubeconfig
        .contexts
        .iter()
        .map(|named| {
            let cluster = named
                .context
                .as_ref()
                .map(|c| c.cluster.clone())
                .unwrap_or_default();
            (named.name.clone(), cluster)
        })
        .collect();

    info!(
        "Checking {} context(s) from {}",
        targets.len(),
        path.display()
    );

    let mut results: Vec<ContextHealth> = stream::iter(targets)
        .map(|(context, cluster)| {
            let kubeconfig = kubeconfig.clone();
            let cancel = cancel.clone();
            async move {
                let status = tokio::select! {
                    _ = cancel.cancelled() => ContextStatus::Unreachable {
                        error: CorralError::Cancelled.to_string(),
                    },
                    status = check_context(kubeconfig, context.clone(), timeout) => status,
                };
                if let ContextStatus::Unreachable { error } = &status {
                    warn!("Context '{}' is unreachable: {}", context, error);
                }
                ContextHealth {
                    context,
                    cluster,
                    status,
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    results.sort_by(|a, b| a.context.cmp(&b.context));
    Ok(results)
}
