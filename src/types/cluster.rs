// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{DOWNLOAD_FILE_EXTENSION, LOCAL_CLUSTER_NAME};
use crate::error::CorralError;
use crate::types::server::{sanitize_name, AuthToken, ServerIdentity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A downstream cluster as reported by a Rancher server
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    /// Provisioning driver reported by the server, e.g. `rke2` or `imported`
    #[serde(default)]
    pub kind: String,
}

impl Cluster {
    pub fn new(id: &str, name: &str, kind: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Check if this is the server's own management cluster
    pub fn is_local(&self) -> bool {
        self.name == LOCAL_CLUSTER_NAME
    }

    /// File name under the download directory holding this cluster's kubeconfig.
    ///
    /// The management cluster is named after the server host so that every
    /// server's `local` lands in its own file. Other clusters carry their id,
    /// which the server keeps unique even where sanitized names coincide.
    pub fn kubeconfig_file_name(&self, server: &ServerIdentity) -> String {
        let stem = if self.is_local() {
            server.local_name()
        } else {
            let id = sanitize_name(&self.id);
            match sanitize_name(&self.name) {
                name if name.is_empty() || name == id => format!("{}-{}", id, server.id()),
                name => format!("{}-{}-{}", name, id, server.id()),
            }
        };
        format!("{}.{}", stem, DOWNLOAD_FILE_EXTENSION)
    }
}

/// Outcome of logging in to one server and listing its clusters
#[derive(Debug)]
pub struct DiscoveryResult {
    pub server: ServerIdentity,
    pub token: Option<AuthToken>,
    pub clusters: Vec<Cluster>,
    pub error: Option<CorralError>,
}

/// One kubeconfig to fetch, consumed by exactly one download worker
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub server: ServerIdentity,
    pub cluster: Cluster,
    pub token: AuthToken,
    pub output_dir: PathBuf,
}

impl DownloadTask {
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(self.cluster.kubeconfig_file_name(&self.server))
    }
}

/// What a download worker produced for a task
#[derive(Debug)]
pub struct DownloadResult {
    pub task: DownloadTask,
    pub path: Option<PathBuf>,
    pub error: Option<CorralError>,
}

impl DownloadResult {
    pub fn saved(task: DownloadTask, path: &Path) -> Self {
        Self {
            task,
            path: Some(path.to_path_buf()),
            error: None,
        }
    }

    pub fn failed(task: DownloadTask, error: CorralError) -> Self {
        Self {
            task,
            path: None,
            error: Some(error),
        }
    }
}
