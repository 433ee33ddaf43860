// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Remote cluster-management servers: the provider contract and the Rancher
//! v3 REST implementation of it.

pub mod api;
pub mod client;

use crate::error::Result;
use crate::types::{AuthToken, Cluster, ServerIdentity};
use async_trait::async_trait;

pub use client::RancherClient;

/// A server that hands out tokens, cluster lists and per-cluster kubeconfigs
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    async fn authenticate(&self, server: &ServerIdentity, password: &str) -> Result<AuthToken>;

    async fn list_clusters(&self, token: &AuthToken, server: &ServerIdentity)
        -> Result<Vec<Cluster>>;

    /// Raw kubeconfig bytes exactly as the server generated them
    async fn fetch_kubeconfig(
        &self,
        token: &AuthToken,
        server: &ServerIdentity,
        cluster_id: &str,
    ) -> Result<Vec<u8>>;
}
