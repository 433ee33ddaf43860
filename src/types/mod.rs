// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Servers, tokens, clusters and the work items passed between sync phases.

pub mod cluster;
pub mod server;

pub use cluster::{Cluster, DiscoveryResult, DownloadResult, DownloadTask};
pub use server::{sanitize_name, AuthToken, AuthType, ServerCredential, ServerIdentity};
