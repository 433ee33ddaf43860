// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster discovery and kubeconfig download across Rancher servers.

pub mod manager;

pub use manager::{SyncManager, SyncOptions, SyncReport};
