// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Name Rancher gives its own management cluster on every server
pub const LOCAL_CLUSTER_NAME: &str = "local";

/// Hex characters of the hostname digest kept as the server id
pub const SERVER_ID_LEN: usize = 8;

/// Environment variables read by the configuration layer
pub mod env {
    pub const CONFIG: &str = "CORRAL_CONFIG";
    pub const OUTPUT: &str = "CORRAL_OUTPUT";
    pub const DOWNLOAD_DIR: &str = "CORRAL_DOWNLOAD_DIR";
    pub const EXCLUDE: &str = "CORRAL_EXCLUDE";
    /// Suffixed with the upper-cased server id
    pub const PASSWORD_PREFIX: &str = "CORRAL_PASSWORD_";
    pub const KUBECONFIG: &str = "KUBECONFIG";
}

/// Concurrency bounds for the two sync phases
pub mod concurrency {
    pub const DISCOVERY: usize = 3;
    pub const DOWNLOAD: usize = 5;
    pub const CHECK: usize = 5;
}

/// Per-operation timeouts in seconds
pub mod timeouts {
    pub const AUTHENTICATE_SECS: u64 = 30;
    pub const LIST_SECS: u64 = 30;
    pub const DOWNLOAD_SECS: u64 = 60;
    pub const CHECK_SECS: u64 = 10;
    pub const CONNECT_SECS: u64 = 10;
}

/// Retry defaults for remote calls
pub mod retry {
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BASE_DELAY_MS: u64 = 500;
    pub const MAX_DELAY_MS: u64 = 10_000;
    pub const MULTIPLIER: f64 = 2.0;
    /// Jitter spreads each delay by this fraction in both directions
    pub const JITTER_FRACTION: f64 = 0.1;
}

/// Owner read/write only; merged kubeconfigs carry bearer tokens
pub const KUBECONFIG_FILE_MODE: u32 = 0o600;

pub const DOWNLOAD_FILE_EXTENSION: &str = "yaml";
