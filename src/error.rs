// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use http::StatusCode;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorralError {
    #[error("Kubernetes client error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to parse kubeconfig: {0}")]
    KubeconfigParse(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("{operation} failed after {} attempts: {}", .errors.len(), join_errors(.errors))]
    RetriesExhausted {
        operation: String,
        errors: Vec<CorralError>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Auth token for {server} has expired")]
    TokenExpired { server: String },

    #[error("Exclude filter needs at least one pattern")]
    EmptyFilter,

    #[error("Invalid exclude pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("Nothing to merge: no kubeconfig files given")]
    NothingToMerge,

    #[error("Nothing left to write: all {excluded} contexts were excluded by the filter")]
    AllClustersFiltered { excluded: usize },

    #[error("Nothing left to write: {skipped} input files were unreadable and {empty} held no contexts")]
    NoValidInput { skipped: usize, empty: usize },

    #[error("Sync cancelled after saving {saved} of {total} kubeconfigs")]
    SyncCancelled { saved: usize, total: usize },

    #[error("All {failed} servers failed authentication or cluster discovery")]
    NoServersReachable { failed: usize },

    #[error("All {failed} kubeconfig downloads failed")]
    AllDownloadsFailed { failed: usize },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CorralError>;

impl CorralError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Transient network failures, timeouts and 429/502/503/504 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(
        StatusCode::from_u16(status),
        Ok(StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT)
    )
}

fn join_errors(errors: &[CorralError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("[{}] {}", i + 1, e))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<reqwest::Error> for CorralError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else if e.is_builder() {
            Self::Config(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}
