// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Where downloaded and merged kubeconfigs are kept.

use crate::constants::KUBECONFIG_FILE_MODE;
use crate::error::{CorralError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Replace the contents at `path`; readers never see a half-written file
    async fn save(&self, path: &Path, bytes: &[u8]) -> Result<()>;
    async fn load(&self, path: &Path) -> Result<Vec<u8>>;
    async fn remove(&self, path: &Path) -> Result<()>;
    /// Create `path` and any missing parents
    async fn make_dir(&self, path: &Path) -> Result<()>;
    async fn exists(&self, path: &Path) -> bool;
}

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Store backed by the local file system
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStore;

impl FsStore {
    /// Temp file next to `path`, distinct for every call in this process
    fn temp_path(path: &Path) -> PathBuf {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        path.with_file_name(format!(
            ".{}.{}.{}.tmp",
            file_name,
            std::process::id(),
            sequence
        ))
    }

    async fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(KUBECONFIG_FILE_MODE);

        let mut file = options.open(path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FsStore {
    async fn save(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.make_dir(parent).await?;
        }

        let temp = Self::temp_path(path);
        if let Err(e) = Self::write_private(&temp, bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(CorralError::io(&temp, e));
        }

        if let Err(e) = tokio::fs::rename(&temp, path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(CorralError::io(path, e));
        }

        debug!("Saved {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    async fn load(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| CorralError::io(path, e))
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| CorralError::io(path, e))
    }

    async fn make_dir(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| CorralError::io(path, e))
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

/// In-memory store, handy for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    fn not_found(path: &Path) -> CorralError {
        CorralError::io(path, io::Error::from(io::ErrorKind::NotFound))
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn save(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    async fn load(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
            .ok_or_else(|| Self::not_found(path))
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(path))
    }

    async fn make_dir(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(path)
    }
}

/// Remove intermediate files; failures are logged and never returned.
/// Returns how many files were removed.
pub async fn cleanup(store: &dyn CredentialStore, paths: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in paths {
        match store.remove(path).await {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    debug!("Removed {} of {} downloaded kubeconfigs", removed, paths.len());
    removed
}
