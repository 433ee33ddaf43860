// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{concurrency, env as env_vars, retry, timeouts};
use crate::retry::RetryPolicy;
use crate::sync::SyncOptions;
use crate::types::{AuthType, ServerCredential, ServerIdentity};
use anyhow::{bail, Context, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// One `servers:` entry as written in the config file
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub url: String,
    pub username: String,
    #[serde(default)]
    pub auth_type: AuthType,
    /// Variable holding the password; defaults to `CORRAL_PASSWORD_<ID>`
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub discovery: usize,
    pub download: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            discovery: concurrency::DISCOVERY,
            download: concurrency::DOWNLOAD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub authenticate_secs: u64,
    pub list_secs: u64,
    pub download_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            authenticate_secs: timeouts::AUTHENTICATE_SECS,
            list_secs: timeouts::LIST_SECS,
            download_secs: timeouts::DOWNLOAD_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::MAX_ATTEMPTS,
            base_delay_ms: retry::BASE_DELAY_MS,
            max_delay_ms: retry::MAX_DELAY_MS,
            multiplier: retry::MULTIPLIER,
            jitter: true,
        }
    }
}

/// The config file as written
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub servers: Vec<ServerEntry>,
    pub exclude: Vec<String>,
    pub output: Option<String>,
    pub download_dir: Option<String>,
    pub concurrency: ConcurrencyConfig,
    pub timeouts: TimeoutsConfig,
    pub retry: RetryConfig,
}

/// A validated server together with where its password comes from
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub identity: ServerIdentity,
    pub password_env: String,
}

/// Fully resolved configuration for one invocation
#[derive(Debug, Clone)]
pub struct Config {
    pub servers: Vec<ServerConfig>,
    pub exclude: Vec<String>,
    pub output: PathBuf,
    pub download_dir: PathBuf,
    pub sync: SyncOptions,
}

impl Config {
    /// Load the config file and apply environment overrides.
    ///
    /// The file is taken from `path`, then `CORRAL_CONFIG`, then the default
    /// location. Only a missing file at the default location is tolerated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(env_vars::CONFIG).map(PathBuf::from));

        let file = match explicit {
            Some(path) => {
                let path = expand_home(&path.to_string_lossy());
                Self::read_file(&path)?
            }
            None => match default_config_path() {
                Some(path) if path.exists() => Self::read_file(&path)?,
                Some(path) => {
                    debug!("No config file at {}, using defaults", path.display());
                    FileConfig::default()
                }
                None => FileConfig::default(),
            },
        };

        Self::from_file_config(file, |key| env::var(key).ok())
    }

    fn read_file(path: &Path) -> Result<FileConfig> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file: FileConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!(
            "Configuration loaded from {}: {} server(s)",
            path.display(),
            file.servers.len()
        );
        Ok(file)
    }

    /// Validate `file` and resolve paths, reading overrides through `lookup`
    pub fn from_file_config(
        file: FileConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut servers = Vec::with_capacity(file.servers.len());
        let mut hosts = BTreeSet::new();
        let mut slugs: BTreeMap<String, String> = BTreeMap::new();

        for entry in file.servers {
            let identity = ServerIdentity::new(&entry.url, &entry.username, entry.auth_type)
                .with_context(|| format!("Invalid server entry for {}", entry.url))?
                .with_insecure_skip_tls_verify(entry.insecure_skip_tls_verify);

            if !hosts.insert(identity.hostname()) {
                bail!(
                    "Server host {} is configured more than once",
                    identity.hostname()
                );
            }
            if let Some(other) = slugs.insert(identity.host_slug(), identity.hostname()) {
                bail!(
                    "Server hosts {} and {} both reduce to '{}', which would mix up their local clusters",
                    other,
                    identity.hostname(),
                    identity.host_slug()
                );
            }

            let password_env = entry
                .password_env
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default_password_env(&identity));

            servers.push(ServerConfig {
                identity,
                password_env,
            });
        }

        if file.concurrency.discovery == 0 || file.concurrency.download == 0 {
            bail!("concurrency.discovery and concurrency.download must be at least 1");
        }
        if file.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if file.retry.multiplier.is_nan() || file.retry.multiplier < 1.0 {
            bail!(
                "retry.multiplier must be at least 1.0, got {}",
                file.retry.multiplier
            );
        }

        let exclude = match lookup(env_vars::EXCLUDE) {
            Some(list) => split_list(&list),
            None => file.exclude,
        };

        let output = lookup(env_vars::OUTPUT)
            .or(file.output)
            .map(|p| expand_home(&p))
            .unwrap_or_else(|| default_output(lookup(env_vars::KUBECONFIG).as_deref()));

        let download_dir = lookup(env_vars::DOWNLOAD_DIR)
            .or(file.download_dir)
            .map(|p| expand_home(&p))
            .unwrap_or_else(default_download_dir);

        let sync = SyncOptions {
            discovery_concurrency: file.concurrency.discovery,
            download_workers: file.concurrency.download,
            authenticate_timeout: Duration::from_secs(file.timeouts.authenticate_secs),
            list_timeout: Duration::from_secs(file.timeouts.list_secs),
            download_timeout: Duration::from_secs(file.timeouts.download_secs),
            retry: RetryPolicy {
                max_attempts: file.retry.max_attempts,
                base_delay: Duration::from_millis(file.retry.base_delay_ms),
                max_delay: Duration::from_millis(file.retry.max_delay_ms),
                multiplier: file.retry.multiplier,
                jitter: file.retry.jitter,
            },
        };

        Ok(Config {
            servers,
            exclude,
            output,
            download_dir,
            sync,
        })
    }

    /// Pair every server with its password, if the variable is set and non-empty
    pub fn credentials(&self, lookup: impl Fn(&str) -> Option<String>) -> Vec<ServerCredential> {
        self.servers
            .iter()
            .map(|s| ServerCredential {
                server: s.identity.clone(),
                password: lookup(&s.password_env).filter(|p| !p.is_empty()),
            })
            .collect()
    }
}

/// `CORRAL_PASSWORD_<ID>` for `server`
pub fn default_password_env(server: &ServerIdentity) -> String {
    format!(
        "{}{}",
        env_vars::PASSWORD_PREFIX,
        server.id().to_ascii_uppercase()
    )
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Expand a leading `~` to the home directory
pub fn expand_home(raw: &str) -> PathBuf {
    let rest = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(raw),
    };
    match home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(raw),
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "corral").map(|dirs| dirs.config_dir().join("config.yaml"))
}

fn default_download_dir() -> PathBuf {
    ProjectDirs::from("", "", "corral")
        .map(|dirs| dirs.cache_dir().join("downloads"))
        .unwrap_or_else(|| env::temp_dir().join("corral"))
}

/// First entry of `KUBECONFIG`, else `~/.kube/config`
fn default_output(kubeconfig: Option<&str>) -> PathBuf {
    if let Some(first) = kubeconfig
        .and_then(|v| env::split_paths(v).next())
        .filter(|p| !p.as_os_str().is_empty())
    {
        return first;
    }
    home_dir()
        .unwrap_or_default()
        .join(".kube")
        .join("config")
}
