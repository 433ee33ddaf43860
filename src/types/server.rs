// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{LOCAL_CLUSTER_NAME, SERVER_ID_LEN};
use crate::error::{CorralError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Login provider a Rancher server authenticates a user against
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    Local,
    ActiveDirectory,
    OpenLdap,
    FreeIpa,
    AzureAd,
    Github,
}

impl AuthType {
    /// Path segment of the login action under `/v3-public`
    pub fn provider_path(&self) -> &'static str {
        match self {
            AuthType::Local => "localProviders/local",
            AuthType::ActiveDirectory => "activeDirectoryProviders/activedirectory",
            AuthType::OpenLdap => "openLdapProviders/openldap",
            AuthType::FreeIpa => "freeIpaProviders/freeipa",
            AuthType::AzureAd => "azureADProviders/azuread",
            AuthType::Github => "githubProviders/github",
        }
    }
}

/// A Rancher server and the account used to log in to it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerIdentity {
    url: Url,
    username: String,
    auth_type: AuthType,
    insecure_skip_tls_verify: bool,
    /// Another server in the same run shares this host slug
    shared_host_slug: bool,
}

impl ServerIdentity {
    pub fn new(url: &str, username: &str, auth_type: AuthType) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| CorralError::Config(format!("Invalid server URL '{}': {}", url, e)))?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(CorralError::Config(format!(
                "Server URL '{}' has no hostname",
                url
            )));
        }

        Ok(Self {
            url,
            username: username.to_string(),
            auth_type,
            insecure_skip_tls_verify: false,
            shared_host_slug: false,
        })
    }

    pub fn with_insecure_skip_tls_verify(mut self, insecure: bool) -> Self {
        self.insecure_skip_tls_verify = insecure;
        self
    }

    /// Mark that another server of the same run reduces to the same host slug
    pub fn with_shared_host_slug(mut self, shared: bool) -> Self {
        self.shared_host_slug = shared;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    pub fn insecure_skip_tls_verify(&self) -> bool {
        self.insecure_skip_tls_verify
    }

    pub fn hostname(&self) -> String {
        self.url.host_str().unwrap_or_default().to_ascii_lowercase()
    }

    /// Short stable id derived from the hostname only, so two URLs on the
    /// same host identify the same server.
    pub fn id(&self) -> String {
        let digest = Sha256::digest(self.hostname().as_bytes());
        let mut id = hex::encode(digest);
        id.truncate(SERVER_ID_LEN);
        id
    }

    /// Hostname reduced to a token safe for file names and kubeconfig entries
    pub fn host_slug(&self) -> String {
        sanitize_name(&self.hostname())
    }

    /// Name this server's management cluster carries in downloads and merged
    /// output: `local-<host slug>`, or `local-<id>-<host slug>` when the slug is
    /// shared. It never ends in `-<id>`, the tag every other entry gets.
    pub fn local_name(&self) -> String {
        if self.shared_host_slug {
            format!("{}-{}-{}", LOCAL_CLUSTER_NAME, self.id(), self.host_slug())
        } else {
            format!("{}-{}", LOCAL_CLUSTER_NAME, self.host_slug())
        }
    }

    /// URL for an API path relative to the server root, keeping any base path
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = self.url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/'))
            .map_err(|e| CorralError::Config(format!("Invalid API path '{}': {}", path, e)))
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url.as_str().trim_end_matches('/'))
    }
}

/// A server together with the password to use for it, if one is known
#[derive(Clone)]
pub struct ServerCredential {
    pub server: ServerIdentity,
    pub password: Option<String>,
}

impl fmt::Debug for ServerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCredential")
            .field("server", &self.server)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Session token handed out by a server after login
#[derive(Clone)]
pub struct AuthToken {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AuthToken {
    pub fn new(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// A token without an expiry never goes stale
    pub fn is_valid(&self) -> bool {
        self.expires_at.map_or(true, |expiry| Utc::now() < expiry)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Lower-case, keep `[a-z0-9]`, collapse everything else into single dashes.
pub fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}
