// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Rancher v3 API client

use crate::constants::timeouts::CONNECT_SECS;
use crate::error::{CorralError, Result};
use crate::rancher::api::{
    error_message, ClusterResource, Collection, GenerateKubeconfigOutput, LoginRequest,
    LoginResponse, LOGIN_RESPONSE_TYPE, TOKEN_DESCRIPTION,
};
use crate::rancher::ClusterProvider;
use crate::types::{AuthToken, Cluster, ServerIdentity};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Upper bound on followed `pagination.next` links for one listing
pub const MAX_PAGES: usize = 100;

#[derive(Clone, Debug)]
pub struct RancherClient {
    http: reqwest::Client,
    insecure_http: reqwest::Client,
}

impl RancherClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: Self::build_http(false)?,
            insecure_http: Self::build_http(true)?,
        })
    }

    fn build_http(accept_invalid_certs: bool) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(concat!("corral/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(CONNECT_SECS))
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| CorralError::Config(format!("Failed to build HTTP client: {}", e)))
    }

    fn http_for(&self, server: &ServerIdentity) -> &reqwest::Client {
        if server.insecure_skip_tls_verify() {
            &self.insecure_http
        } else {
            &self.http
        }
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder, what: &str) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(CorralError::Http {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| CorralError::MalformedResponse(format!("{}: {}", what, e)))
    }

    fn cluster_action_url(server: &ServerIdentity, cluster_id: &str, action: &str) -> Result<Url> {
        let mut url = server.endpoint(&format!("v3/clusters/{}", cluster_id))?;
        url.query_pairs_mut().append_pair("action", action);
        Ok(url)
    }
}

#[async_trait]
impl ClusterProvider for RancherClient {
    #[instrument(skip(self, server, password), fields(server = %server, user = server.username()))]
    async fn authenticate(&self, server: &ServerIdentity, password: &str) -> Result<AuthToken> {
        let mut url = server.endpoint(&format!("v3-public/{}", server.auth_type().provider_path()))?;
        url.query_pairs_mut().append_pair("action", "login");

        let body = LoginRequest {
            username: server.username(),
            password,
            response_type: LOGIN_RESPONSE_TYPE,
            description: TOKEN_DESCRIPTION,
        };

        let login: LoginResponse =
            Self::send_json(self.http_for(server).post(url).json(&body), "login response").await?;
        if login.token.is_empty() {
            return Err(CorralError::MalformedResponse(
                "login response carried an empty token".to_string(),
            ));
        }

        let expiry = login.expiry();
        let token = AuthToken::new(login.token, expiry);
        info!(
            "Authenticated, token expires {}",
            token
                .expires_at()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        );
        Ok(token)
    }

    #[instrument(skip(self, token, server), fields(server = %server))]
    async fn list_clusters(
        &self,
        token: &AuthToken,
        server: &ServerIdentity,
    ) -> Result<Vec<Cluster>> {
        let mut clusters = Vec::new();
        let mut next = Some(server.endpoint("v3/clusters")?);
        let mut pages = 0;

        while let Some(url) = next.take() {
            pages += 1;
            let page: Collection<ClusterResource> = Self::send_json(
                self.http_for(server).get(url).bearer_auth(token.value()),
                "cluster list",
            )
            .await?;
            clusters.extend(page.data.into_iter().map(Cluster::from));

            next = match page.pagination.and_then(|p| p.next) {
                Some(link) if pages < MAX_PAGES => Some(Url::parse(&link).map_err(|e| {
                    CorralError::MalformedResponse(format!("bad pagination link '{}': {}", link, e))
                })?),
                Some(_) => {
                    warn!(
                        "Stopped listing clusters after {} pages, the list is incomplete",
                        MAX_PAGES
                    );
                    None
                }
                None => None,
            };
        }

        debug!("Listed {} clusters in {} page(s)", clusters.len(), pages);
        Ok(clusters)
    }

    #[instrument(skip(self, token, server), fields(server = %server))]
    async fn fetch_kubeconfig(
        &self,
        token: &AuthToken,
        server: &ServerIdentity,
        cluster_id: &str,
    ) -> Result<Vec<u8>> {
        let url = Self::cluster_action_url(server, cluster_id, "generateKubeconfig")?;
        let output: GenerateKubeconfigOutput = Self::send_json(
            self.http_for(server).post(url).bearer_auth(token.value()),
            "generateKubeconfig response",
        )
        .await?;

        if output.config.trim().is_empty() {
            return Err(CorralError::MalformedResponse(format!(
                "server returned an empty kubeconfig for cluster {}",
                cluster_id
            )));
        }
        Ok(output.config.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::make_server;

    #[test]
    fn test_cluster_action_url() {
        let server = make_server("https://rancher.example.com");
        let url = RancherClient::cluster_action_url(&server, "c-m-abc", "generateKubeconfig")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://rancher.example.com/v3/clusters/c-m-abc?action=generateKubeconfig"
        );
    }

    #[test]
    fn test_cluster_action_url_keeps_base_path() {
        let server = make_server("https://proxy.example.com/rancher");
        let url = RancherClient::cluster_action_url(&server, "local", "generateKubeconfig")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://proxy.example.com/rancher/v3/clusters/local?action=generateKubeconfig"
        );
    }

    #[test]
    fn test_http_client_chosen_per_server() {
        let client = RancherClient::new().unwrap();
        let strict = make_server("https://a.example.com");
        let insecure = make_server("https://b.example.com").with_insecure_skip_tls_verify(true);

        assert!(std::ptr::eq(client.http_for(&strict), &client.http));
        assert!(std::ptr::eq(client.http_for(&insecure), &client.insecure_http));
    }
}
