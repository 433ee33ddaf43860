// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: kubeconfig fixtures, an in-memory cluster provider and a
//! mock Kubernetes API service.

use crate::error::{CorralError, Result};
use crate::rancher::ClusterProvider;
use crate::types::{AuthToken, AuthType, Cluster, ServerIdentity};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use http::{Request, Response};
use kube::client::Body;
use kube::Client;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

pub fn make_server(url: &str) -> ServerIdentity {
    ServerIdentity::new(url, "admin", AuthType::Local).unwrap()
}

/// Kubeconfig shaped like the ones Rancher generates for a single cluster
pub fn rancher_kubeconfig(name: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
clusters:
- name: "{name}"
  cluster:
    server: "https://rancher.example.com/k8s/clusters/c-m-{name}"
    certificate-authority-data: "LS0tLS1CRUdJTi1DRVJUSUZJQ0FURS0tLS0t"
users:
- name: "{name}"
  user:
    token: "kubeconfig-user-{name}:secret"
contexts:
- name: "{name}"
  context:
    user: "{name}"
    cluster: "{name}"
current-context: "{name}"
"#
    )
}

/// Same as [`rancher_kubeconfig`] plus an authorized-cluster-endpoint context
/// that talks to a node directly
pub fn rancher_kubeconfig_with_ace(name: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
clusters:
- name: "{name}"
  cluster:
    server: "https://rancher.example.com/k8s/clusters/c-m-{name}"
    certificate-authority-data: "LS0tLS1CRUdJTi1DRVJUSUZJQ0FURS0tLS0t"
- name: "{name}-node1"
  cluster:
    server: "https://10.0.0.11:6443"
    certificate-authority-data: "LS0tLS1CRUdJTi1OT0RFLS0tLS0t"
users:
- name: "{name}"
  user:
    token: "kubeconfig-user-{name}:secret"
contexts:
- name: "{name}"
  context:
    user: "{name}"
    cluster: "{name}"
- name: "{name}-node1"
  context:
    user: "{name}"
    cluster: "{name}-node1"
current-context: "{name}"
"#
    )
}

#[derive(Default)]
struct MockServerState {
    clusters: Vec<Cluster>,
    auth_status: Option<u16>,
    list_failures: VecDeque<u16>,
    fetch_failures: HashMap<String, VecDeque<u16>>,
    expired_tokens: bool,
}

/// In-memory [`ClusterProvider`] keyed by server hostname.
///
/// Unknown servers fail authentication with a 404.
#[derive(Default)]
pub struct MockProvider {
    servers: Mutex<HashMap<String, MockServerState>>,
    fetch_delay: Option<Duration>,
    auth_calls: AtomicUsize,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn host(url: &str) -> String {
        make_server(url).hostname()
    }

    fn with_state(self, url: &str, f: impl FnOnce(&mut MockServerState)) -> Self {
        f(self
            .servers
            .lock()
            .unwrap()
            .entry(Self::host(url))
            .or_default());
        self
    }

    pub fn with_server(self, url: &str, clusters: &[Cluster]) -> Self {
        let clusters = clusters.to_vec();
        self.with_state(url, |s| s.clusters = clusters)
    }

    pub fn fail_auth(self, url: &str, status: u16) -> Self {
        self.with_state(url, |s| s.auth_status = Some(status))
    }

    /// Fail the next listings with `statuses`, one per call, then succeed
    pub fn fail_list(self, url: &str, statuses: &[u16]) -> Self {
        let statuses: VecDeque<u16> = statuses.iter().copied().collect();
        self.with_state(url, |s| s.list_failures = statuses)
    }

    /// Fail the next fetches of `cluster_id` with `statuses`, then succeed
    pub fn fail_fetch(self, url: &str, cluster_id: &str, statuses: &[u16]) -> Self {
        let statuses: VecDeque<u16> = statuses.iter().copied().collect();
        self.with_state(url, |s| {
            s.fetch_failures.insert(cluster_id.to_string(), statuses);
        })
    }

    /// Hand out tokens that are already past their expiry
    pub fn with_expired_tokens(self, url: &str) -> Self {
        self.with_state(url, |s| s.expired_tokens = true)
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches that were running at the same time
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn http(status: u16) -> CorralError {
        CorralError::Http {
            status,
            message: "mock failure".to_string(),
        }
    }
}

#[async_trait]
impl ClusterProvider for MockProvider {
    async fn authenticate(&self, server: &ServerIdentity, _password: &str) -> Result<AuthToken> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        let servers = self.servers.lock().unwrap();
        let state = servers.get(&server.hostname()).ok_or_else(|| Self::http(404))?;
        if let Some(status) = state.auth_status {
            return Err(Self::http(status));
        }

        let expires_at = if state.expired_tokens {
            Some(Utc::now() - ChronoDuration::hours(1))
        } else {
            Some(Utc::now() + ChronoDuration::hours(1))
        };
        Ok(AuthToken::new(
            format!("token-{}", server.hostname()),
            expires_at,
        ))
    }

    async fn list_clusters(
        &self,
        _token: &AuthToken,
        server: &ServerIdentity,
    ) -> Result<Vec<Cluster>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut servers = self.servers.lock().unwrap();
        let state = servers
            .get_mut(&server.hostname())
            .ok_or_else(|| Self::http(404))?;
        if let Some(status) = state.list_failures.pop_front() {
            return Err(Self::http(status));
        }
        Ok(state.clusters.clone())
    }

    async fn fetch_kubeconfig(
        &self,
        _token: &AuthToken,
        server: &ServerIdentity,
        cluster_id: &str,
    ) -> Result<Vec<u8>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let mut servers = self.servers.lock().unwrap();
            match servers.get_mut(&server.hostname()) {
                None => Err(Self::http(404)),
                Some(state) => match state
                    .fetch_failures
                    .get_mut(cluster_id)
                    .and_then(VecDeque::pop_front)
                {
                    Some(status) => Err(Self::http(status)),
                    None => state
                        .clusters
                        .iter()
                        .find(|c| c.id == cluster_id)
                        .map(|c| rancher_kubeconfig(&c.name).into_bytes())
                        .ok_or_else(|| Self::http(404)),
                },
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// A mock HTTP service for `kube::Client` that answers by method and path.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().insert(
            ("GET".to_string(), path.to_string()),
            (status, body.to_string()),
        );
        self
    }

    pub fn into_client(self) -> Client {
        Client::new(self, "https://kubernetes.default.svc")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        self.responses
            .lock()
            .unwrap()
            .get(&(method.to_string(), path.to_string()))
            .cloned()
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let response = self.find_response(req.method().as_str(), req.uri().path());

        Box::pin(async move {
            let (status, body) = response.unwrap_or_else(|| {
                (
                    404,
                    r#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"not found","reason":"NotFound","code":404}"#
                        .to_string(),
                )
            });
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Body of the API server's `/version` endpoint
pub fn version_json(git_version: &str) -> String {
    serde_json::json!({
        "major": "1",
        "minor": "30",
        "gitVersion": git_version,
        "gitCommit": "abc123",
        "gitTreeState": "clean",
        "buildDate": "2024-05-01T00:00:00Z",
        "goVersion": "go1.22.2",
        "compiler": "gc",
        "platform": "linux/amd64"
    })
    .to_string()
}
