// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! A local HTTP server that answers like a Rancher v3 API.
#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const LOGIN_PATH: &str = "/v3-public/localProviders/local?action=login";
pub const CLUSTERS_PATH: &str = "/v3/clusters";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Default)]
struct State {
    /// Responses per (method, path and query); the last one repeats forever
    routes: Mutex<HashMap<(String, String), VecDeque<(u16, String)>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl State {
    fn respond(&self, method: &str, target: &str) -> (u16, String) {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&(method.to_string(), target.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => (
                404,
                r#"{"type":"error","status":"404","code":"NotFound","message":"not found"}"#
                    .to_string(),
            ),
        }
    }
}

pub struct MockRancher {
    addr: SocketAddr,
    state: Arc<State>,
}

impl MockRancher {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(State::default());

        let server_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&server_state);
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(req, Arc::clone(&state)));
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, state }
    }

    /// Base URL reaching this server under `host`, so two mocks on the same
    /// machine can look like different Rancher servers
    pub fn url_as(&self, host: &str) -> String {
        format!("http://{}:{}", host, self.addr.port())
    }

    pub fn url(&self) -> String {
        self.url_as("127.0.0.1")
    }

    /// Queue a response for `method` on `target` (path plus query)
    pub fn on(&self, method: &str, target: &str, status: u16, body: &str) -> &Self {
        self.state
            .routes
            .lock()
            .unwrap()
            .entry((method.to_string(), target.to_string()))
            .or_default()
            .push_back((status, body.to_string()));
        self
    }

    /// Accept logins and serve `clusters` as `(id, name)` pairs
    pub fn with_clusters(&self, clusters: &[(&str, &str)]) -> &Self {
        self.on("POST", LOGIN_PATH, 201, &login_json("token-abc:secret"));
        let data: Vec<serde_json::Value> = clusters
            .iter()
            .map(|(id, name)| serde_json::json!({"id": id, "name": name, "provider": "rke2"}))
            .collect();
        self.on(
            "GET",
            CLUSTERS_PATH,
            200,
            &serde_json::json!({"type": "collection", "data": data}).to_string(),
        );
        for (id, name) in clusters {
            self.on(
                "POST",
                &generate_path(id),
                200,
                &serde_json::json!({"config": kubeconfig_yaml(name)}).to_string(),
            );
        }
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, target: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.target == target)
            .count()
    }
}

async fn handle(
    req: Request<Incoming>,
    state: Arc<State>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().to_string();
    let target = req
        .uri()
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();
    let authorization = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = req
        .into_body()
        .collect()
        .await
        .map(|b| b.to_bytes())
        .unwrap_or_default();

    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        target: target.clone(),
        authorization,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let (status, body) = state.respond(&method, &target);
    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap())
}

pub fn generate_path(cluster_id: &str) -> String {
    format!("/v3/clusters/{}?action=generateKubeconfig", cluster_id)
}

pub fn login_json(token: &str) -> String {
    serde_json::json!({"type": "token", "token": token, "expiresAt": ""}).to_string()
}

/// Kubeconfig as Rancher generates it for cluster `name`
pub fn kubeconfig_yaml(name: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
clusters:
- name: "{name}"
  cluster:
    server: "https://rancher.example.com/k8s/clusters/{name}"
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
