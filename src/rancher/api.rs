// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Request and response bodies of the Rancher v3 API.

use crate::types::Cluster;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const LOGIN_RESPONSE_TYPE: &str = "token";
pub const TOKEN_DESCRIPTION: &str = "corral kubeconfig sync";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub response_type: &'a str,
    pub description: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl LoginResponse {
    /// Rancher sends an empty string for tokens that never expire
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        let raw = self.expires_at.as_deref().filter(|s| !s.is_empty())?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                warn!("Ignoring unparseable token expiry '{}': {}", raw, e);
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClusterResource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub driver: Option<String>,
}

impl From<ClusterResource> for Cluster {
    fn from(resource: ClusterResource) -> Self {
        let name = if resource.name.is_empty() {
            resource.id.clone()
        } else {
            resource.name
        };
        let kind = resource
            .provider
            .filter(|p| !p.is_empty())
            .or(resource.driver)
            .unwrap_or_default();
        Cluster {
            id: resource.id,
            name,
            kind,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateKubeconfigOutput {
    pub config: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Short human-readable reason from an error body
pub fn error_message(body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<ApiError>(body) {
        if let Some(message) = err.message.filter(|m| !m.is_empty()) {
            return match err.code {
                Some(code) => format!("{}: {}", code, message),
                None => message,
            };
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}
