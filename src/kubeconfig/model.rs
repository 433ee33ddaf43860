// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Serde model of the client-config file.
//!
//! Only names and context references are typed. Cluster and user bodies are
//! carried as raw YAML so endpoints, CA data, tokens and client certificates
//! are written back exactly as they were read.

use crate::error::{CorralError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub clusters: Vec<NamedCluster>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contexts: Vec<NamedContext>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub users: Vec<NamedUser>,
    #[serde(
        rename = "current-context",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub current_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Value>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NamedCluster {
    pub name: String,
    /// `server`, `certificate-authority-data`, ... kept verbatim
    #[serde(default)]
    pub cluster: Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NamedUser {
    pub name: String,
    /// `token`, `client-certificate-data`, ... kept verbatim
    #[serde(default)]
    pub user: Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextRef,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ContextRef {
    pub cluster: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub extra: Mapping,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Kubeconfig {
    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(CorralError::KubeconfigParse("document is empty".to_string()));
        }
        serde_yaml::from_slice(raw).map_err(|e| CorralError::KubeconfigParse(e.to_string()))
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_yaml::to_string(self)
            .map(String::into_bytes)
            .map_err(|e| CorralError::KubeconfigParse(format!("Failed to serialize: {}", e)))
    }

    pub fn cluster_names(&self) -> BTreeSet<&str> {
        self.clusters.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn user_names(&self) -> BTreeSet<&str> {
        self.users.iter().map(|u| u.name.as_str()).collect()
    }

    pub fn context_names(&self) -> BTreeSet<&str> {
        self.contexts.iter().map(|c| c.name.as_str()).collect()
    }

    /// True when every context points at a cluster and user present in this file
    pub fn is_consistent(&self) -> bool {
        let clusters = self.cluster_names();
        let users = self.user_names();
        self.contexts.iter().all(|c| {
            clusters.contains(c.context.cluster.as_str()) && users.contains(c.context.user.as_str())
        })
    }
}
