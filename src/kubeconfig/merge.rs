// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Filtering and merging of per-cluster kubeconfigs into one file.

use crate::error::{CorralError, Result};
use crate::filter::{excludes_context, ClusterFilter};
use crate::kubeconfig::model::{Kubeconfig, NamedCluster, NamedContext, NamedUser};
use crate::store::CredentialStore;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Context to select in the output, if it survives filtering
    pub current_context: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub files_merged: usize,
    pub files_skipped: usize,
    /// Files that parsed but had no usable context even before filtering
    pub files_empty: usize,
    pub contexts_excluded: usize,
    /// Contexts dropped because their cluster or user was missing from their file
    pub contexts_dangling: usize,
    pub clusters: usize,
    pub users: usize,
    pub contexts: usize,
    pub current_context: Option<String>,
}

/// A kubeconfig after filtering, with what was dropped
#[derive(Debug)]
pub struct FilterOutcome {
    pub kubeconfig: Kubeconfig,
    pub excluded: usize,
    pub dangling: usize,
}

/// Drop excluded contexts, contexts pointing outside the file, and every
/// cluster or user no surviving context refers to.
pub fn filter_kubeconfig(mut kubeconfig: Kubeconfig, filter: &dyn ClusterFilter) -> FilterOutcome {
    let cluster_names: BTreeSet<String> =
        kubeconfig.clusters.iter().map(|c| c.name.clone()).collect();
    let user_names: BTreeSet<String> = kubeconfig.users.iter().map(|u| u.name.clone()).collect();

    let mut excluded = 0;
    let mut dangling = 0;
    kubeconfig.contexts.retain(|c| {
        if excludes_context(filter, &c.name, &c.context.cluster) {
            debug!("Excluding context '{}' (cluster '{}')", c.name, c.context.cluster);
            excluded += 1;
            return false;
        }
        if !cluster_names.contains(&c.context.cluster) || !user_names.contains(&c.context.user) {
            warn!(
                "Dropping context '{}': cluster '{}' or user '{}' is not defined in the same file",
                c.name, c.context.cluster, c.context.user
            );
            dangling += 1;
            return false;
        }
        true
    });

    let used_clusters: BTreeSet<&str> = kubeconfig
        .contexts
        .iter()
        .map(|c| c.context.cluster.as_str())
        .collect();
    let used_users: BTreeSet<&str> = kubeconfig
        .contexts
        .iter()
        .map(|c| c.context.user.as_str())
        .collect();

    let clusters = std::mem::take(&mut kubeconfig.clusters)
        .into_iter()
        .filter(|c| used_clusters.contains(c.name.as_str()))
        .collect();
    let users = std::mem::take(&mut kubeconfig.users)
        .into_iter()
        .filter(|u| used_users.contains(u.name.as_str()))
        .collect();
    kubeconfig.clusters = clusters;
    kubeconfig.users = users;

    let current_survives = kubeconfig
        .current_context
        .as_deref()
        .is_some_and(|cur| kubeconfig.contexts.iter().any(|c| c.name == cur));
    if !current_survives {
        kubeconfig.current_context = None;
    }

    FilterOutcome {
        kubeconfig,
        excluded,
        dangling,
    }
}

/// Union of filtered kubeconfigs; the last write for a name wins
#[derive(Debug, Default)]
struct Accumulator {
    clusters: BTreeMap<String, NamedCluster>,
    users: BTreeMap<String, NamedUser>,
    contexts: BTreeMap<String, NamedContext>,
    current_contexts: BTreeSet<String>,
}

impl Accumulator {
    fn absorb(&mut self, kubeconfig: Kubeconfig, source: &Path) {
        for cluster in kubeconfig.clusters {
            if self.clusters.get(&cluster.name).is_some_and(|prev| prev != &cluster) {
                warn!("Cluster '{}' from {} replaces an earlier entry", cluster.name, source.display());
            }
            self.clusters.insert(cluster.name.clone(), cluster);
        }
        for user in kubeconfig.users {
            if self.users.get(&user.name).is_some_and(|prev| prev != &user) {
                warn!("User '{}' from {} replaces an earlier entry", user.name, source.display());
            }
            self.users.insert(user.name.clone(), user);
        }
        for context in kubeconfig.contexts {
            if self.contexts.get(&context.name).is_some_and(|prev| prev != &context) {
                warn!("Context '{}' from {} replaces an earlier entry", context.name, source.display());
            }
            self.contexts.insert(context.name.clone(), context);
        }
        if let Some(current) = kubeconfig.current_context {
            self.current_contexts.insert(current);
        }
    }

    fn choose_current_context(&self, preferred: &[Option<String>]) -> Option<String> {
        preferred
            .iter()
            .flatten()
            .find(|name| self.contexts.contains_key(*name))
            .or_else(|| {
                self.current_contexts
                    .iter()
                    .find(|name| self.contexts.contains_key(*name))
            })
            .or_else(|| self.contexts.keys().next())
            .cloned()
    }

    fn into_kubeconfig(self, current_context: Option<String>) -> Kubeconfig {
        Kubeconfig {
            api_version: Some("v1".to_string()),
            kind: Some("Config".to_string()),
            clusters: self.clusters.into_values().collect(),
            contexts: self.contexts.into_values().collect(),
            users: self.users.into_values().collect(),
            current_context,
            preferences: Some(Value::Mapping(Mapping::new())),
            extra: Mapping::new(),
        }
    }
}

async fn load_kubeconfig(store: &dyn CredentialStore, path: &Path) -> Result<Kubeconfig> {
    let raw = store.load(path).await?;
    Kubeconfig::from_slice(&raw)
}

/// Current context of an existing output file, so re-syncs keep the operator's choice
async fn previous_current_context(store: &dyn CredentialStore, output: &Path) -> Option<String> {
    if !store.exists(output).await {
        return None;
    }
    match load_kubeconfig(store, output).await {
        Ok(kc) => kc.current_context,
        Err(e) => {
            debug!("Ignoring unreadable existing output {}: {}", output.display(), e);
            None
        }
    }
}

/// Merge `paths` into a single kubeconfig at `output`.
///
/// Unreadable inputs are skipped. Fails without touching `output` when there
/// are no inputs, or when nothing is left after filtering.
#[instrument(skip(store, paths, filter, options), fields(inputs = paths.len(), output = %output.display()))]
pub async fn merge_kubeconfigs(
    store: &dyn CredentialStore,
    paths: &[PathBuf],
    output: &Path,
    filter: &dyn ClusterFilter,
    options: &MergeOptions,
) -> Result<MergeSummary> {
    if paths.is_empty() {
        return Err(CorralError::NothingToMerge);
    }

    let mut acc = Accumulator::default();
    let mut summary = MergeSummary::default();

    for path in paths {
        let kubeconfig = match load_kubeconfig(store, path).await {
            Ok(kc) => kc,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                summary.files_skipped += 1;
                continue;
            }
        };

        let outcome = filter_kubeconfig(kubeconfig, filter);
        summary.contexts_excluded += outcome.excluded;
        summary.contexts_dangling += outcome.dangling;
        if outcome.kubeconfig.contexts.is_empty() && outcome.excluded == 0 {
            warn!("Skipping {}: no usable contexts", path.display());
            summary.files_empty += 1;
            continue;
        }
        acc.absorb(outcome.kubeconfig, path);
        summary.files_merged += 1;
    }

    if acc.clusters.is_empty() {
        return Err(if summary.files_merged > 0 && summary.contexts_excluded > 0 {
            CorralError::AllClustersFiltered {
                excluded: summary.contexts_excluded,
            }
        } else {
            CorralError::NoValidInput {
                skipped: summary.files_skipped,
                empty: summary.files_empty,
            }
        });
    }

    let previous = previous_current_context(store, output).await;
    let current = acc.choose_current_context(&[options.current_context.clone(), previous]);

    summary.clusters = acc.clusters.len();
    summary.users = acc.users.len();
    summary.contexts = acc.contexts.len();
    summary.current_context = current.clone();

    let merged = acc.into_kubeconfig(current);
    debug_assert!(merged.is_consistent());
    store.save(output, &merged.to_vec()?).await?;

    info!(
        "Wrote {} contexts from {} files to {} ({} excluded, {} files skipped)",
        summary.contexts,
        summary.files_merged,
        output.display(),
        summary.contexts_excluded,
        summary.files_skipped
    );

    Ok(summary)
}
