// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-server renaming of downloaded kubeconfigs.
//!
//! Every server hands out kubeconfigs whose entries are named after the
//! cluster alone, and every server calls its own management cluster `local`.
//! Before files from different servers can be unioned, each entry gets a
//! suffix that is unique per server and stable across runs.

use crate::constants::LOCAL_CLUSTER_NAME;
use crate::error::Result;
use crate::kubeconfig::model::Kubeconfig;
use crate::types::ServerIdentity;
use std::collections::BTreeSet;
use tracing::{debug, instrument};

/// Name an entry gets once it is tagged with its server.
///
/// `local` becomes the server's local name; every other name gets
/// `-<server id>` appended, including names that already end in it.
pub fn renamed(name: &str, server: &ServerIdentity) -> String {
    if name == LOCAL_CLUSTER_NAME {
        return server.local_name();
    }
    format!("{}-{}", name, server.id())
}

/// Rename every cluster, user and context in `kubeconfig` for `server`,
/// rewriting context references and the current context to match.
pub fn rename_entries(kubeconfig: &mut Kubeconfig, server: &ServerIdentity) {
    for cluster in &mut kubeconfig.clusters {
        cluster.name = renamed(&cluster.name, server);
    }
    for user in &mut kubeconfig.users {
        user.name = renamed(&user.name, server);
    }

    let original_contexts: BTreeSet<String> =
        kubeconfig.contexts.iter().map(|c| c.name.clone()).collect();

    for context in &mut kubeconfig.contexts {
        context.name = renamed(&context.name, server);
        context.context.cluster = renamed(&context.context.cluster, server);
        context.context.user = renamed(&context.context.user, server);
    }

    if let Some(current) = kubeconfig.current_context.as_mut() {
        if original_contexts.contains(current.as_str()) {
            *current = renamed(current, server);
        }
    }
}

/// Parse `raw`, tag every entry with `server` and serialize the result.
///
/// Same input and server always give the same bytes back.
#[instrument(skip(raw, server), fields(server = %server, bytes = raw.len()))]
pub fn preprocess(raw: &[u8], server: &ServerIdentity) -> Result<Vec<u8>> {
    let mut kubeconfig = Kubeconfig::from_slice(raw)?;
    rename_entries(&mut kubeconfig, server);
    debug!(
        "Renamed {} clusters, {} users, {} contexts",
        kubeconfig.clusters.len(),
        kubeconfig.users.len(),
        kubeconfig.contexts.len()
    );
    kubeconfig.to_vec()
}
