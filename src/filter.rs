// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Exclude filters applied to cluster and context names.

use crate::error::{CorralError, Result};
use regex::Regex;
use tracing::debug;

/// Decides whether a cluster or context should be left out
pub trait ClusterFilter: Send + Sync {
    fn should_exclude(&self, name: &str) -> bool;
}

/// Filter that keeps everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFilter;

impl ClusterFilter for NoopFilter {
    fn should_exclude(&self, _name: &str) -> bool {
        false
    }
}

/// Excludes any name in which one of the patterns finds a match.
///
/// Matching is case-sensitive and unanchored, so `mgmt` excludes
/// `prod-mgmt-a1b2c3d4`; anchor with `^`/`$` to match whole names.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    patterns: Vec<Regex>,
}

impl PatternFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        if patterns.is_empty() {
            return Err(CorralError::EmptyFilter);
        }

        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|source| CorralError::InvalidPattern {
                    pattern: p.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }
}

impl ClusterFilter for PatternFilter {
    fn should_exclude(&self, name: &str) -> bool {
        match self.patterns.iter().find(|re| re.is_match(name)) {
            Some(re) => {
                debug!("Name '{}' excluded by pattern '{}'", name, re.as_str());
                true
            }
            None => false,
        }
    }
}

/// A [`NoopFilter`] for no patterns, a [`PatternFilter`] otherwise
pub fn build_filter<S: AsRef<str>>(patterns: &[S]) -> Result<Box<dyn ClusterFilter>> {
    if patterns.is_empty() {
        Ok(Box::new(NoopFilter))
    } else {
        Ok(Box::new(PatternFilter::new(patterns)?))
    }
}

/// A context is excluded when its own name or the cluster it points at matches
pub fn excludes_context(filter: &dyn ClusterFilter, context: &str, cluster: &str) -> bool {
    filter.should_exclude(context) || filter.should_exclude(cluster)
}
