// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubeconfig model, per-server renaming and the merge engine.

pub mod merge;
pub mod model;
pub mod preprocess;

pub use merge::{filter_kubeconfig, merge_kubeconfigs, MergeOptions, MergeSummary};
pub use model::Kubeconfig;
pub use preprocess::{preprocess, renamed};
