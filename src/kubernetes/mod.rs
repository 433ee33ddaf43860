// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes client creation for merged contexts.

pub mod client;

pub use client::{check_contexts, ContextHealth, ContextStatus};
