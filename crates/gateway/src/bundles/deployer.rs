// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The deployer collaborator contract and the shipped implementation.
//!
//! The bridge treats the deployer as an opaque, safe-for-concurrent-use
//! dependency. `BundleDeployer` covers validation, scheduling bookkeeping and
//! the watcher feed; the execution engine that applies a bundle to the
//! backend drives [`BundleDeployer::post_change`].

use serde_json::{json, Value};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::auth::SessionUser;
use crate::bundles::feed::ChangeFeed;
use crate::state::epoch_secs;

pub type Changes = Vec<Value>;

/// Contract consumed by the deployment interceptor.
pub trait Deployer: Send + Sync {
    /// Validate a bundle before scheduling. Empty result means valid; a
    /// message is surfaced verbatim to the client. May suspend.
    fn validate<'a>(
        &'a self,
        user: &'a SessionUser,
        name: &'a str,
        bundle: &'a serde_yaml::Value,
    ) -> BoxFuture<'a, Option<String>>;

    /// Schedule a validated bundle. Synchronous, always succeeds; returns the
    /// assigned deployment id, unique for the process lifetime.
    fn import_bundle(&self, user: &SessionUser, name: &str, bundle: serde_yaml::Value) -> String;

    /// Subscribe to a deployment. `None` if the deployment is unknown.
    fn watch(&self, deployment_id: &str) -> Option<String>;

    /// Wait for unseen changes. `None` only for an invalid watcher id.
    fn next<'a>(&'a self, watcher_id: &'a str) -> BoxFuture<'a, Option<Changes>>;

    /// Snapshot of the last change of every deployment.
    fn status(&self) -> Changes;
}

/// Deployer shipped with the gateway.
pub struct BundleDeployer {
    feed: ChangeFeed,
}

impl BundleDeployer {
    pub fn new() -> Self {
        Self { feed: ChangeFeed::new() }
    }

    /// Append a change document for a deployment. The seam driven by the
    /// execution engine as a deployment progresses.
    pub fn post_change(&self, deployment_id: &str, change: Value) -> bool {
        self.feed.post(deployment_id, change)
    }

    /// Build the standard change document for a deployment status.
    pub fn change_doc(deployment_id: &str, status: &str, queue: Option<usize>) -> Value {
        let mut doc = json!({
            "DeploymentId": deployment_id,
            "Status": status,
            "Time": epoch_secs(),
        });
        if let (Some(queue), Some(map)) = (queue, doc.as_object_mut()) {
            map.insert("Queue".to_owned(), json!(queue));
        }
        doc
    }
}

impl Default for BundleDeployer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deployer for BundleDeployer {
    fn validate<'a>(
        &'a self,
        _user: &'a SessionUser,
        _name: &'a str,
        bundle: &'a serde_yaml::Value,
    ) -> BoxFuture<'a, Option<String>> {
        // Structural validation only; checking the bundle against live
        // backend state belongs to the execution engine.
        async move {
            let Some(bundle) = bundle.as_mapping() else {
                return Some("invalid bundle: not a mapping".to_owned());
            };
            let services = bundle.get("services").and_then(serde_yaml::Value::as_mapping);
            match services {
                Some(services) if !services.is_empty() => None,
                _ => Some("invalid bundle: services not found".to_owned()),
            }
        }
        .boxed()
    }

    fn import_bundle(&self, user: &SessionUser, name: &str, _bundle: serde_yaml::Value) -> String {
        let (deployment_id, queue) = self.feed.create_deployment();
        self.feed.post(&deployment_id, Self::change_doc(&deployment_id, "scheduled", Some(queue)));
        tracing::info!(
            deployment_id = %deployment_id,
            bundle = name,
            user = user.credentials().map(|c| c.username).unwrap_or_default(),
            "bundle deployment scheduled"
        );
        deployment_id
    }

    fn watch(&self, deployment_id: &str) -> Option<String> {
        self.feed.watch(deployment_id)
    }

    fn next<'a>(&'a self, watcher_id: &'a str) -> BoxFuture<'a, Option<Changes>> {
        self.feed.next(watcher_id).boxed()
    }

    fn status(&self) -> Changes {
        self.feed.last_changes()
    }
}
