// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-deployment change log with long-poll watchers.
//!
//! Each deployment accumulates an ordered list of change documents. A watcher
//! subscribes to one deployment and remembers how far it has read; `next`
//! returns the unseen suffix immediately when one exists, otherwise it
//! suspends until a new change is posted. Wakeups ride a single version
//! channel, so a waiting watcher re-checks its own log after every post.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::watch;

struct WatcherEntry {
    deployment_id: String,
    position: usize,
}

#[derive(Default)]
struct FeedInner {
    /// Deployment ids in creation order, for stable status snapshots.
    order: Vec<String>,
    changes: HashMap<String, Vec<Value>>,
    watchers: HashMap<String, WatcherEntry>,
}

/// Change feed shared between the deployer and its watchers.
pub struct ChangeFeed {
    inner: Mutex<FeedInner>,
    version: watch::Sender<u64>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self { inner: Mutex::new(FeedInner::default()), version }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FeedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new deployment. Returns its id and queue position.
    pub fn create_deployment(&self) -> (String, usize) {
        let id = uuid::Uuid::new_v4().to_string();
        let mut inner = self.lock();
        let position = inner.order.len();
        inner.order.push(id.clone());
        inner.changes.insert(id.clone(), Vec::new());
        (id, position)
    }

    /// Append a change to a deployment's log and wake waiting watchers.
    ///
    /// Returns false for an unknown deployment.
    pub fn post(&self, deployment_id: &str, change: Value) -> bool {
        {
            let mut inner = self.lock();
            let Some(log) = inner.changes.get_mut(deployment_id) else {
                return false;
            };
            log.push(change);
        }
        self.version.send_modify(|v| *v += 1);
        true
    }

    /// Create a watcher for a deployment. `None` if the deployment is unknown.
    pub fn watch(&self, deployment_id: &str) -> Option<String> {
        let mut inner = self.lock();
        if !inner.changes.contains_key(deployment_id) {
            return None;
        }
        let watcher_id = uuid::Uuid::new_v4().to_string();
        inner.watchers.insert(
            watcher_id.clone(),
            WatcherEntry { deployment_id: deployment_id.to_owned(), position: 0 },
        );
        Some(watcher_id)
    }

    /// Wait for unseen changes on a watcher's deployment.
    ///
    /// Returns immediately when changes are already buffered past the
    /// watcher's position; otherwise suspends until a post arrives. There is
    /// deliberately no timeout. `None` only for an unknown watcher id. At
    /// most one `next` should be outstanding per watcher; concurrent calls
    /// race for the same suffix.
    pub async fn next(&self, watcher_id: &str) -> Option<Vec<Value>> {
        // Subscribe before the first check so a post landing in between
        // still wakes us.
        let mut version = self.version.subscribe();
        loop {
            {
                let mut inner = self.lock();
                let entry = inner.watchers.get(watcher_id)?;
                let deployment_id = entry.deployment_id.clone();
                let position = entry.position;
                let log = inner.changes.get(&deployment_id)?;
                if log.len() > position {
                    let unseen = log[position..].to_vec();
                    let new_len = log.len();
                    if let Some(entry) = inner.watchers.get_mut(watcher_id) {
                        entry.position = new_len;
                    }
                    return Some(unseen);
                }
            }
            if version.changed().await.is_err() {
                return None;
            }
        }
    }

    /// The most recent change of every deployment, in creation order.
    pub fn last_changes(&self) -> Vec<Value> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.changes.get(id).and_then(|log| log.last()).cloned())
            .collect()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "feed_tests.rs"]
mod feed_tests;
