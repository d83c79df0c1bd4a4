//! Live view of the user collection.
//!
//! `LiveUsers` owns one background task that applies `UserChange`s to a
//! local copy of the collection and republishes a full `Snapshot` after
//! each one. Dashboards hold a `Subscription`; dropping `LiveUsers` stops
//! the task and every subscription then yields `None`.

use crate::demo;
use crate::store::UserStore;
use crate::types::User;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// One change to the collection, also the push message sent to dashboards.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum UserChange {
    #[serde(rename = "user_upserted")]
    Upserted { user: User },
    #[serde(rename = "user_removed")]
    Removed { id: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    Live,
    /// The store was empty or unreachable; `users` is the demo dataset.
    Fallback,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Snapshot {
    pub users: Vec<User>,
    pub source: SnapshotSource,
}

impl Snapshot {
    fn from_records(records: &BTreeMap<String, User>) -> Self {
        if records.is_empty() {
            return Self {
                users: demo::demo_users(),
                source: SnapshotSource::Fallback,
            };
        }
        Self {
            users: records.values().cloned().collect(),
            source: SnapshotSource::Live,
        }
    }
}

pub struct LiveUsers {
    snapshots: watch::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl LiveUsers {
    /// Load the initial snapshot and start following `changes`.
    ///
    /// Subscribe to `changes` before calling this so no write made during
    /// the initial load is missed; replays are harmless since every change
    /// is an idempotent upsert or removal.
    pub async fn start(
        store: Arc<dyn UserStore>,
        mut changes: broadcast::Receiver<UserChange>,
    ) -> Self {
        let mut records = load(store.as_ref()).await;
        let (tx, snapshots) = watch::channel(Snapshot::from_records(&records));

        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => apply(&mut records, change),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Live user feed lagged by {} changes, reloading", skipped);
                        records = load(store.as_ref()).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Live user feed closed");
                        break;
                    }
                }
                tx.send_replace(Snapshot::from_records(&records));
            }
        });

        Self { snapshots, task }
    }

    pub fn subscribe(&self) -> Subscription {
        let mut snapshots = self.snapshots.clone();
        snapshots.mark_unchanged();
        Subscription { snapshots }
    }

    pub fn current(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Stop following the store. Equivalent to dropping.
    pub fn close(self) {}
}

impl Drop for LiveUsers {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct Subscription {
    snapshots: watch::Receiver<Snapshot>,
}

impl Subscription {
    pub fn current(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait for the next snapshot. `None` once the feed has shut down.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.snapshots.changed().await.ok()?;
        Some(self.snapshots.borrow_and_update().clone())
    }
}

async fn load(store: &dyn UserStore) -> BTreeMap<String, User> {
    match store.list_users().await {
        Ok(users) => users.into_iter().map(|u| (u.id.clone(), u)).collect(),
        Err(e) => {
            tracing::warn!("Failed to load users, showing demo data: {}", e);
            BTreeMap::new()
        }
    }
}

fn apply(records: &mut BTreeMap<String, User>, change: UserChange) {
    match change {
        UserChange::Upserted { user } => {
            records.insert(user.id.clone(), user);
        }
        UserChange::Removed { id } => {
            records.remove(&id);
        }
    }
}
