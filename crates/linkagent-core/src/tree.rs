//! Export tree mirroring agent state and configuration
//!
//! The tree is a flat map of hierarchical paths such as
//! `state/link[port=3]/egress-port` to typed values. Writers publish a
//! [`Notification`] per mutation; subscribers receive them over a broadcast
//! channel. The tree is a mirror: registries and tunables stay authoritative,
//! and writes to the `config/` subtree are turned back into tunable changes
//! through [`Configurable::update_config`].

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::broadcast;

/// Prefix of the only subtree that accepts external writes
pub const CONFIG_PREFIX: &str = "config/";

const NOTIFICATION_CAPACITY: usize = 256;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TreeError {
    #[error("Path is read-only: {0}")]
    ReadOnlyPath(String),
}

/// A typed leaf value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    Int(i64),
    Uint(u64),
    String(String),
}

impl TypedValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A path/value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub path: String,
    pub value: TypedValue,
}

impl Update {
    pub fn new(path: impl Into<String>, value: TypedValue) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// A change pushed to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Unix time in nanoseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<Update>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deletes: Vec<String>,
}

impl Notification {
    pub fn updates(updates: Vec<Update>) -> Self {
        Self {
            timestamp: now_nanos(),
            updates,
            deletes: Vec::new(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            timestamp: now_nanos(),
            updates: Vec::new(),
            deletes: vec![path.into()],
        }
    }
}

pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Hierarchical key/value mirror with notification fan-out
#[derive(Debug)]
pub struct ExportTree {
    values: RwLock<BTreeMap<String, TypedValue>>,
    tx: broadcast::Sender<Notification>,
}

impl Default for ExportTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportTree {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            values: RwLock::new(BTreeMap::new()),
            tx,
        }
    }

    /// Set a leaf value, creating the path if needed
    pub fn add_path(&self, path: &str, value: TypedValue) {
        self.values.write().insert(path.to_string(), value);
    }

    pub fn get_path(&self, path: &str) -> Option<TypedValue> {
        self.values.read().get(path).cloned()
    }

    pub fn get_int(&self, path: &str) -> Option<i64> {
        self.get_path(path).and_then(|v| v.as_int())
    }

    /// Delete a path and everything below it, returning the number of leaves removed
    pub fn delete_path(&self, path: &str) -> usize {
        let mut values = self.values.write();
        let child_prefix = format!("{}/", path);
        let before = values.len();
        values.retain(|key, _| key != path && !key.starts_with(&child_prefix));
        before - values.len()
    }

    /// All leaves whose path starts with `prefix`, in path order
    pub fn snapshot(&self, prefix: &str) -> Vec<Update> {
        self.values
            .read()
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, value)| Update::new(path.clone(), value.clone()))
            .collect()
    }

    /// Push a notification to all subscribers
    pub fn publish(&self, notification: Notification) {
        // No subscribers is fine
        let _ = self.tx.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

/// Something that mirrors its state into an export tree
pub trait Exportable: Send + Sync {
    fn tree(&self) -> &ExportTree;
}

/// Something whose configuration lives in the `config/` subtree
pub trait Configurable: Send + Sync {
    /// Called after the `config/` subtree was written to
    fn update_config(&self);
    /// Refresh the tree from any external source of truth
    fn refresh_config(&self);
}

/// Write configuration values into the target's tree and apply them
///
/// Only paths under `config/` are writable; nothing is written if any path
/// falls outside it.
pub fn apply_config_set<T>(target: &T, updates: Vec<Update>) -> Result<(), TreeError>
where
    T: Configurable + Exportable + ?Sized,
{
    if let Some(bad) = updates.iter().find(|u| !u.path.starts_with(CONFIG_PREFIX)) {
        return Err(TreeError::ReadOnlyPath(bad.path.clone()));
    }

    let tree = target.tree();
    for update in &updates {
        tree.add_path(&update.path, update.value.clone());
    }
    tree.publish(Notification::updates(updates));
    target.update_config();
    Ok(())
}
