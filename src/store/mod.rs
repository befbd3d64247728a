//! # Shared instance data store.
//!
//! Per-`(path, node)` tables of [`InstanceStatus`], [`InstanceMonitor`] and
//! [`InstanceConfig`], each behind one coarse [`RwLock`]. Monitors read peer
//! rows from here and write their own row before publishing it on the bus.
//!
//! ## Contract
//! - `get`/`set`/`unset` per `(path, node)`; last `set` wins per key.
//! - `get_by_path`, `get_by_node`, `get_all` return owned snapshots.
//! - No ordering guarantee across keys.
//!
//! ```rust
//! use imon::{InstanceStatus, ObjectPath, Store};
//!
//! let store = Store::new();
//! let web = ObjectPath::svc("web");
//! store.status.set(&web, "n1", InstanceStatus::default());
//! assert!(store.status.get(&web, "n1").is_some());
//! assert_eq!(store.status.get_by_path(&web).len(), 1);
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::model::{InstanceConfig, InstanceMonitor, InstanceStatus, ObjectPath};

/// One table keyed by `(path, node)`.
#[derive(Debug)]
pub struct Table<T> {
    rows: RwLock<BTreeMap<(ObjectPath, String), Arc<T>>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T> Table<T> {
    pub fn get(&self, path: &ObjectPath, node: &str) -> Option<Arc<T>> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(path.clone(), node.to_string()))
            .cloned()
    }

    pub fn set(&self, path: &ObjectPath, node: &str, value: T) {
        self.set_arc(path, node, Arc::new(value));
    }

    pub fn set_arc(&self, path: &ObjectPath, node: &str, value: Arc<T>) {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((path.clone(), node.to_string()), value);
    }

    /// Removes the row, returning it if present.
    pub fn unset(&self, path: &ObjectPath, node: &str) -> Option<Arc<T>> {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(path.clone(), node.to_string()))
    }

    /// All rows of one object, keyed by node.
    pub fn get_by_path(&self, path: &ObjectPath) -> BTreeMap<String, Arc<T>> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((p, _), _)| p == path)
            .map(|((_, n), v)| (n.clone(), Arc::clone(v)))
            .collect()
    }

    /// All rows of one node, keyed by object path.
    pub fn get_by_node(&self, node: &str) -> BTreeMap<ObjectPath, Arc<T>> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((_, n), _)| n == node)
            .map(|((p, _), v)| (p.clone(), Arc::clone(v)))
            .collect()
    }

    pub fn get_all(&self) -> Vec<(ObjectPath, String, Arc<T>)> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|((p, n), v)| (p.clone(), n.clone(), Arc::clone(v)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The three instance tables shared by all monitors of a daemon.
#[derive(Debug, Default)]
pub struct Store {
    pub status: Table<InstanceStatus>,
    pub monitor: Table<InstanceMonitor>,
    pub config: Table<InstanceConfig>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }
}
