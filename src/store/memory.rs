//! In-memory store shared between contexts of one process.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{apply_items, broadcast, StorageChange, Store, StoreMap};
use crate::error::StoreError;

#[derive(Default)]
struct MemoryInner {
    data: StoreMap,
    writes: usize,
    fail_writes: bool,
    subscribers: Vec<Sender<StorageChange>>,
}

/// Cloneable handle to one shared storage area.
///
/// Clones see the same data, so a content script and a popup built from
/// clones of one `MemoryStore` behave like two contexts of one extension.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `data`, without counting a write.
    pub fn with_data(data: StoreMap) -> Self {
        let store = Self::new();
        store.lock().data = data;
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful `set` calls so far.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    /// Make subsequent writes fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Current raw value of `key`.
    pub fn raw(&self, key: &str) -> Option<serde_json::Value> {
        self.lock().data.get(key).cloned()
    }
}

impl Store for MemoryStore {
    fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError> {
        let inner = self.lock();
        Ok(keys
            .iter()
            .filter_map(|key| inner.data.get(*key).map(|v| ((*key).to_string(), v.clone())))
            .collect())
    }

    fn set(&self, items: StoreMap) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        let changes = apply_items(&mut inner.data, items);
        inner.writes += 1;
        broadcast(&mut inner.subscribers, changes);
        Ok(())
    }

    fn subscribe(&self) -> Receiver<StorageChange> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::item;
    use serde_json::json;

    #[test]
    fn clones_share_data_and_write_count() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set(item("k", json!("v"))).unwrap();

        assert_eq!(other.get(&["k", "missing"]).unwrap(), item("k", json!("v")));
        assert_eq!(other.writes(), 1);
    }

    #[test]
    fn failing_writes_leave_data_untouched() {
        let store = MemoryStore::with_data(item("k", json!(1)));
        store.set_fail_writes(true);

        assert!(store.set(item("k", json!(2))).is_err());
        assert_eq!(store.raw("k"), Some(json!(1)));
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn subscribers_see_changes_but_not_identical_rewrites() {
        let store = MemoryStore::new();
        let rx = store.subscribe();

        store.set(item("k", json!(1))).unwrap();
        store.set(item("k", json!(1))).unwrap();

        let change = rx.try_recv().unwrap();
        assert_eq!(change.get("k").unwrap().new_value, Some(json!(1)));
        assert!(rx.try_recv().is_err());
    }
}
