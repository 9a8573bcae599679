//! Persistent key-value store consumed by every context.
//!
//! The store is the authority for persisted pinned ids; each context keeps
//! its own in-memory copy and writes whole snapshots (last write wins).

use std::collections::BTreeMap;
use std::sync::mpsc::{Receiver, Sender};

use serde_json::{Map, Value};

use crate::error::StoreError;

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Key holding the pinned list (`[{id, title}]` or legacy `[id]`).
pub const PINNED_CHATS_KEY: &str = "pinnedChats";

/// Key holding the popup's title cache (`{id: title}`).
pub const CHAT_TITLES_KEY: &str = "chatTitles";

/// Storage area name reported with every change.
pub const LOCAL_AREA: &str = "local";

pub type StoreMap = Map<String, Value>;

/// Old and new value of one key.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// A set of key changes delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub changes: BTreeMap<String, ValueChange>,
    pub area: &'static str,
}

impl StorageChange {
    pub fn get(&self, key: &str) -> Option<&ValueChange> {
        self.changes.get(key)
    }
}

/// Key-value storage with change notifications.
pub trait Store: Send + Sync {
    /// Read the given keys. Missing keys are absent from the result.
    fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError>;

    /// Write every item in `items`, replacing existing values.
    fn set(&self, items: StoreMap) -> Result<(), StoreError>;

    /// Receive a [`StorageChange`] for every write that changed a value.
    fn subscribe(&self) -> Receiver<StorageChange>;
}

/// Merge `items` into `data`, returning what actually changed.
pub(crate) fn apply_items(data: &mut StoreMap, items: StoreMap) -> BTreeMap<String, ValueChange> {
    let mut changes = BTreeMap::new();
    for (key, new_value) in items {
        let old_value = data.insert(key.clone(), new_value.clone());
        if old_value.as_ref() != Some(&new_value) {
            changes.insert(
                key,
                ValueChange {
                    old_value,
                    new_value: Some(new_value),
                },
            );
        }
    }
    changes
}

/// Differences between two full snapshots.
pub(crate) fn diff_snapshots(old: &StoreMap, new: &StoreMap) -> BTreeMap<String, ValueChange> {
    let mut changes = BTreeMap::new();
    for (key, value) in new {
        if old.get(key) != Some(value) {
            changes.insert(
                key.clone(),
                ValueChange {
                    old_value: old.get(key).cloned(),
                    new_value: Some(value.clone()),
                },
            );
        }
    }
    for (key, value) in old {
        if !new.contains_key(key) {
            changes.insert(
                key.clone(),
                ValueChange {
                    old_value: Some(value.clone()),
                    new_value: None,
                },
            );
        }
    }
    changes
}

/// Deliver a change to every live subscriber, dropping closed ones.
pub(crate) fn broadcast(
    subscribers: &mut Vec<Sender<StorageChange>>,
    changes: BTreeMap<String, ValueChange>,
) {
    if changes.is_empty() {
        return;
    }
    let change = StorageChange {
        changes,
        area: LOCAL_AREA,
    };
    subscribers.retain(|tx| tx.send(change.clone()).is_ok());
}

/// Build a single-key item map.
pub fn item(key: &str, value: Value) -> StoreMap {
    let mut map = StoreMap::new();
    map.insert(key.to_string(), value);
    map
}
