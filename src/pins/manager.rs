//! Pin state manager: the in-memory pinned set of one context.

use std::collections::HashSet;
use std::sync::Arc;

use super::stored::{decode_pinned, encode_pinned};
use super::{ConversationId, PinEntry, CAPACITY};
use crate::error::{PinError, StoreError};
use crate::store::{item, Store, PINNED_CHATS_KEY};

/// Owns the pinned set of one context and persists every mutation.
///
/// Mutations apply to memory first and then write the whole snapshot. A
/// failed write does not roll back; it is kept until the caller collects it
/// with [`PinStateManager::take_persist_failure`] and tells the user.
pub struct PinStateManager {
    entries: Vec<PinEntry>,
    store: Arc<dyn Store>,
    persist_failure: Option<StoreError>,
}

impl PinStateManager {
    /// Load the pinned set from `store`.
    ///
    /// Both stored shapes are accepted. Lists longer than [`CAPACITY`] keep
    /// their oldest entries and the trimmed list is written back once.
    pub fn load(store: Arc<dyn Store>) -> Self {
        let mut manager = Self {
            entries: Vec::new(),
            store,
            persist_failure: None,
        };

        let stored = match manager.store.get(&[PINNED_CHATS_KEY]) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!("Error loading pinned chats: {}", e);
                return manager;
            }
        };

        let decoded = decode_pinned(stored.get(PINNED_CHATS_KEY));
        for skipped in &decoded.skipped {
            tracing::warn!("Skipping stored pin: {}", skipped);
        }
        manager.entries = decoded.entries;

        if manager.entries.len() > CAPACITY {
            tracing::info!(
                "Found {} pinned chats, trimming to {} limit",
                manager.entries.len(),
                CAPACITY
            );
            manager.entries.truncate(CAPACITY);
            manager.save();
            if let Some(e) = &manager.persist_failure {
                tracing::warn!("Could not save trimmed pins immediately: {}", e);
            }
        }

        tracing::debug!("Loaded {} pinned chats", manager.entries.len());
        manager
    }

    /// Write the current snapshot, remembering a failure for the caller.
    fn save(&mut self) {
        let value = encode_pinned(&self.entries);
        match self.store.set(item(PINNED_CHATS_KEY, value)) {
            Ok(()) => self.persist_failure = None,
            Err(e) => {
                tracing::error!("Error saving pinned chats: {}", e);
                self.persist_failure = Some(e);
            }
        }
    }

    /// Take the failure of the most recent write, if it failed.
    pub fn take_persist_failure(&mut self) -> Option<StoreError> {
        self.persist_failure.take()
    }

    /// Pin `id` with `label`.
    ///
    /// Pinning an already pinned id is a no-op. Fails with
    /// [`PinError::CapacityExceeded`] when the set is full, leaving it
    /// unchanged.
    pub fn add(&mut self, id: ConversationId, label: impl Into<String>) -> Result<(), PinError> {
        if self.has(&id) {
            return Ok(());
        }
        if self.entries.len() >= CAPACITY {
            return Err(PinError::CapacityExceeded { capacity: CAPACITY });
        }
        tracing::info!("Pinned chat {}", id);
        self.entries.push(PinEntry::new(id, label));
        self.save();
        Ok(())
    }

    /// Unpin `id`. Returns whether it was pinned; absent ids change nothing.
    pub fn remove(&mut self, id: &ConversationId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.id != id);
        let removed = self.entries.len() != before;
        if removed {
            tracing::info!("Unpinned chat {}", id);
            self.save();
        }
        removed
    }

    /// Unpin everything. Returns how many pins were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.save();
        count
    }

    pub fn has(&self, id: &ConversationId) -> bool {
        self.entries.iter().any(|e| &e.id == id)
    }

    /// Replace the cached label of a pinned id. Returns whether it changed.
    pub fn set_label(&mut self, id: &ConversationId, label: &str) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| &e.id == id) else {
            return false;
        };
        if entry.label == label {
            return false;
        }
        entry.label = label.to_string();
        self.save();
        true
    }

    /// Drop every pinned id missing from `visible` and return them in
    /// pinned order.
    pub fn reconcile_against_visible(
        &mut self,
        visible: &HashSet<ConversationId>,
    ) -> Vec<ConversationId> {
        let (kept, gone): (Vec<PinEntry>, Vec<PinEntry>) = self
            .entries
            .drain(..)
            .partition(|e| visible.contains(&e.id));
        self.entries = kept;

        let removed: Vec<ConversationId> = gone.into_iter().map(|e| e.id).collect();
        if !removed.is_empty() {
            for id in &removed {
                tracing::info!("Auto-removed deleted chat from pins: {}", id);
            }
            self.save();
        }
        removed
    }

    /// Take over a pinned list written by another context, without writing
    /// it back. Returns whether the in-memory set changed.
    pub fn adopt(&mut self, mut entries: Vec<PinEntry>) -> bool {
        entries.truncate(CAPACITY);
        if entries == self.entries {
            return false;
        }
        tracing::debug!("Adopting {} pinned chats from storage", entries.len());
        self.entries = entries;
        true
    }

    pub fn entries(&self) -> &[PinEntry] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<ConversationId> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn label(&self, id: &ConversationId) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| &e.id == id)
            .map(|e| e.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= CAPACITY
    }
}
