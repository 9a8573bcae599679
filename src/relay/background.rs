//! Background coordinator.
//!
//! Owns no state of its own: every answer comes from the store, so a
//! restarted coordinator picks up exactly where the previous one stopped.

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use super::hub::{ContextKind, Hub, Port};
use super::protocol::{Message, Response};
use crate::error::StoreError;
use crate::pins::stored::decode_pinned;
use crate::store::{item, StorageChange, Store, LOCAL_AREA, PINNED_CHATS_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallReason {
    Install,
    Update,
}

pub struct Background {
    store: Arc<dyn Store>,
    port: Port,
    changes: Receiver<StorageChange>,
}

impl Background {
    /// Register with `hub` and start listening to `store`.
    pub fn start(hub: &Hub, store: Arc<dyn Store>) -> Self {
        let changes = store.subscribe();
        Self {
            port: hub.connect_runtime(ContextKind::Background),
            store,
            changes,
        }
    }

    /// Lifecycle hook. A fresh install gets an empty pinned list unless one
    /// is already stored.
    pub fn on_installed(&self, reason: InstallReason, version: &str) -> Result<(), StoreError> {
        tracing::info!("Extension installed/updated: {:?}", reason);
        match reason {
            InstallReason::Install => {
                let stored = self.store.get(&[PINNED_CHATS_KEY])?;
                if stored.get(PINNED_CHATS_KEY).map_or(true, |v| v.is_null()) {
                    self.store
                        .set(item(PINNED_CHATS_KEY, serde_json::Value::Array(Vec::new())))?;
                    tracing::info!("Initialized empty pinned chats storage");
                }
            }
            InstallReason::Update => {
                tracing::info!("Extension updated to version {}", version);
            }
        }
        Ok(())
    }

    /// Toolbar action: nothing to do on a host tab, otherwise open one.
    pub fn on_action_clicked(&self, hub: &Hub, host_url: &str) {
        match hub.active_tab() {
            Some(tab) if tab.url.starts_with(host_url) => {
                tracing::info!("Extension is active on tab {}", tab.id);
            }
            _ => {
                hub.create_tab(host_url);
            }
        }
    }

    /// Answer one message. `None` for messages meant for other contexts.
    pub fn handle(&self, message: &Message) -> Option<Response> {
        match message {
            Message::GetPinnedChats => {
                let stored = match self.store.get(&[PINNED_CHATS_KEY]) {
                    Ok(stored) => stored,
                    Err(e) => {
                        tracing::error!("Error reading pinned chats: {}", e);
                        return Some(Response::Error {
                            error: e.to_string(),
                        });
                    }
                };
                let decoded = decode_pinned(stored.get(PINNED_CHATS_KEY));
                Some(Response::PinnedChats {
                    pinned_chats: decoded.entries.into_iter().map(|e| e.id.to_string()).collect(),
                })
            }
            Message::SavePinnedChats { pinned_chats } => {
                let success = match self.store.set(item(PINNED_CHATS_KEY, pinned_chats.clone())) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!("Error saving pinned chats: {}", e);
                        false
                    }
                };
                Some(Response::Success { success })
            }
            Message::LogError { error } => {
                tracing::error!("Content script error: {}", error);
                Some(Response::Logged { logged: true })
            }
            _ => None,
        }
    }

    /// Serve every queued message and log pending storage changes. Returns
    /// the number of messages answered.
    pub fn serve_pending(&self) -> usize {
        for change in self.changes.try_iter() {
            if change.area != LOCAL_AREA {
                continue;
            }
            if let Some(pinned) = change.get(PINNED_CHATS_KEY) {
                tracing::info!("Pinned chats updated: {:?}", pinned.new_value);
            }
        }

        let mut answered = 0;
        for envelope in self.port.drain() {
            if let Some(response) = self.handle(&envelope.message) {
                envelope.respond(response);
                answered += 1;
            }
        }
        answered
    }
}
