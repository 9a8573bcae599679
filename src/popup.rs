//! Popup surface model.
//!
//! The popup keeps its own copy of the pinned list plus a title cache. Titles
//! come from the content script when a host tab answers, from the cache when
//! none does, and fall back to the placeholder otherwise.

use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::TimingConfig;
use crate::error::{PinError, RelayError};
use crate::export::{conversation_url, ExportDocument};
use crate::notice::{NoticeKind, NoticeManager};
use crate::pins::stored::decode_pinned;
use crate::pins::{placeholder_label, ConversationId, PinEntry, PinStateManager, CAPACITY};
use crate::relay::{ContextKind, Hub, Message, Port, RelayClient, TabId, HOST_URL};
use crate::store::{item, StorageChange, Store, CHAT_TITLES_KEY, PINNED_CHATS_KEY};

/// How long brief feedback replaces the status line.
pub const FEEDBACK_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The active tab is on the host.
    Active,
    Inactive,
    /// Storage could not be read or written.
    Error,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Active => "Active",
            Status::Inactive => "Inactive",
            Status::Error => "Error",
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            Status::Active => "status-value status-active",
            Status::Inactive | Status::Error => "status-value status-inactive",
        }
    }
}

/// One pinned conversation as listed in the popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupRow {
    pub id: String,
    pub title: String,
    /// `/c/` plus the first eight characters of the id.
    pub short_url: String,
    pub full_path: String,
}

/// Everything the popup renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupView {
    /// `n/10`
    pub count: String,
    pub rows: Vec<PopupRow>,
    pub show_empty_state: bool,
    pub clear_enabled: bool,
    pub status: Status,
    /// Brief feedback shown in place of the status while it lasts.
    pub feedback: Option<String>,
}

pub struct Popup {
    pins: PinStateManager,
    store: Arc<dyn Store>,
    changes: Receiver<StorageChange>,
    relay: RelayClient,
    hub: Hub,
    port: Port,
    titles: BTreeMap<String, String>,
    feedback: NoticeManager,
    failed: bool,
}

impl Popup {
    /// Open the popup: load pins and cached titles, then ask a host tab for
    /// fresh titles.
    pub fn open(hub: &Hub, store: Arc<dyn Store>, timing: &TimingConfig) -> Self {
        let changes = store.subscribe();
        let mut popup = Self {
            pins: PinStateManager::load(Arc::clone(&store)),
            store,
            changes,
            relay: RelayClient::new(hub.clone(), HOST_URL, timing.relay_timeout_ms),
            hub: hub.clone(),
            port: hub.connect_runtime(ContextKind::Popup),
            titles: BTreeMap::new(),
            feedback: NoticeManager::new(),
            failed: false,
        };
        popup.load_cached_titles();
        popup.load_titles();
        popup
    }

    pub fn pins(&self) -> &PinStateManager {
        &self.pins
    }

    fn load_cached_titles(&mut self) {
        match self.store.get(&[CHAT_TITLES_KEY]) {
            Ok(stored) => {
                self.titles = stored
                    .get(CHAT_TITLES_KEY)
                    .and_then(Value::as_object)
                    .map(|map| {
                        map.iter()
                            .filter_map(|(id, title)| {
                                title.as_str().map(|t| (id.clone(), t.to_string()))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                tracing::debug!("Loaded {} cached titles", self.titles.len());
            }
            Err(e) => {
                tracing::error!("Error loading chat titles: {}", e);
                self.failed = true;
            }
        }
    }

    fn save_titles(&self) {
        let map = self
            .titles
            .iter()
            .map(|(id, title)| (id.clone(), Value::String(title.clone())))
            .collect();
        if let Err(e) = self.store.set(item(CHAT_TITLES_KEY, Value::Object(map))) {
            tracing::error!("Error saving chat titles: {}", e);
        }
    }

    /// Ask the content script for every title. When it cannot answer, ask
    /// for missing titles one at a time.
    pub fn load_titles(&mut self) {
        match self.relay.get_all_chat_titles() {
            Ok(titles) => {
                tracing::debug!("Received {} chat titles", titles.len());
                self.titles.extend(titles);
                self.save_titles();
            }
            Err(e) => {
                let err = PinError::PeerUnavailable(e);
                tracing::debug!("Using cached titles only: {}", err);
                if self.load_individual_titles() {
                    self.save_titles();
                }
            }
        }
    }

    /// Returns whether any title was learned.
    fn load_individual_titles(&mut self) -> bool {
        let missing: Vec<ConversationId> = self
            .pins
            .ids()
            .into_iter()
            .filter(|id| !self.titles.contains_key(id.as_str()))
            .collect();

        let mut learned = false;
        for id in missing {
            match self.relay.get_chat_title(id.as_str()) {
                Ok(title) => {
                    self.titles.insert(id.to_string(), title);
                    learned = true;
                }
                Err(RelayError::UnexpectedResponse(action)) => {
                    tracing::debug!("No title for {} ({})", id, action);
                }
                // The same peer will not answer the next request either.
                Err(e) => {
                    tracing::debug!("Title requests unavailable: {}", e);
                    break;
                }
            }
        }
        learned
    }

    /// Fresh title, else the label stored with the pin, else the placeholder.
    pub fn title(&self, id: &ConversationId) -> String {
        self.titles
            .get(id.as_str())
            .cloned()
            .or_else(|| self.pins.label(id).map(str::to_string))
            .unwrap_or_else(|| placeholder_label(id))
    }

    pub fn status(&self) -> Status {
        if self.failed {
            return Status::Error;
        }
        match self.hub.active_tab() {
            Some(tab) if is_host_url(&tab.url) => Status::Active,
            _ => Status::Inactive,
        }
    }

    pub fn view(&self) -> PopupView {
        let rows: Vec<PopupRow> = self
            .pins
            .entries()
            .iter()
            .map(|entry| PopupRow {
                id: entry.id.to_string(),
                title: self.title(&entry.id),
                short_url: format!("/c/{}", entry.id.short()),
                full_path: entry.id.path(),
            })
            .collect();
        PopupView {
            count: format!("{}/{}", rows.len(), CAPACITY),
            show_empty_state: rows.is_empty(),
            clear_enabled: !rows.is_empty(),
            rows,
            status: self.status(),
            feedback: self.feedback.visible().last().map(|n| n.message.clone()),
        }
    }

    fn note_persist_failure(&mut self) {
        if let Some(e) = self.pins.take_persist_failure() {
            tracing::warn!("Failed to save changes: {}", e);
            self.failed = true;
        }
    }

    /// Unpin `id`, persist, then tell host tabs. Returns whether it was
    /// pinned.
    pub fn unpin(&mut self, id: &str, now: u64) -> bool {
        let Some(id) = ConversationId::parse(id) else {
            return false;
        };
        if !self.pins.remove(&id) {
            return false;
        }
        self.note_persist_failure();
        self.relay.notify_unpinned(id.as_str());
        self.feedback
            .push_for("Chat unpinned", NoticeKind::Info, now, FEEDBACK_MS);
        true
    }

    /// Unpin everything, persist, then tell host tabs. Confirmation is the
    /// caller's business.
    pub fn clear_all(&mut self) -> usize {
        let count = self.pins.clear();
        self.note_persist_failure();
        self.relay.notify_all_unpinned();
        count
    }

    /// Replace the pinned ids with `ids`, keeping known labels.
    fn apply_ids(&mut self, ids: &[String]) -> bool {
        let entries = ids
            .iter()
            .filter_map(|raw| ConversationId::parse(raw))
            .map(|id| match self.pins.label(&id) {
                Some(label) => PinEntry::new(id.clone(), label),
                None => PinEntry::placeholder(id),
            })
            .collect();
        self.pins.adopt(entries)
    }

    /// Process notifications and storage changes that arrived since the last
    /// call. Returns whether the pinned list changed.
    pub fn poll(&mut self, now: u64) -> bool {
        self.feedback.update(now);

        let mut changed = false;
        let newest = self
            .changes
            .try_iter()
            .filter_map(|change| change.get(PINNED_CHATS_KEY).cloned())
            .last();
        if let Some(change) = newest {
            let decoded = decode_pinned(change.new_value.as_ref());
            changed |= self.pins.adopt(decoded.entries);
        }

        for envelope in self.port.drain() {
            match &envelope.message {
                Message::PinnedChatsUpdated { pinned_chats } => {
                    tracing::debug!("Popup received pinned chats update");
                    changed |= self.apply_ids(pinned_chats);
                }
                other => tracing::debug!("Popup ignoring {}", other.action()),
            }
        }

        if changed {
            self.load_titles();
        }
        changed
    }

    /// Reload everything from the store and the content script.
    pub fn refresh(&mut self) {
        self.failed = false;
        match self.store.get(&[PINNED_CHATS_KEY]) {
            Ok(stored) => {
                self.pins
                    .adopt(decode_pinned(stored.get(PINNED_CHATS_KEY)).entries);
            }
            Err(e) => {
                tracing::error!("Error loading pinned chats: {}", e);
                self.failed = true;
            }
        }
        self.load_cached_titles();
        self.load_titles();
    }

    /// Show a conversation: reuse the active tab when it is on the host,
    /// otherwise open a new one.
    pub fn open_chat(&self, id: &ConversationId) -> TabId {
        let url = conversation_url(id);
        match self.hub.active_tab() {
            Some(tab) if is_host_url(&tab.url) && self.hub.update_tab(tab.id, &url) => tab.id,
            _ => self.hub.create_tab(&url),
        }
    }

    pub fn open_host(&self) -> TabId {
        self.hub.create_tab(HOST_URL)
    }

    pub fn export(&self, exported_at: DateTime<Utc>) -> ExportDocument {
        ExportDocument::new(
            self.pins.entries().iter().map(|e| (&e.id, self.title(&e.id))),
            exported_at,
        )
    }
}

fn is_host_url(url: &str) -> bool {
    url.starts_with(HOST_URL) || url == HOST_URL.trim_end_matches('/')
}
