//! Reconciliation engine.
//!
//! Rebuilds everything the extension shows in the host page from the pinned
//! set and the currently rendered host list. Nothing here caches host nodes
//! between calls; every pass re-queries the page.

pub mod navigate;
pub mod section;
pub mod toggles;

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::TimingConfig;
use crate::dom::markup;
use crate::dom::{Owner, Page};
use crate::error::PinError;
use crate::label::extract_label;
use crate::notice::{NoticeKind, NoticeManager};
use crate::pins::{placeholder_label, ConversationId, PinEntry, PinStateManager};
use crate::relay::protocol::{Message, Response};
use crate::view::ExternalView;
use crate::watcher::Trigger;

pub use navigate::{MirrorNavigation, PendingNavigation};

pub const PIN_LIMIT_MESSAGE: &str = "Pin limit reached (10 max). Unpin some chats first.";
pub const PIN_LIMIT_NOTICE_MS: u64 = 4000;
pub const SAVE_FAILED_MESSAGE: &str = "Could not save changes. Please try again.";
pub const SAVE_FAILED_NOTICE_MS: u64 = 3000;

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Pins evicted because their conversation is gone, in pinned order.
    pub removed: Vec<ConversationId>,
    pub toggles_added: usize,
    pub mirrors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Pinned,
    Unpinned,
    /// The pinned set is full; nothing changed.
    Refused,
}

/// Per-tab engine. Owns the pinned set of its context.
pub struct ReconciliationEngine {
    pins: PinStateManager,
    timing: TimingConfig,
    notices: NoticeManager,
    /// Consecutive deletion checks each pinned id has been missing for.
    missing: HashMap<ConversationId, u32>,
}

impl ReconciliationEngine {
    pub fn new(pins: PinStateManager, timing: TimingConfig) -> Self {
        Self {
            pins,
            timing,
            notices: NoticeManager::new(),
            missing: HashMap::new(),
        }
    }

    pub fn pins(&self) -> &PinStateManager {
        &self.pins
    }

    pub fn notices(&self) -> &NoticeManager {
        &self.notices
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Run one pass: deletion check and toggle injection as `trigger` asks,
    /// then rebuild the pinned section, suppress duplicates and mark the
    /// active mirror.
    pub fn reconcile(&mut self, page: &mut Page, trigger: Trigger, now: u64) -> PassReport {
        let mut report = PassReport::default();

        if trigger.check_deletions {
            report.removed = self.check_deletions(&*page);
            if !report.removed.is_empty() {
                tracing::info!(
                    "Removed {} deleted chats from pinned list",
                    report.removed.len()
                );
            }
        }
        if trigger.check_additions {
            report.toggles_added = toggles::inject(&mut page.document, &self.pins);
        }

        self.update_labels(page);
        report.mirrors = self.render(page);
        self.surface_persist_failure(now);
        self.render_notices(page);

        tracing::debug!(
            "Reconciled: {} toggles added, {} mirrors, {} removed",
            report.toggles_added,
            report.mirrors,
            report.removed.len()
        );
        report
    }

    /// Evict pins whose conversation is no longer listed by `view`.
    ///
    /// An id is evicted once it has been missing for `deletion_grace_passes`
    /// consecutive checks. An empty listing never evicts.
    pub fn check_deletions<V: ExternalView>(&mut self, view: &V) -> Vec<ConversationId> {
        let visible: HashSet<ConversationId> = view
            .list_visible_conversations()
            .into_iter()
            .map(|c| c.id)
            .collect();
        if visible.is_empty() {
            tracing::debug!("No conversations listed, skipping deletion check");
            return Vec::new();
        }

        self.forget_unpinned();
        let grace = self.timing.deletion_grace_passes.max(1);
        let mut keep = visible.clone();
        for id in self.pins.ids() {
            if visible.contains(&id) {
                self.missing.remove(&id);
                continue;
            }
            let passes = self.missing.entry(id.clone()).or_insert(0);
            *passes += 1;
            if *passes < grace {
                tracing::debug!("Pinned chat {} missing ({}/{})", id, passes, grace);
                keep.insert(id);
            }
        }

        let removed = self.pins.reconcile_against_visible(&keep);
        for id in &removed {
            self.missing.remove(id);
        }
        removed
    }

    /// Drop miss counts for ids that are no longer pinned, so a later
    /// re-pin starts its grace period from zero.
    fn forget_unpinned(&mut self) {
        let pins = &self.pins;
        self.missing.retain(|id, _| pins.has(id));
    }

    /// Replace placeholder labels with scraped titles where the host now
    /// renders one.
    fn update_labels(&mut self, page: &Page) {
        let found: Vec<(ConversationId, String)> = self
            .pins
            .entries()
            .iter()
            .filter(|e| e.has_placeholder_label())
            .filter_map(|e| {
                let node = page.find_conversation_by_id(&e.id)?;
                extract_label(&page.document, node).map(|label| (e.id.clone(), label))
            })
            .collect();
        for (id, label) in found {
            self.pins.set_label(&id, &label);
        }
    }

    /// Bring the injected UI in line with the pinned set. Returns the number
    /// of mirrors.
    fn render(&self, page: &mut Page) -> usize {
        let mirrors = section::rebuild(page, &self.pins);
        toggles::refresh(&mut page.document, &self.pins);
        section::suppress(page, &self.pins);
        section::mark_active(page);
        mirrors
    }

    /// Re-mark the active mirror after a location change.
    pub fn mark_active(&self, page: &mut Page) {
        section::mark_active(page);
    }

    /// Flip the pinned state of `id` in response to a toggle click.
    pub fn toggle_pin(&mut self, page: &mut Page, id: &ConversationId, now: u64) -> ToggleOutcome {
        let outcome = if self.pins.has(id) {
            self.pins.remove(id);
            ToggleOutcome::Unpinned
        } else {
            let label = page
                .find_conversation_by_id(id)
                .and_then(|node| extract_label(&page.document, node))
                .unwrap_or_else(|| placeholder_label(id));
            match self.pins.add(id.clone(), label) {
                Ok(()) => ToggleOutcome::Pinned,
                Err(PinError::CapacityExceeded { capacity }) => {
                    tracing::warn!("Pin limit reached: cannot pin more than {} chats", capacity);
                    self.notices.push_for(
                        PIN_LIMIT_MESSAGE,
                        NoticeKind::Error,
                        now,
                        PIN_LIMIT_NOTICE_MS,
                    );
                    ToggleOutcome::Refused
                }
                Err(e) => {
                    tracing::warn!("Could not pin {}: {}", id, e);
                    ToggleOutcome::Refused
                }
            }
        };

        self.forget_unpinned();
        self.surface_persist_failure(now);
        self.render(page);
        self.render_notices(page);
        outcome
    }

    /// Take over a pinned list another context wrote. Returns whether
    /// anything changed.
    pub fn adopt(&mut self, page: &mut Page, entries: Vec<PinEntry>) -> bool {
        if !self.pins.adopt(entries) {
            return false;
        }
        self.forget_unpinned();
        self.render(page);
        true
    }

    /// Answer a request from another context.
    pub fn handle_message(&mut self, page: &mut Page, message: &Message, now: u64) -> Response {
        match message {
            Message::GetPinnedChats => Response::PinnedChats {
                pinned_chats: self.pin_ids(),
            },
            Message::GetAllChatTitles => {
                let titles: BTreeMap<String, String> = self
                    .pins
                    .entries()
                    .iter()
                    .map(|e| (e.id.to_string(), self.title_for(page, &e.id)))
                    .collect();
                Response::Titles { titles }
            }
            Message::GetChatTitle { chat_id } => match ConversationId::parse(chat_id) {
                Some(id) => Response::Title {
                    title: self.title_for(page, &id),
                },
                None => Response::Error {
                    error: format!("Invalid chat id: {chat_id}"),
                },
            },
            Message::ChatUnpinned { chat_id } => {
                if let Some(id) = ConversationId::parse(chat_id) {
                    self.pins.remove(&id);
                }
                self.after_remote_change(page, now);
                Response::Success { success: true }
            }
            Message::AllChatsUnpinned => {
                self.pins.clear();
                self.after_remote_change(page, now);
                Response::Success { success: true }
            }
            other => {
                tracing::debug!("Ignoring {} in content context", other.action());
                Response::Error {
                    error: "Unknown action".to_string(),
                }
            }
        }
    }

    fn after_remote_change(&mut self, page: &mut Page, now: u64) {
        self.forget_unpinned();
        self.surface_persist_failure(now);
        self.render(page);
        self.render_notices(page);
    }

    pub fn pin_ids(&self) -> Vec<String> {
        self.pins.entries().iter().map(|e| e.id.to_string()).collect()
    }

    /// Scraped title, else the cached label, else the placeholder.
    fn title_for(&self, page: &Page, id: &ConversationId) -> String {
        page.find_conversation_by_id(id)
            .and_then(|node| extract_label(&page.document, node))
            .or_else(|| self.pins.label(id).map(str::to_string))
            .unwrap_or_else(|| placeholder_label(id))
    }

    /// Navigate like the host would for a mirror pointing at `href`.
    pub fn navigate_mirror(&self, page: &mut Page, href: &str, now: u64) -> MirrorNavigation {
        navigate::navigate(page, href, now, self.timing.spa_fallback_ms)
    }

    fn surface_persist_failure(&mut self, now: u64) {
        if let Some(e) = self.pins.take_persist_failure() {
            tracing::warn!("Showing save error: {}", e);
            self.notices.push_for(
                SAVE_FAILED_MESSAGE,
                NoticeKind::Warning,
                now,
                SAVE_FAILED_NOTICE_MS,
            );
        }
    }

    /// Expire notices and redraw them if any went away.
    pub fn update_notices(&mut self, page: &mut Page, now: u64) {
        if self.notices.update(now) {
            self.render_notices(page);
        }
    }

    /// Draw the notice queue into its fixed container.
    fn render_notices(&self, page: &mut Page) {
        let doc = &mut page.document;
        let container = match doc.get_element_by_id(markup::NOTICE_CONTAINER_ID) {
            Some(container) => container,
            None if self.notices.is_empty() => return,
            None => {
                let container = doc.create_element("div", Owner::Extension);
                doc.set_attr(container, "id", markup::NOTICE_CONTAINER_ID);
                let body = doc.body();
                doc.append_child(body, container);
                container
            }
        };

        doc.clear_children(container);
        for notice in self.notices.visible() {
            let node = doc.create_element("div", Owner::Extension);
            doc.add_class(node, notice.kind.css_class());
            doc.set_text(node, &format!("⚠️ {}", notice.message));
            doc.append_child(container, node);
        }
    }
}
