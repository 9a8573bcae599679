//! Per-tab content script.
//!
//! Owns one engine and drives it from a single loop: the host page's
//! mutations feed the watcher, due timers run reconciliation passes, and
//! relay requests are answered between passes. Everything runs on the
//! caller's logical clock.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TimingConfig;
use crate::dom::{markup, DispatchOutcome, NodeId, Page, UiAction};
use crate::engine::{MirrorNavigation, PendingNavigation, ReconciliationEngine};
use crate::navigation::NavigationObserver;
use crate::pins::stored::decode_pinned;
use crate::pins::PinStateManager;
use crate::relay::{Envelope, Hub, Message, Port};
use crate::store::{StorageChange, Store, PINNED_CHATS_KEY};
use crate::watcher::{MutationWatcher, Trigger, WatcherState};

pub struct ContentScript {
    engine: ReconciliationEngine,
    watcher: MutationWatcher,
    navigation: NavigationObserver,
    storage: Receiver<StorageChange>,
    hub: Hub,
    port: Port,
    timing: TimingConfig,
    sidebar_ready: bool,
    next_sidebar_poll: u64,
    pending_navigation: Option<PendingNavigation>,
}

impl ContentScript {
    /// Load the pinned set and attach to `page`. Injection waits for the
    /// sidebar; the first [`ContentScript::tick`] checks for it.
    pub fn start(
        page: &mut Page,
        store: Arc<dyn Store>,
        hub: Hub,
        port: Port,
        timing: TimingConfig,
        now: u64,
    ) -> Self {
        let storage = store.subscribe();
        let pins = PinStateManager::load(store);
        tracing::info!("Content script started with {} pinned chats", pins.len());

        Self {
            engine: ReconciliationEngine::new(pins, timing.clone()),
            watcher: MutationWatcher::from_config(&timing),
            navigation: NavigationObserver::attach(&mut page.window, timing.location_poll_ms, now),
            storage,
            hub,
            port,
            timing,
            sidebar_ready: false,
            next_sidebar_poll: now,
            pending_navigation: None,
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn is_ready(&self) -> bool {
        self.sidebar_ready
    }

    pub fn watcher_state(&self) -> WatcherState {
        self.watcher.state()
    }

    pub fn pending_navigation(&self) -> Option<&PendingNavigation> {
        self.pending_navigation.as_ref()
    }

    /// Advance to `now`.
    pub fn tick(&mut self, page: &mut Page, now: u64) {
        self.observe_host_mutations(page, now);
        self.adopt_storage_changes(page);

        if !self.sidebar_ready {
            self.poll_sidebar(page, now);
        }

        if self.sidebar_ready {
            if let Some(trigger) = self.watcher.on_timer(now) {
                self.run_pass(page, trigger, now);
            }

            if self.navigation.changed(&page.window, now).is_some() {
                self.engine.mark_active(page);
            }
        }

        if let Some(pending) = self.pending_navigation.take() {
            if pending.is_due(now) {
                pending.resolve(&mut page.window);
            } else {
                self.pending_navigation = Some(pending);
            }
        }

        self.engine.update_notices(page, now);
        discard_own_mutations(page);

        for envelope in self.port.drain() {
            self.serve(page, envelope, now);
        }
    }

    /// Hand everything the host changed since the last engine operation to
    /// the watcher. Must run before the engine touches the page, since the
    /// engine's own mutations are discarded afterwards.
    fn observe_host_mutations(&mut self, page: &mut Page, now: u64) {
        let batch = page.document.take_mutations();
        if self.sidebar_ready && !batch.is_empty() {
            self.watcher.observe(now, &page.document, &batch);
        }
    }

    fn poll_sidebar(&mut self, page: &mut Page, now: u64) {
        if now < self.next_sidebar_poll {
            return;
        }
        let body = page.document.body();
        if page.document.query(body, &markup::sidebar_ready()).is_none() {
            self.next_sidebar_poll = now + self.timing.sidebar_poll_ms;
            tracing::debug!("Sidebar not rendered yet");
            return;
        }

        tracing::debug!("Sidebar found, injecting");
        self.sidebar_ready = true;
        discard_own_mutations(page);
        self.engine.reconcile(page, Trigger::ADDITIONS, now);
        discard_own_mutations(page);
    }

    fn run_pass(&mut self, page: &mut Page, trigger: Trigger, now: u64) {
        let report = self.engine.reconcile(page, trigger, now);
        discard_own_mutations(page);
        if !report.removed.is_empty() {
            self.notify_popup();
        }
    }

    /// Take over pinned-list writes from other contexts. Only the newest
    /// change matters.
    fn adopt_storage_changes(&mut self, page: &mut Page) {
        let latest = self
            .storage
            .try_iter()
            .filter_map(|change| change.get(PINNED_CHATS_KEY).cloned())
            .last();
        let Some(change) = latest else {
            return;
        };
        let decoded = decode_pinned(change.new_value.as_ref());
        if self.engine.adopt(page, decoded.entries) {
            tracing::debug!("Pinned chats changed in another context");
            discard_own_mutations(page);
        }
    }

    /// Deliver a user click on `target` and carry out what the extension's
    /// handlers asked for.
    pub fn click(&mut self, page: &mut Page, target: NodeId, now: u64) -> DispatchOutcome {
        self.observe_host_mutations(page, now);

        let outcome = page.click(target);
        for action in &outcome.actions {
            match action {
                UiAction::TogglePin(id) => {
                    tracing::debug!("Toggling pin for {}", id);
                    self.engine.toggle_pin(page, id, now);
                    discard_own_mutations(page);
                    self.notify_popup();
                }
                UiAction::NavigateMirror { href } => {
                    if let MirrorNavigation::Manual(pending) =
                        self.engine.navigate_mirror(page, href, now)
                    {
                        self.pending_navigation = Some(pending);
                    }
                }
            }
        }
        outcome
    }

    /// Wait up to `timeout` for one relay request and answer it.
    pub fn serve_one(&mut self, page: &mut Page, timeout: Duration, now: u64) -> bool {
        match self.port.recv_timeout(timeout) {
            Some(envelope) => {
                self.observe_host_mutations(page, now);
                self.serve(page, envelope, now);
                true
            }
            None => false,
        }
    }

    fn serve(&mut self, page: &mut Page, envelope: Envelope, now: u64) {
        tracing::debug!("Handling {} from popup", envelope.message.action());
        let response = self.engine.handle_message(page, &envelope.message, now);
        discard_own_mutations(page);
        envelope.respond(response);
    }

    /// Tell an open popup about the current pinned ids. Nobody listening is
    /// fine.
    fn notify_popup(&self) {
        let receivers = self.hub.broadcast_runtime(Message::PinnedChatsUpdated {
            pinned_chats: self.engine.pin_ids(),
        });
        if receivers == 0 {
            tracing::debug!("Popup not available for notification");
        }
    }
}

/// Drop mutations the extension caused so the watcher only sees the host's.
fn discard_own_mutations(page: &mut Page) {
    page.document.take_mutations();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{fixture, markup::PINNED_CLASS, Selector};
    use crate::relay::{ContextKind, RelayClient};
    use crate::store::{item, MemoryStore};
    use serde_json::json;
    use std::thread;

    struct Harness {
        page: Page,
        content: ContentScript,
        store: MemoryStore,
        hub: Hub,
    }

    fn harness(chats: &[(&str, &str)], pinned: serde_json::Value) -> Harness {
        let store = MemoryStore::new();
        store.set(item(PINNED_CHATS_KEY, pinned)).unwrap();
        let hub = Hub::new();
        let (_tab, port) = hub.open_tab("https://chatgpt.com/");
        let mut page = fixture::host_page(chats);
        let content = ContentScript::start(
            &mut page,
            Arc::new(store.clone()),
            hub.clone(),
            port,
            TimingConfig::default(),
            0,
        );
        Harness {
            page,
            content,
            store,
            hub,
        }
    }

    impl Harness {
        fn tick(&mut self, now: u64) {
            self.content.tick(&mut self.page, now);
        }

        fn click(&mut self, node: NodeId, now: u64) -> DispatchOutcome {
            self.content.click(&mut self.page, node, now)
        }

        fn toggle(&self, id: &str) -> NodeId {
            let link = fixture::chat_link(&self.page, id).unwrap();
            fixture::toggle_in(&self.page, link).unwrap()
        }
    }

    #[test]
    fn injection_waits_for_the_sidebar() {
        let mut h = harness(&[("aa11", "First")], json!([]));
        let root = h.page.document.get_element_by_id("app-root").unwrap();
        let nav = h.page.document.first_element_child(root).unwrap();
        h.page.document.remove(nav);

        h.tick(0);
        assert!(!h.content.is_ready());

        h.page.document.append_child(root, nav);
        h.tick(250);
        assert!(!h.content.is_ready());

        h.tick(500);
        assert!(h.content.is_ready());
        assert!(fixture::toggle_in(&h.page, fixture::chat_link(&h.page, "aa11").unwrap()).is_some());
        assert!(h.page.document.get_element_by_id(markup::PINNED_SECTION_ID).is_some());
    }

    #[test]
    fn new_host_items_get_toggles_after_settle_delay() {
        let mut h = harness(&[("aa11", "First")], json!([]));
        h.tick(0);

        fixture::add_chat(&mut h.page, "bb22", "Second");
        h.tick(1_000);
        assert!(fixture::toggle_in(&h.page, fixture::chat_link(&h.page, "bb22").unwrap()).is_none());

        h.tick(1_200);
        assert!(fixture::toggle_in(&h.page, fixture::chat_link(&h.page, "bb22").unwrap()).is_some());
        assert_eq!(h.content.watcher_state(), WatcherState::RateLimited { until: 1_700 });
    }

    #[test]
    fn host_additions_survive_a_concurrent_storage_write() {
        let mut h = harness(&[("aa11", "First")], json!([]));
        h.tick(0);

        fixture::add_chat(&mut h.page, "bb22", "Second");
        h.store.set(item(PINNED_CHATS_KEY, json!(["aa11"]))).unwrap();
        h.tick(1_000);
        assert!(matches!(
            h.content.watcher_state(),
            WatcherState::Pending { deadline: 1_200, .. }
        ));

        h.tick(1_200);
        assert!(fixture::toggle_in(&h.page, fixture::chat_link(&h.page, "bb22").unwrap()).is_some());
        assert_eq!(fixture::mirror_hrefs(&h.page), vec!["/c/aa11"]);
    }

    #[test]
    fn host_additions_survive_a_served_request() {
        let mut h = harness(&[("aa11", "Trip planning")], json!(["aa11"]));
        h.tick(0);

        fixture::add_chat(&mut h.page, "bb22", "Second");
        let client = RelayClient::new(h.hub.clone(), "https://chatgpt.com/", 3000);
        let popup = thread::spawn(move || client.get_all_chat_titles());
        assert!(h.content.serve_one(&mut h.page, Duration::from_secs(5), 1_000));
        popup.join().unwrap().unwrap();

        h.tick(1_200);
        assert!(fixture::toggle_in(&h.page, fixture::chat_link(&h.page, "bb22").unwrap()).is_some());
    }

    #[test]
    fn toggle_click_pins_without_navigating_and_notifies_popup() {
        let mut h = harness(&[("aa11", "First"), ("bb22", "Second")], json!([]));
        let popup = h.hub.connect_runtime(ContextKind::Popup);
        h.tick(0);

        let toggle = h.toggle("aa11");
        let outcome = h.click(toggle, 100);

        assert!(!outcome.navigated());
        assert_eq!(h.page.window.location(), "/");
        assert!(h.content.engine().pins().has(&crate::pins::ConversationId::parse("aa11").unwrap()));
        assert_eq!(fixture::mirror_hrefs(&h.page), vec!["/c/aa11"]);
        assert!(h.page.document.has_class(h.toggle("aa11"), PINNED_CLASS));

        let envelope = popup.try_recv().unwrap();
        assert_eq!(
            envelope.message,
            Message::PinnedChatsUpdated {
                pinned_chats: vec!["aa11".into()]
            }
        );

        h.tick(200);
        assert_eq!(h.content.watcher_state(), WatcherState::Idle);
    }

    #[test]
    fn mirror_click_uses_the_host_router() {
        let mut h = harness(&[("aa11", "First"), ("bb22", "Second")], json!(["aa11"]));
        h.tick(0);

        let mirror = fixture::mirrors(&h.page)[0];
        let title = h
            .page
            .document
            .query(mirror, &Selector::attr_eq("dir", "auto"))
            .unwrap();
        let outcome = h.click(title, 100);

        assert!(outcome.default_prevented);
        assert_eq!(h.page.window.location(), "/c/aa11");
        assert!(h.page.window.full_loads().is_empty());
        assert!(h.content.pending_navigation().is_none());

        h.tick(150);
        let mirror = fixture::mirrors(&h.page)[0];
        assert!(h.page.document.has_class(mirror, markup::ACTIVE_CLASS));
    }

    #[test]
    fn unpin_button_in_mirror_does_not_navigate() {
        let mut h = harness(&[("aa11", "First")], json!(["aa11"]));
        h.tick(0);

        let mirror = fixture::mirrors(&h.page)[0];
        let unpin = fixture::toggle_in(&h.page, mirror).unwrap();
        let outcome = h.click(unpin, 100);

        assert!(!outcome.navigated());
        assert_eq!(h.page.window.location(), "/");
        assert!(h.content.engine().pins().is_empty());
        assert!(fixture::mirrors(&h.page).is_empty());
    }

    #[test]
    fn deleted_pinned_chat_is_evicted_and_popup_told() {
        let mut h = harness(&[("aa11", "First"), ("bb22", "Second")], json!(["aa11", "bb22"]));
        let popup = h.hub.connect_runtime(ContextKind::Popup);
        h.tick(0);

        fixture::remove_chat(&mut h.page, "bb22");
        h.tick(1_000);
        h.tick(1_200);

        assert_eq!(h.content.engine().pin_ids(), vec!["aa11".to_string()]);
        assert_eq!(fixture::mirror_hrefs(&h.page), vec!["/c/aa11"]);
        assert_eq!(h.store.raw(PINNED_CHATS_KEY).unwrap().as_array().unwrap().len(), 1);
        assert!(popup.try_recv().is_some());
    }

    #[test]
    fn writes_from_other_contexts_are_adopted() {
        let mut h = harness(&[("aa11", "First"), ("bb22", "Second")], json!([]));
        h.tick(0);

        h.store
            .set(item(PINNED_CHATS_KEY, json!([{"id": "bb22", "title": "Second"}])))
            .unwrap();
        let writes = h.store.writes();
        h.tick(100);

        assert_eq!(fixture::mirror_hrefs(&h.page), vec!["/c/bb22"]);
        assert_eq!(h.store.writes(), writes);
    }

    #[test]
    fn popup_requests_are_answered_from_the_page() {
        let mut h = harness(&[("aa11", "Trip planning")], json!(["aa11"]));
        h.tick(0);

        let client = RelayClient::new(h.hub.clone(), "https://chatgpt.com/", 3000);
        let popup = thread::spawn(move || client.get_all_chat_titles());

        assert!(h.content.serve_one(&mut h.page, Duration::from_secs(5), 10));
        let titles = popup.join().unwrap().unwrap();
        assert_eq!(titles["aa11"], "Trip planning");
    }

    #[test]
    fn manual_navigation_falls_back_to_full_load() {
        let mut h = harness(&[("aa11", "First")], json!(["aa11"]));
        h.tick(0);

        // The host re-rendered its list without the original link.
        fixture::remove_chat(&mut h.page, "aa11");
        h.page.document.take_mutations();
        let mirror = fixture::mirrors(&h.page)[0];
        h.click(mirror, 100);
        assert_eq!(h.page.window.location(), "/c/aa11");
        assert!(h.content.pending_navigation().is_some());

        h.page.window.replace_state("/");
        h.tick(200);
        assert!(h.content.pending_navigation().is_none());
        assert_eq!(h.page.window.full_loads(), &["/c/aa11".to_string()]);
    }
}
