//! In-process message routing between contexts.
//!
//! Plays the browser's part: content scripts register per tab, the popup and
//! the background register as runtime listeners. Every context owns its own
//! [`Port`] and drains it from its own loop.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::protocol::{Message, Response};
use crate::error::RelayError;

pub type TabId = u32;

/// A message with an optional reply channel.
#[derive(Debug)]
pub struct Envelope {
    pub message: Message,
    reply: Option<Sender<Response>>,
}

impl Envelope {
    /// Whether the sender waits for an answer.
    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Answer the sender. A sender that stopped waiting is not an error.
    pub fn respond(self, response: Response) {
        if let Some(reply) = self.reply {
            let _ = reply.send(response);
        }
    }
}

/// Receiving end of one context.
#[derive(Debug)]
pub struct Port {
    rx: Receiver<Envelope>,
}

impl Port {
    pub fn try_recv(&self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Envelope> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Everything queued right now.
    pub fn drain(&self) -> Vec<Envelope> {
        self.rx.try_iter().collect()
    }
}

/// Runtime contexts that are not tied to a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Popup,
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
    /// Whether a content script listens in this tab.
    pub scripted: bool,
}

struct TabEntry {
    id: TabId,
    url: String,
    tx: Option<Sender<Envelope>>,
}

struct RuntimeEntry {
    kind: ContextKind,
    tx: Sender<Envelope>,
}

#[derive(Default)]
struct HubInner {
    tabs: Vec<TabEntry>,
    runtime: Vec<RuntimeEntry>,
    active_tab: Option<TabId>,
    next_tab: TabId,
}

/// Shared message router. Cheap to clone.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<Mutex<HubInner>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add_tab(&self, url: &str, tx: Option<Sender<Envelope>>) -> TabId {
        let mut inner = self.lock();
        inner.next_tab += 1;
        let id = inner.next_tab;
        inner.tabs.push(TabEntry {
            id,
            url: url.to_string(),
            tx,
        });
        inner.active_tab = Some(id);
        id
    }

    /// Open a tab at `url` with a content script listening in it. The new
    /// tab becomes active.
    pub fn open_tab(&self, url: &str) -> (TabId, Port) {
        let (tx, rx) = mpsc::channel();
        let id = self.add_tab(url, Some(tx));
        tracing::debug!("Opened tab {} at {}", id, url);
        (id, Port { rx })
    }

    /// Open a tab with nothing listening in it. The new tab becomes active.
    pub fn create_tab(&self, url: &str) -> TabId {
        let id = self.add_tab(url, None);
        tracing::debug!("Created tab {} at {}", id, url);
        id
    }

    pub fn close_tab(&self, id: TabId) {
        let mut inner = self.lock();
        inner.tabs.retain(|t| t.id != id);
        if inner.active_tab == Some(id) {
            inner.active_tab = inner.tabs.last().map(|t| t.id);
        }
    }

    pub fn active_tab(&self) -> Option<TabInfo> {
        let inner = self.lock();
        let id = inner.active_tab?;
        inner.tabs.iter().find(|t| t.id == id).map(tab_info)
    }

    /// Point tab `id` at `url`.
    pub fn update_tab(&self, id: TabId, url: &str) -> bool {
        let mut inner = self.lock();
        match inner.tabs.iter_mut().find(|t| t.id == id) {
            Some(tab) => {
                tab.url = url.to_string();
                true
            }
            None => false,
        }
    }

    /// Tabs whose URL starts with `prefix`, oldest first.
    pub fn query_tabs(&self, prefix: &str) -> Vec<TabInfo> {
        self.lock()
            .tabs
            .iter()
            .filter(|t| t.url.starts_with(prefix))
            .map(tab_info)
            .collect()
    }

    /// Register a runtime listener of `kind`.
    pub fn connect_runtime(&self, kind: ContextKind) -> Port {
        let (tx, rx) = mpsc::channel();
        self.lock().runtime.push(RuntimeEntry { kind, tx });
        Port { rx }
    }

    fn deliver(&self, id: TabId, envelope: Envelope) -> Result<(), RelayError> {
        let inner = self.lock();
        let tab = inner
            .tabs
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| RelayError::NoMatchingTab(id.to_string()))?;
        let tx = tab.tx.as_ref().ok_or(RelayError::Disconnected)?;
        tx.send(envelope).map_err(|_| RelayError::Disconnected)
    }

    /// Deliver `message` to the content script of tab `id` and return the
    /// channel its answer arrives on.
    pub fn send_to_tab(&self, id: TabId, message: Message) -> Result<Receiver<Response>, RelayError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.deliver(
            id,
            Envelope {
                message,
                reply: Some(reply_tx),
            },
        )?;
        Ok(reply_rx)
    }

    /// Deliver `message` to tab `id` without waiting for an answer.
    pub fn notify_tab(&self, id: TabId, message: Message) -> Result<(), RelayError> {
        self.deliver(id, Envelope { message, reply: None })
    }

    /// Send a request to the first live runtime listener of `kind`.
    pub fn send_runtime(
        &self,
        kind: ContextKind,
        message: Message,
    ) -> Result<Receiver<Response>, RelayError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        let mut pending = Some(Envelope {
            message,
            reply: Some(reply_tx),
        });
        self.lock().runtime.retain(|r| {
            if r.kind != kind {
                return true;
            }
            let Some(envelope) = pending.take() else {
                return true;
            };
            match r.tx.send(envelope) {
                Ok(()) => true,
                Err(mpsc::SendError(back)) => {
                    pending = Some(back);
                    false
                }
            }
        });
        match pending {
            Some(_) => Err(RelayError::Disconnected),
            None => Ok(reply_rx),
        }
    }

    /// Fire-and-forget notification to every runtime listener. Returns how
    /// many received it; nobody listening is fine.
    pub fn broadcast_runtime(&self, message: Message) -> usize {
        let mut inner = self.lock();
        inner.runtime.retain(|r| {
            r.tx.send(Envelope {
                message: message.clone(),
                reply: None,
            })
            .is_ok()
        });
        inner.runtime.len()
    }
}

fn tab_info(tab: &TabEntry) -> TabInfo {
    TabInfo {
        id: tab.id,
        url: tab.url.clone(),
        scripted: tab.tx.is_some(),
    }
}

/// Wait up to `timeout` for an answer on `rx`.
pub fn await_response(rx: &Receiver<Response>, timeout: Duration) -> Result<Response, RelayError> {
    rx.recv_timeout(timeout).map_err(|e| match e {
        RecvTimeoutError::Timeout => RelayError::Timeout(timeout.as_millis() as u64),
        RecvTimeoutError::Disconnected => RelayError::Disconnected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_requests_reach_the_content_port() {
        let hub = Hub::new();
        let (tab, port) = hub.open_tab("https://chatgpt.com/c/aa11");

        let rx = hub.send_to_tab(tab, Message::GetPinnedChats).unwrap();
        let envelope = port.try_recv().unwrap();
        assert_eq!(envelope.message, Message::GetPinnedChats);
        assert!(envelope.expects_reply());
        envelope.respond(Response::PinnedChats {
            pinned_chats: vec!["aa11".into()],
        });

        assert_eq!(
            await_response(&rx, Duration::from_millis(10)).unwrap(),
            Response::PinnedChats {
                pinned_chats: vec!["aa11".into()]
            }
        );
    }

    #[test]
    fn closed_tab_or_missing_script_is_unavailable() {
        let hub = Hub::new();
        let (tab, port) = hub.open_tab("https://chatgpt.com/");
        drop(port);
        assert_eq!(
            hub.send_to_tab(tab, Message::GetPinnedChats).unwrap_err(),
            RelayError::Disconnected
        );

        let bare = hub.create_tab("https://chatgpt.com/");
        assert_eq!(
            hub.send_to_tab(bare, Message::GetPinnedChats).unwrap_err(),
            RelayError::Disconnected
        );

        hub.close_tab(bare);
        assert!(matches!(
            hub.send_to_tab(bare, Message::GetPinnedChats),
            Err(RelayError::NoMatchingTab(_))
        ));
    }

    #[test]
    fn notification_expects_no_reply() {
        let hub = Hub::new();
        let (tab, port) = hub.open_tab("https://chatgpt.com/");
        hub.notify_tab(tab, Message::AllChatsUnpinned).unwrap();
        let envelope = port.try_recv().unwrap();
        assert!(!envelope.expects_reply());
        envelope.respond(Response::Success { success: true });
    }

    #[test]
    fn unanswered_request_times_out() {
        let hub = Hub::new();
        let (tab, _port) = hub.open_tab("https://chatgpt.com/");
        let rx = hub.send_to_tab(tab, Message::GetAllChatTitles).unwrap();
        assert_eq!(
            await_response(&rx, Duration::from_millis(20)).unwrap_err(),
            RelayError::Timeout(20)
        );
    }

    #[test]
    fn dropped_envelope_reads_as_disconnected() {
        let hub = Hub::new();
        let (tab, port) = hub.open_tab("https://chatgpt.com/");
        let rx = hub.send_to_tab(tab, Message::GetAllChatTitles).unwrap();
        drop(port.try_recv());
        assert_eq!(
            await_response(&rx, Duration::from_millis(20)).unwrap_err(),
            RelayError::Disconnected
        );
    }

    #[test]
    fn broadcast_without_listeners_is_fine() {
        let hub = Hub::new();
        assert_eq!(hub.broadcast_runtime(Message::AllChatsUnpinned), 0);

        let popup = hub.connect_runtime(ContextKind::Popup);
        let gone = hub.connect_runtime(ContextKind::Popup);
        drop(gone);
        assert_eq!(hub.broadcast_runtime(Message::AllChatsUnpinned), 1);
        let envelope = popup.try_recv().unwrap();
        assert!(!envelope.expects_reply());
    }

    #[test]
    fn query_and_active_tab_follow_tab_lifecycle() {
        let hub = Hub::new();
        let (first, _p1) = hub.open_tab("https://chatgpt.com/c/aa11");
        let other = hub.create_tab("https://example.com/");
        assert_eq!(hub.active_tab().unwrap().id, other);

        let found = hub.query_tabs("https://chatgpt.com/");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, first);
        assert!(found[0].scripted);

        hub.close_tab(other);
        assert_eq!(hub.active_tab().unwrap().id, first);
        assert!(hub.update_tab(first, "https://chatgpt.com/c/bb22"));
        assert_eq!(hub.active_tab().unwrap().url, "https://chatgpt.com/c/bb22");
    }
}
