//! The host page: document, window and event dispatch.

use std::sync::mpsc::{self, Receiver, Sender};

use super::events::{DispatchOutcome, EventKind, Handler, Phase, Registration, UiAction};
use super::{markup, Document, NodeId, Owner, Selector};
use crate::identity::extract_id;
use crate::view::{ExternalView, VisibleConversation};

/// Events dispatched on the window object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    PopState,
    /// Generic "please navigate" intent for routers that listen for one.
    NavigationIntent {
        href: String,
        chat_id: Option<String>,
    },
}

/// Browser window state of the host tab.
#[derive(Debug)]
pub struct Window {
    origin: String,
    location: String,
    history: Vec<String>,
    events: Vec<WindowEvent>,
    full_loads: Vec<String>,
    navigation_hook: bool,
    subscribers: Vec<Sender<String>>,
}

impl Window {
    pub fn new(origin: &str, path: &str) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            location: path.to_string(),
            history: vec![path.to_string()],
            events: Vec::new(),
            full_loads: Vec::new(),
            navigation_hook: true,
            subscribers: Vec::new(),
        }
    }

    /// Environment without a location-change hook; observers must poll.
    pub fn without_navigation_hook(mut self) -> Self {
        self.navigation_hook = false;
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Current location path.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.origin, self.location)
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    fn set_location(&mut self, path: &str) {
        if self.location == path {
            return;
        }
        self.location = path.to_string();
        let location = self.location.clone();
        self.subscribers.retain(|tx| tx.send(location.clone()).is_ok());
    }

    /// Client-side navigation (`history.pushState`).
    pub fn push_state(&mut self, path: &str) {
        self.history.push(path.to_string());
        self.set_location(path);
    }

    /// Replace the current entry without a new history item.
    pub fn replace_state(&mut self, path: &str) {
        if let Some(last) = self.history.last_mut() {
            *last = path.to_string();
        }
        self.set_location(path);
    }

    /// Full page load of `path`.
    pub fn assign(&mut self, path: &str) {
        self.full_loads.push(path.to_string());
        self.history.push(path.to_string());
        self.set_location(path);
    }

    pub fn full_loads(&self) -> &[String] {
        &self.full_loads
    }

    pub fn dispatch_event(&mut self, event: WindowEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[WindowEvent] {
        &self.events
    }

    /// Location-change notifications, when the environment offers them.
    pub fn subscribe_navigation(&mut self) -> Option<Receiver<String>> {
        if !self.navigation_hook {
            return None;
        }
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        Some(rx)
    }
}

#[derive(Default)]
struct DispatchState {
    outcome: DispatchOutcome,
    immediate_stopped: bool,
}

/// A host tab: its document and window.
#[derive(Debug)]
pub struct Page {
    pub document: Document,
    pub window: Window,
}

impl Page {
    pub fn new(document: Document, window: Window) -> Self {
        Self { document, window }
    }

    /// Dispatch a click on `target`.
    pub fn click(&mut self, target: NodeId) -> DispatchOutcome {
        self.dispatch(EventKind::Click, target)
    }

    /// Dispatch `kind` on `target`: capture from the root down, the target
    /// itself, then bubble back up. An unprevented click on a link ends in a
    /// full page load.
    pub fn dispatch(&mut self, kind: EventKind, target: NodeId) -> DispatchOutcome {
        let mut path = Vec::new();
        let mut current = Some(target);
        while let Some(node) = current {
            path.push(node);
            current = self.document.parent(node);
        }
        path.reverse();
        let ancestors = &path[..path.len() - 1];

        let mut state = DispatchState::default();
        for node in ancestors {
            self.invoke(*node, target, kind, Some(Phase::Capture), &mut state);
            if state.outcome.propagation_stopped {
                break;
            }
        }
        if !state.outcome.propagation_stopped {
            self.invoke(target, target, kind, None, &mut state);
        }
        if !state.outcome.propagation_stopped {
            for node in ancestors.iter().rev() {
                self.invoke(*node, target, kind, Some(Phase::Bubble), &mut state);
                if state.outcome.propagation_stopped {
                    break;
                }
            }
        }

        let mut outcome = state.outcome;
        if kind == EventKind::Click && !outcome.default_prevented && outcome.routed.is_none() {
            let link = self.document.closest(target, &link_selector());
            if let Some(href) = link.and_then(|l| self.document.attr(l, "href")) {
                let href = href.to_string();
                self.window.assign(&href);
                outcome.default_navigation = Some(href);
            }
        }
        outcome
    }

    fn invoke(
        &mut self,
        node: NodeId,
        target: NodeId,
        kind: EventKind,
        phase: Option<Phase>,
        state: &mut DispatchState,
    ) {
        let registrations: Vec<Registration> = self
            .document
            .listeners(node)
            .iter()
            .filter(|r| r.kind == kind && phase.map_or(true, |p| r.phase == p))
            .cloned()
            .collect();
        for registration in registrations {
            if state.immediate_stopped {
                break;
            }
            self.run_handler(&registration.handler, node, target, kind, state);
        }
    }

    fn run_handler(
        &mut self,
        handler: &Handler,
        node: NodeId,
        target: NodeId,
        kind: EventKind,
        state: &mut DispatchState,
    ) {
        let outcome = &mut state.outcome;
        match handler {
            Handler::PinToggle(id) => {
                outcome.propagation_stopped = true;
                state.immediate_stopped = true;
                outcome.default_prevented = true;
                if kind == EventKind::Click {
                    outcome.actions.push(UiAction::TogglePin(id.clone()));
                }
            }
            Handler::StopPropagation => outcome.propagation_stopped = true,
            Handler::MirrorNavigate => {
                if kind != EventKind::Click {
                    return;
                }
                let on_button = self
                    .document
                    .closest(target, &Selector::tag("button"))
                    .is_some_and(|button| self.document.contains(node, button));
                if on_button {
                    return;
                }
                outcome.default_prevented = true;
                if let Some(href) = self.document.attr(node, "href") {
                    outcome.actions.push(UiAction::NavigateMirror {
                        href: href.to_string(),
                    });
                }
            }
            Handler::HostRouter => {
                if kind != EventKind::Click || outcome.default_prevented {
                    return;
                }
                let Some(link) = self.document.closest(target, &link_selector()) else {
                    return;
                };
                if !self.document.contains(node, link)
                    || self.document.owner(link) != Owner::Host
                {
                    return;
                }
                if let Some(href) = self.document.attr(link, "href") {
                    let href = href.to_string();
                    outcome.default_prevented = true;
                    self.window.push_state(&href);
                    outcome.routed = Some(href);
                }
            }
        }
    }
}

fn link_selector() -> Selector {
    Selector::tag("a").and(Selector::attr("href"))
}

impl ExternalView for Page {
    fn list_visible_conversations(&self) -> Vec<VisibleConversation> {
        let doc = &self.document;
        doc.query_all(doc.body(), &markup::host_conversation_link())
            .into_iter()
            .filter(|node| doc.owner(*node) == Owner::Host)
            .filter_map(|node| {
                doc.attr(node, "href")
                    .and_then(extract_id)
                    .map(|id| VisibleConversation { id, node })
            })
            .collect()
    }

    fn find_conversation_by_id(&self, id: &crate::pins::ConversationId) -> Option<NodeId> {
        self.list_visible_conversations()
            .into_iter()
            .find(|c| &c.id == id)
            .map(|c| c.node)
    }

    fn current_location(&self) -> String {
        self.window.location().to_string()
    }
}
