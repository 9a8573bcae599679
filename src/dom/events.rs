//! Event listener model.
//!
//! Listeners are data rather than closures: each registration names a
//! [`Handler`] and the page interprets it during dispatch. Extension handlers
//! turn into [`UiAction`]s the owning context executes afterwards.

use crate::pins::ConversationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Click,
    MouseDown,
    MouseUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Capture,
    Bubble,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handler {
    /// Pin toggle nested in a host link: swallow the event entirely and
    /// request a pin flip.
    PinToggle(ConversationId),
    /// Keep pointer events from reaching host handlers.
    StopPropagation,
    /// Mirror element: navigate like the original would, unless the click
    /// landed on a button.
    MirrorNavigate,
    /// The host application's delegated client-side router.
    HostRouter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub kind: EventKind,
    pub phase: Phase,
    pub handler: Handler,
}

impl Registration {
    pub fn new(kind: EventKind, phase: Phase, handler: Handler) -> Self {
        Self {
            kind,
            phase,
            handler,
        }
    }
}

/// Work requested by extension handlers during a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAction {
    TogglePin(ConversationId),
    NavigateMirror { href: String },
}

/// What happened to one dispatched event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub default_prevented: bool,
    pub propagation_stopped: bool,
    pub actions: Vec<UiAction>,
    /// Path the host router navigated to, if it handled the event.
    pub routed: Option<String>,
    /// Target of a default (full page) link navigation, if one happened.
    pub default_navigation: Option<String>,
}

impl DispatchOutcome {
    /// Whether any host-side navigation resulted from the event.
    pub fn navigated(&self) -> bool {
        self.routed.is_some() || self.default_navigation.is_some()
    }
}
