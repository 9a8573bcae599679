//! Inline pin toggles injected into host conversation links.

use crate::dom::markup::{self, PINNED_CLASS, PIN_BUTTON_CLASS, TRAILING_CLASS};
use crate::dom::{Document, EventKind, Handler, NodeId, Owner, Phase, Registration};
use crate::identity::extract_id;
use crate::pins::{ConversationId, PinStateManager};

/// Build a detached toggle for `id`.
///
/// The click handler is registered for both phases so the host never sees
/// the click; pointer down/up are stopped as well.
pub fn build_toggle(doc: &mut Document, id: &ConversationId, pinned: bool) -> NodeId {
    let button = doc.create_element("button", Owner::Extension);
    doc.set_attr(button, markup::CHAT_ID_ATTR, id.as_str());
    doc.set_attr(button, "type", "button");
    present(doc, button, pinned);

    for phase in [Phase::Capture, Phase::Bubble] {
        doc.add_listener(
            button,
            Registration::new(EventKind::Click, phase, Handler::PinToggle(id.clone())),
        );
    }
    for kind in [EventKind::MouseDown, EventKind::MouseUp] {
        doc.add_listener(
            button,
            Registration::new(kind, Phase::Bubble, Handler::StopPropagation),
        );
    }
    button
}

/// Glyph, title and classes for the given state.
fn present(doc: &mut Document, button: NodeId, pinned: bool) {
    if pinned {
        doc.set_classes(button, &[PIN_BUTTON_CLASS, PINNED_CLASS]);
        doc.set_attr(button, "title", markup::UNPIN_TITLE);
        doc.set_text(button, markup::PINNED_GLYPH);
    } else {
        doc.set_classes(button, &[PIN_BUTTON_CLASS]);
        doc.set_attr(button, "title", markup::PIN_TITLE);
        doc.set_text(button, markup::UNPINNED_GLYPH);
    }
}

/// Put `button` first in the trailing actions of `item`, creating the
/// container when the host rendered none.
pub fn place(doc: &mut Document, item: NodeId, button: NodeId) {
    match doc.query(item, &markup::trailing()) {
        Some(trailing) => {
            let first = doc.children(trailing).first().copied();
            doc.insert_before(trailing, button, first);
        }
        None => {
            let trailing = doc.create_element("div", Owner::Extension);
            doc.add_class(trailing, TRAILING_CLASS);
            doc.append_child(trailing, button);
            doc.append_child(item, trailing);
        }
    }
}

/// Give every host conversation link that lacks one a toggle. Returns how
/// many were added.
pub fn inject(doc: &mut Document, pins: &PinStateManager) -> usize {
    let links: Vec<(NodeId, ConversationId)> = doc
        .query_all(doc.body(), &markup::host_conversation_link())
        .into_iter()
        .filter(|link| doc.owner(*link) == Owner::Host)
        .filter(|link| doc.query(*link, &markup::pin_button()).is_none())
        .filter_map(|link| doc.attr(link, "href").and_then(extract_id).map(|id| (link, id)))
        .collect();

    for (link, id) in &links {
        let button = build_toggle(doc, id, pins.has(id));
        place(doc, *link, button);
    }
    links.len()
}

/// Bring every toggle on the page in line with the pinned set.
pub fn refresh(doc: &mut Document, pins: &PinStateManager) {
    for button in doc.query_all(doc.body(), &markup::pin_button()) {
        let Some(id) = doc
            .attr(button, markup::CHAT_ID_ATTR)
            .and_then(ConversationId::parse)
        else {
            continue;
        };
        let pinned = pins.has(&id);
        if doc.has_class(button, PINNED_CLASS) != pinned {
            present(doc, button, pinned);
        }
    }
}
