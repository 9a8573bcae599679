//! The injected pinned section and the mirror elements inside it.

use super::toggles;
use crate::dom::markup::{self, MIRROR_CLASS};
use crate::dom::{Document, EventKind, Handler, NodeId, Owner, Page, Phase, Registration};
use crate::identity::extract_id;
use crate::label;
use crate::pins::{PinEntry, PinStateManager};
use crate::view::ExternalView;

/// The pinned section, created as the first child of the sidebar on first
/// use. `None` while the sidebar is not rendered.
pub fn ensure(doc: &mut Document) -> Option<NodeId> {
    if let Some(section) = doc.get_element_by_id(markup::PINNED_SECTION_ID) {
        return Some(section);
    }
    let sidebar = doc.query(doc.body(), &markup::sidebar())?;

    let section = doc.create_element("div", Owner::Extension);
    doc.set_attr(section, "id", markup::PINNED_SECTION_ID);
    doc.add_class(section, markup::PINNED_SECTION_CLASS);

    let header = doc.create_element("div", Owner::Extension);
    doc.add_class(header, markup::PINNED_HEADER_CLASS);
    let heading = doc.create_element("h2", Owner::Extension);
    doc.add_class(heading, markup::MENU_LABEL_CLASS);
    let before = doc.create_text(&format!("{} Pinned Chats (", markup::PINNED_GLYPH), Owner::Extension);
    let count = doc.create_element("span", Owner::Extension);
    doc.set_attr(count, "id", markup::PINNED_COUNT_ID);
    doc.set_text(count, "0");
    let after = doc.create_text(")", Owner::Extension);
    doc.append_child(heading, before);
    doc.append_child(heading, count);
    doc.append_child(heading, after);
    doc.append_child(header, heading);

    let list = doc.create_element("div", Owner::Extension);
    doc.set_attr(list, "id", markup::PINNED_LIST_ID);
    doc.add_class(list, markup::PINNED_LIST_CLASS);

    doc.append_child(section, header);
    doc.append_child(section, list);

    let first = doc.first_element_child(sidebar);
    doc.insert_before(sidebar, section, first);
    tracing::debug!("Created pinned section");
    Some(section)
}

/// Clear the pinned list and repopulate it from `pins`. Entries whose host
/// element is not rendered get no mirror this pass. Returns the number of
/// mirrors built.
pub fn rebuild(page: &mut Page, pins: &PinStateManager) -> usize {
    let Some(section) = ensure(&mut page.document) else {
        return 0;
    };
    let doc = &page.document;
    let (Some(list), count) = (
        doc.get_element_by_id(markup::PINNED_LIST_ID),
        doc.get_element_by_id(markup::PINNED_COUNT_ID),
    ) else {
        return 0;
    };

    let sources: Vec<(NodeId, &PinEntry)> = pins
        .entries()
        .iter()
        .filter_map(|entry| page.find_conversation_by_id(&entry.id).map(|n| (n, entry)))
        .collect();

    let doc = &mut page.document;
    if let Some(count) = count {
        doc.set_text(count, &pins.len().to_string());
    }
    doc.clear_children(list);
    doc.set_hidden(section, pins.is_empty());

    for (source, entry) in &sources {
        let mirror = build_mirror(doc, *source, entry);
        doc.append_child(list, mirror);
    }
    sources.len()
}

/// Clone `source` into a mirror for `entry`.
fn build_mirror(doc: &mut Document, source: NodeId, entry: &PinEntry) -> NodeId {
    let mirror = doc.deep_clone(source);
    doc.set_classes(
        mirror,
        &[MIRROR_CLASS, markup::MENU_ITEM_CLASS, markup::HOVERABLE_CLASS],
    );
    doc.set_hidden(mirror, false);
    if doc.attr(mirror, "href").is_none() {
        doc.set_attr(mirror, "href", &entry.id.path());
    }
    if doc.tag(mirror) != Some("a") {
        doc.set_attr(mirror, "role", "link");
    }

    for stale in doc.query_all(mirror, &markup::pin_button()) {
        doc.remove(stale);
    }
    for control in doc.query_all(mirror, &markup::stripped_control()) {
        doc.remove(control);
    }

    if let Some(title) = label::title_node(doc, mirror) {
        doc.set_text(title, &entry.label);
    }

    let unpin = toggles::build_toggle(doc, &entry.id, true);
    toggles::place(doc, mirror, unpin);
    doc.add_listener(
        mirror,
        Registration::new(EventKind::Click, Phase::Bubble, Handler::MirrorNavigate),
    );
    mirror
}

/// Hide pinned host elements so they do not show twice, and undo it for
/// ones no longer pinned.
pub fn suppress(page: &mut Page, pins: &PinStateManager) {
    let visible = page.list_visible_conversations();
    let doc = &mut page.document;
    for conversation in visible {
        if pins.has(&conversation.id) {
            doc.set_hidden(conversation.node, true);
            doc.add_class(conversation.node, markup::PINNED_HIGHLIGHT_CLASS);
        } else if doc.has_class(conversation.node, markup::PINNED_HIGHLIGHT_CLASS) {
            doc.set_hidden(conversation.node, false);
            doc.remove_class(conversation.node, markup::PINNED_HIGHLIGHT_CLASS);
        }
    }
}

/// Mark the mirror of the current conversation active.
pub fn mark_active(page: &mut Page) {
    let current = extract_id(&page.current_location());
    let doc = &mut page.document;
    let Some(list) = doc.get_element_by_id(markup::PINNED_LIST_ID) else {
        return;
    };
    for mirror in doc.element_children(list) {
        let id = doc.attr(mirror, "href").and_then(extract_id);
        if current.is_some() && id == current {
            doc.add_class(mirror, markup::ACTIVE_CLASS);
        } else {
            doc.remove_class(mirror, markup::ACTIVE_CLASS);
        }
    }
}
