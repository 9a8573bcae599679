//! Test fixture: a sidebar rendered the way the chat application renders it.

use super::events::{EventKind, Handler, Phase, Registration};
use super::{markup, Document, NodeId, Owner, Page, Selector, Window};
use crate::identity::extract_id;

pub const ORIGIN: &str = "https://chatgpt.com";

/// Page with `chats` (`(id, title)`) rendered in the history sidebar.
///
/// ```text
/// body
///   div#app-root            (host router)
///     nav[aria-label="Chat history"]
///       div#history
///         aside
///           h2.__menu-label "Chats"
///           a.__menu-item[href=/c/<id>]
///             div.truncate > span[dir=auto] "<title>"
///             div.trailing > button[data-testid=history-item-options]
/// ```
pub fn host_page(chats: &[(&str, &str)]) -> Page {
    let mut doc = Document::new();
    let body = doc.body();

    let root = doc.create_element("div", Owner::Host);
    doc.set_attr(root, "id", "app-root");
    doc.add_listener(
        root,
        Registration::new(EventKind::Click, Phase::Bubble, Handler::HostRouter),
    );
    let nav = doc.create_element("nav", Owner::Host);
    doc.set_attr(nav, "aria-label", "Chat history");
    let history = doc.create_element("div", Owner::Host);
    doc.set_attr(history, "id", markup::HISTORY_ID);
    let aside = doc.create_element("aside", Owner::Host);
    let heading = doc.create_element("h2", Owner::Host);
    doc.add_class(heading, markup::MENU_LABEL_CLASS);
    doc.set_text(heading, "Chats");

    doc.append_child(body, root);
    doc.append_child(root, nav);
    doc.append_child(nav, history);
    doc.append_child(history, aside);
    doc.append_child(aside, heading);

    let mut page = Page::new(doc, Window::new(ORIGIN, "/"));
    for (id, title) in chats {
        add_chat(&mut page, id, title);
    }
    page.document.take_mutations();
    page
}

/// Render a conversation link the way the host does.
pub fn build_chat(doc: &mut Document, id: &str, title: &str) -> NodeId {
    let link = doc.create_element("a", Owner::Host);
    doc.set_attr(link, "href", &format!("/c/{id}"));
    doc.set_attr(link, "data-discover", "true");
    doc.set_classes(link, &[markup::MENU_ITEM_CLASS, "group"]);

    let truncate = doc.create_element("div", Owner::Host);
    doc.add_class(truncate, "truncate");
    let span = doc.create_element("span", Owner::Host);
    doc.set_attr(span, "dir", "auto");
    doc.set_text(span, title);
    doc.append_child(truncate, span);

    let trailing = doc.create_element("div", Owner::Host);
    doc.add_class(trailing, markup::TRAILING_CLASS);
    let options = doc.create_element("button", Owner::Host);
    doc.set_attr(options, "data-testid", "history-item-options");
    doc.set_attr(options, "aria-haspopup", "menu");
    doc.set_text(options, "…");
    doc.append_child(trailing, options);

    doc.append_child(link, truncate);
    doc.append_child(link, trailing);
    link
}

/// Append a conversation to the sidebar list.
pub fn add_chat(page: &mut Page, id: &str, title: &str) -> NodeId {
    let aside = sidebar(page).expect("fixture sidebar");
    let link = build_chat(&mut page.document, id, title);
    page.document.append_child(aside, link);
    link
}

/// Remove the host link of `id` from the sidebar.
pub fn remove_chat(page: &mut Page, id: &str) {
    if let Some(link) = chat_link(page, id) {
        page.document.remove(link);
    }
}

pub fn sidebar(page: &Page) -> Option<NodeId> {
    page.document
        .query(page.document.body(), &markup::sidebar())
}

/// Host link of conversation `id`.
pub fn chat_link(page: &Page, id: &str) -> Option<NodeId> {
    page.document
        .query_all(page.document.body(), &markup::host_conversation_link())
        .into_iter()
        .find(|n| {
            page.document
                .attr(*n, "href")
                .and_then(extract_id)
                .is_some_and(|found| found.as_str() == id)
        })
}

/// Injected toggle inside `node`, if any.
pub fn toggle_in(page: &Page, node: NodeId) -> Option<NodeId> {
    page.document.query(node, &markup::pin_button())
}

/// Mirror elements currently in the pinned list.
pub fn mirrors(page: &Page) -> Vec<NodeId> {
    let Some(list) = page.document.get_element_by_id(markup::PINNED_LIST_ID) else {
        return Vec::new();
    };
    page.document
        .children(list)
        .iter()
        .copied()
        .filter(|n| page.document.has_class(*n, markup::MIRROR_CLASS))
        .collect()
}

pub fn mirror_hrefs(page: &Page) -> Vec<String> {
    mirrors(page)
        .into_iter()
        .filter_map(|m| page.document.attr(m, "href").map(str::to_string))
        .collect()
}

/// Count of elements matching `selector` anywhere in the page.
pub fn count(page: &Page, selector: &Selector) -> usize {
    page.document
        .query_all(page.document.body(), selector)
        .len()
}
