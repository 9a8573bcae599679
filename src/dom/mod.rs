//! Host page model.
//!
//! The chat application owns its document and mutates it whenever it likes.
//! This module models that document as an arena of nodes so the engine can
//! query it, inject into it and observe child-list mutations the same way a
//! content script does in a browser.

use std::collections::BTreeMap;

pub mod events;
pub mod markup;
pub mod page;
pub mod selector;

#[cfg(test)]
pub(crate) mod fixture;

pub use events::{DispatchOutcome, EventKind, Handler, Phase, Registration, UiAction};
pub use page::{Page, Window, WindowEvent};
pub use selector::Selector;

/// Handle to a node inside one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Who created a node.
///
/// The host framework only binds behaviour to nodes it rendered itself;
/// clones and injected nodes are invisible to its router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Host,
    Extension,
}

#[derive(Debug, Clone)]
enum NodeData {
    Element { tag: String },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    attrs: BTreeMap<String, String>,
    classes: Vec<String>,
    hidden: bool,
    owner: Owner,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    listeners: Vec<Registration>,
    released: bool,
}

impl Node {
    fn new(data: NodeData, owner: Owner) -> Self {
        Self {
            data,
            attrs: BTreeMap::new(),
            classes: Vec::new(),
            hidden: false,
            owner,
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
            released: false,
        }
    }
}

/// One child-list change under the document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// Arena-backed document tree.
///
/// Detached nodes stay in the arena, so removed subtrees can still be
/// inspected when their removal is observed. Extension-owned subtrees that
/// are still detached one [`Document::take_mutations`] call after their
/// removal are released and their slots reused.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    free: Vec<usize>,
    body: NodeId,
    mutations: Vec<MutationRecord>,
    detached: Vec<NodeId>,
    releasable: Vec<NodeId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let body = Node::new(
            NodeData::Element {
                tag: "body".to_string(),
            },
            Owner::Host,
        );
        Self {
            nodes: vec![body],
            free: Vec::new(),
            body: NodeId(0),
            mutations: Vec::new(),
            detached: Vec::new(),
            releasable: Vec::new(),
        }
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    fn push(&mut self, node: Node) -> NodeId {
        if let Some(slot) = self.free.pop() {
            self.nodes[slot] = node;
            return NodeId(slot);
        }
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Number of nodes currently held, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn create_element(&mut self, tag: &str, owner: Owner) -> NodeId {
        self.push(Node::new(
            NodeData::Element {
                tag: tag.to_ascii_lowercase(),
            },
            owner,
        ))
    }

    pub fn create_text(&mut self, text: &str, owner: Owner) -> NodeId {
        self.push(Node::new(NodeData::Text(text.to_string()), owner))
    }

    // -- element data -------------------------------------------------------

    /// Tag name, or `None` for text nodes.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Element { tag } => Some(tag),
            NodeData::Text(_) => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.tag(id).is_some()
    }

    pub fn owner(&self, id: NodeId) -> Owner {
        self.node(id).owner
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id).attrs.get(name).map(String::as_str)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.node_mut(id)
            .attrs
            .insert(name.to_string(), value.to_string());
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.node(id).classes.iter().any(|c| c == class)
    }

    pub fn classes(&self, id: NodeId) -> &[String] {
        &self.node(id).classes
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if !self.has_class(id, class) {
            self.node_mut(id).classes.push(class.to_string());
        }
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        self.node_mut(id).classes.retain(|c| c != class);
    }

    /// Replace the whole class list.
    pub fn set_classes(&mut self, id: NodeId, classes: &[&str]) {
        self.node_mut(id).classes = classes.iter().map(|c| (*c).to_string()).collect();
    }

    /// CSS-level visibility (`display: none`), not removal.
    pub fn is_hidden(&self, id: NodeId) -> bool {
        self.node(id).hidden
    }

    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) {
        self.node_mut(id).hidden = hidden;
    }

    // -- tree structure -----------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn first_element_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|c| self.is_element(*c))
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    /// Whether `id` is attached under the body.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.contains(self.body, id)
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub fn contains(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Descendants of `root` in document order, excluding `root`.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        self.node_mut(parent).children.retain(|c| *c != child);
        self.node_mut(child).parent = None;
        self.note_detached(child);
        self.record(parent, Vec::new(), vec![child]);
    }

    fn note_detached(&mut self, id: NodeId) {
        if self.owner(id) == Owner::Extension {
            self.detached.push(id);
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` into `parent` before `reference` (or at the end).
    ///
    /// `child` is first detached from wherever it currently lives.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        self.detach(child);
        let children = &mut self.node_mut(parent).children;
        let index = reference
            .and_then(|r| children.iter().position(|c| *c == r))
            .unwrap_or(children.len());
        children.insert(index, child);
        self.node_mut(child).parent = Some(parent);
        self.record(parent, vec![child], Vec::new());
    }

    pub fn remove(&mut self, id: NodeId) {
        self.detach(id);
    }

    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.node_mut(id).children);
        for child in &children {
            self.node_mut(*child).parent = None;
            self.note_detached(*child);
        }
        if !children.is_empty() {
            self.record(id, Vec::new(), children);
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        if let NodeData::Text(text) = &self.node(id).data {
            return text.clone();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|n| match &self.node(n).data {
                NodeData::Text(text) => Some(text.as_str()),
                NodeData::Element { .. } => None,
            })
            .collect()
    }

    /// Replace the children of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.clear_children(id);
        let owner = self.owner(id);
        let node = self.create_text(text, owner);
        self.append_child(id, node);
    }

    // -- queries ------------------------------------------------------------

    pub fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        selector.matches(self, id)
    }

    /// First descendant of `root` matching `selector`.
    pub fn query(&self, root: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|n| selector.matches(self, *n))
    }

    /// All descendants of `root` matching `selector`, in document order.
    pub fn query_all(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|n| selector.matches(self, *n))
            .collect()
    }

    /// Nearest inclusive ancestor of `id` matching `selector`.
    pub fn closest(&self, id: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if selector.matches(self, node) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// First connected element whose `id` attribute equals `element_id`.
    pub fn get_element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.query(self.body, &Selector::id(element_id))
    }

    // -- cloning and listeners ----------------------------------------------

    /// Copy the subtree at `id`. The copy is detached, owned by the
    /// extension and carries no listeners.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let source = self.node(id);
        let mut copy = Node::new(source.data.clone(), Owner::Extension);
        copy.attrs = source.attrs.clone();
        copy.classes = source.classes.clone();
        copy.hidden = source.hidden;
        let children = source.children.clone();

        let copy_id = self.push(copy);
        for child in children {
            let child_copy = self.deep_clone(child);
            self.node_mut(child_copy).parent = Some(copy_id);
            self.node_mut(copy_id).children.push(child_copy);
        }
        copy_id
    }

    pub fn add_listener(&mut self, id: NodeId, registration: Registration) {
        self.node_mut(id).listeners.push(registration);
    }

    pub fn listeners(&self, id: NodeId) -> &[Registration] {
        &self.node(id).listeners
    }

    // -- mutation observation -----------------------------------------------

    fn record(&mut self, target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) {
        if self.is_connected(target) {
            self.mutations.push(MutationRecord {
                target,
                added,
                removed,
            });
        }
    }

    /// Hand over every child-list mutation recorded since the last call.
    ///
    /// Extension subtrees detached before the previous call and never
    /// re-attached are released here.
    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        let roots = std::mem::replace(&mut self.releasable, std::mem::take(&mut self.detached));
        for root in roots {
            if self.parent(root).is_none() && !self.releasable.contains(&root) {
                self.release(root);
            }
        }
        std::mem::take(&mut self.mutations)
    }

    fn release(&mut self, root: NodeId) {
        if self.node(root).released {
            return;
        }
        let mut subtree = self.descendants(root);
        subtree.push(root);
        for id in subtree {
            let node = self.node_mut(id);
            if node.owner != Owner::Extension || node.released {
                continue;
            }
            node.released = true;
            node.children.clear();
            node.listeners.clear();
            self.free.push(id.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(doc: &mut Document, tag: &str) -> NodeId {
        doc.create_element(tag, Owner::Host)
    }

    #[test]
    fn insert_before_places_child_at_reference() {
        let mut doc = Document::new();
        let list = element(&mut doc, "ul");
        let a = element(&mut doc, "li");
        let b = element(&mut doc, "li");
        doc.append_child(list, a);
        doc.insert_before(list, b, Some(a));
        assert_eq!(doc.children(list), &[b, a]);
    }

    #[test]
    fn appending_moves_node_from_old_parent() {
        let mut doc = Document::new();
        let first = element(&mut doc, "div");
        let second = element(&mut doc, "div");
        let child = element(&mut doc, "span");
        doc.append_child(first, child);
        doc.append_child(second, child);
        assert!(doc.children(first).is_empty());
        assert_eq!(doc.parent(child), Some(second));
    }

    #[test]
    fn only_connected_mutations_are_recorded() {
        let mut doc = Document::new();
        let detached = element(&mut doc, "div");
        let child = element(&mut doc, "span");
        doc.append_child(detached, child);
        assert!(doc.take_mutations().is_empty());

        let body = doc.body();
        doc.append_child(body, detached);
        doc.remove(detached);
        let records = doc.take_mutations();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].added, vec![detached]);
        assert_eq!(records[1].removed, vec![detached]);
        assert!(doc.take_mutations().is_empty());
    }

    #[test]
    fn removed_subtree_stays_inspectable() {
        let mut doc = Document::new();
        let body = doc.body();
        let link = element(&mut doc, "a");
        doc.set_attr(link, "href", "/c/abc");
        doc.append_child(body, link);
        doc.remove(link);
        assert_eq!(doc.attr(link, "href"), Some("/c/abc"));
        assert!(!doc.is_connected(link));
    }

    #[test]
    fn text_content_concatenates_descendants() {
        let mut doc = Document::new();
        let div = element(&mut doc, "div");
        let span = element(&mut doc, "span");
        let hello = doc.create_text("Hello ", Owner::Host);
        let world = doc.create_text("world", Owner::Host);
        doc.append_child(div, hello);
        doc.append_child(div, span);
        doc.append_child(span, world);
        assert_eq!(doc.text_content(div), "Hello world");

        doc.set_text(div, "Replaced");
        assert_eq!(doc.text_content(div), "Replaced");
    }

    #[test]
    fn deep_clone_copies_attributes_but_not_listeners() {
        let mut doc = Document::new();
        let link = element(&mut doc, "a");
        doc.set_attr(link, "href", "/c/abc");
        doc.add_class(link, "__menu-item");
        doc.add_listener(
            link,
            Registration::new(EventKind::Click, Phase::Bubble, Handler::StopPropagation),
        );
        let span = element(&mut doc, "span");
        doc.append_child(link, span);

        let copy = doc.deep_clone(link);
        assert_ne!(copy, link);
        assert_eq!(doc.attr(copy, "href"), Some("/c/abc"));
        assert!(doc.has_class(copy, "__menu-item"));
        assert!(doc.listeners(copy).is_empty());
        assert_eq!(doc.owner(copy), Owner::Extension);
        assert_eq!(doc.children(copy).len(), 1);
        assert_ne!(doc.children(copy)[0], span);
    }

    #[test]
    fn detached_extension_nodes_are_reused() {
        let mut doc = Document::new();
        let body = doc.body();
        let list = doc.create_element("ul", Owner::Extension);
        doc.append_child(body, list);

        for round in 0..100 {
            doc.clear_children(list);
            let item = doc.create_element("li", Owner::Extension);
            doc.append_child(list, item);
            doc.set_text(item, &round.to_string());
            doc.take_mutations();
        }

        // body, list, one item with its text, plus the previous round
        // awaiting release.
        assert!(doc.node_count() <= 6, "{} nodes", doc.node_count());
        assert_eq!(doc.text_content(list), "99");
    }

    #[test]
    fn removed_nodes_survive_the_batch_that_reports_them() {
        let mut doc = Document::new();
        let body = doc.body();
        let item = doc.create_element("li", Owner::Extension);
        doc.set_attr(item, "href", "/c/abc");
        doc.append_child(body, item);
        doc.take_mutations();

        doc.remove(item);
        let records = doc.take_mutations();
        assert_eq!(records[0].removed, vec![item]);
        let other = doc.create_element("div", Owner::Extension);
        assert_ne!(other, item);
        assert_eq!(doc.attr(item, "href"), Some("/c/abc"));
    }

    #[test]
    fn reattached_extension_nodes_are_kept() {
        let mut doc = Document::new();
        let body = doc.body();
        let section = doc.create_element("div", Owner::Extension);
        doc.append_child(body, section);
        doc.remove(section);
        doc.take_mutations();
        doc.append_child(body, section);
        doc.take_mutations();
        doc.take_mutations();
        assert!(doc.is_connected(section));
        assert_eq!(doc.node_count(), 2);
    }

    #[test]
    fn detached_host_nodes_are_never_released() {
        let mut doc = Document::new();
        let body = doc.body();
        let link = element(&mut doc, "a");
        doc.append_child(body, link);
        doc.remove(link);
        doc.take_mutations();
        doc.take_mutations();
        assert_eq!(doc.node_count(), 2);
    }

    #[test]
    fn closest_includes_the_node_itself() {
        let mut doc = Document::new();
        let link = element(&mut doc, "a");
        let span = element(&mut doc, "span");
        doc.append_child(link, span);
        assert_eq!(doc.closest(span, &Selector::tag("a")), Some(link));
        assert_eq!(doc.closest(link, &Selector::tag("a")), Some(link));
        assert_eq!(doc.closest(span, &Selector::tag("nav")), None);
    }
}
