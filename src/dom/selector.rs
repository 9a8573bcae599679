//! Typed element selectors.
//!
//! Covers the subset of CSS selector features the host markup contract
//! needs, built with constructors instead of parsed from strings.

use super::{Document, NodeId};

/// Attribute predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
}

/// Element selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Tag(String),
    Id(String),
    Class(String),
    Attr(String, AttrOp),
    /// Every selector matches (compound selector).
    And(Vec<Selector>),
    /// Any selector matches (selector list).
    Or(Vec<Selector>),
    Not(Box<Selector>),
    /// `target` with an ancestor matching `ancestor`.
    Descendant {
        ancestor: Box<Selector>,
        target: Box<Selector>,
    },
    /// `target` whose parent matches `parent`.
    Child {
        parent: Box<Selector>,
        target: Box<Selector>,
    },
}

impl Selector {
    pub fn tag(tag: &str) -> Self {
        Selector::Tag(tag.to_ascii_lowercase())
    }

    pub fn id(id: &str) -> Self {
        Selector::Id(id.to_string())
    }

    pub fn class(class: &str) -> Self {
        Selector::Class(class.to_string())
    }

    pub fn attr(name: &str) -> Self {
        Selector::Attr(name.to_string(), AttrOp::Exists)
    }

    pub fn attr_eq(name: &str, value: &str) -> Self {
        Selector::Attr(name.to_string(), AttrOp::Equals(value.to_string()))
    }

    pub fn attr_contains(name: &str, value: &str) -> Self {
        Selector::Attr(name.to_string(), AttrOp::Contains(value.to_string()))
    }

    pub fn and(self, other: Selector) -> Self {
        match self {
            Selector::And(mut parts) => {
                parts.push(other);
                Selector::And(parts)
            }
            first => Selector::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Selector) -> Self {
        match self {
            Selector::Or(mut parts) => {
                parts.push(other);
                Selector::Or(parts)
            }
            first => Selector::Or(vec![first, other]),
        }
    }

    /// `self:not(other)`
    pub fn excluding(self, other: Selector) -> Self {
        self.and(Selector::Not(Box::new(other)))
    }

    /// `ancestor self`
    pub fn within(self, ancestor: Selector) -> Self {
        Selector::Descendant {
            ancestor: Box::new(ancestor),
            target: Box::new(self),
        }
    }

    /// `parent > self`
    pub fn child_of(self, parent: Selector) -> Self {
        Selector::Child {
            parent: Box::new(parent),
            target: Box::new(self),
        }
    }

    /// Whether element `node` of `doc` matches. Text nodes never match.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(tag) = doc.tag(node) else {
            return false;
        };
        match self {
            Selector::Tag(expected) => tag == expected,
            Selector::Id(expected) => doc.attr(node, "id") == Some(expected.as_str()),
            Selector::Class(class) => doc.has_class(node, class),
            Selector::Attr(name, op) => match (doc.attr(node, name), op) {
                (None, _) => false,
                (Some(_), AttrOp::Exists) => true,
                (Some(value), AttrOp::Equals(expected)) => value == expected,
                (Some(value), AttrOp::Contains(needle)) => value.contains(needle.as_str()),
            },
            Selector::And(parts) => parts.iter().all(|s| s.matches(doc, node)),
            Selector::Or(parts) => parts.iter().any(|s| s.matches(doc, node)),
            Selector::Not(inner) => !inner.matches(doc, node),
            Selector::Descendant { ancestor, target } => {
                if !target.matches(doc, node) {
                    return false;
                }
                let mut current = doc.parent(node);
                while let Some(parent) = current {
                    if ancestor.matches(doc, parent) {
                        return true;
                    }
                    current = doc.parent(parent);
                }
                false
            }
            Selector::Child { parent, target } => {
                target.matches(doc, node)
                    && doc.parent(node).is_some_and(|p| parent.matches(doc, p))
            }
        }
    }
}
