//! Pinned conversations: identifiers, entries and the per-context pin state.
//!
//! A pin references a conversation by the opaque id taken from its URL and
//! carries a best-effort display label scraped from the sidebar.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod manager;
pub mod stored;

pub use manager::PinStateManager;
pub use stored::StoredEntry;

/// Maximum number of simultaneous pins.
pub const CAPACITY: usize = 10;

/// Opaque conversation identifier (lowercase hex digits and hyphens).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Accept `raw` only if it is non-empty and entirely `[a-f0-9-]`.
    pub fn parse(raw: &str) -> Option<Self> {
        if !raw.is_empty()
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b) || b == b'-')
        {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, used for placeholders and short URLs.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map_or(self.0.len(), |(idx, _)| idx);
        &self.0[..end]
    }

    /// Path the host application routes this conversation under.
    pub fn path(&self) -> String {
        format!("/c/{}", self.0)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic label used whenever no real title can be scraped.
pub fn placeholder_label(id: &ConversationId) -> String {
    format!("Chat {}", id.short())
}

/// A pinned conversation with its cached display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinEntry {
    pub id: ConversationId,
    pub label: String,
}

impl PinEntry {
    pub fn new(id: ConversationId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }

    /// Entry whose label is the placeholder for its id.
    pub fn placeholder(id: ConversationId) -> Self {
        let label = placeholder_label(&id);
        Self { id, label }
    }

    pub fn has_placeholder_label(&self) -> bool {
        self.label == placeholder_label(&self.id)
    }
}
