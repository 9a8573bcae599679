//! Read-only view of the externally owned conversation list.

use crate::dom::NodeId;
use crate::pins::ConversationId;

/// A host conversation element currently rendered in the sidebar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleConversation {
    pub id: ConversationId,
    pub node: NodeId,
}

/// What the engine needs to know about the host page.
///
/// Results are snapshots: the host may replace the nodes at any time, so
/// callers re-query instead of holding on to them across passes.
pub trait ExternalView {
    /// Every rendered host conversation element, in document order.
    fn list_visible_conversations(&self) -> Vec<VisibleConversation>;

    /// The rendered host element for `id`, if any.
    fn find_conversation_by_id(&self, id: &ConversationId) -> Option<NodeId>;

    /// Current location path (for example `/c/abc123`).
    fn current_location(&self) -> String;
}
