//! Identity extraction: conversation id from a link target.

use std::sync::OnceLock;

use regex::Regex;

use crate::pins::ConversationId;

fn conversation_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/c/([a-f0-9-]+)").expect("valid regex"))
}

/// Extract the conversation id following `/c/` in `target`.
///
/// `target` may be a path or a full URL. `None` means the target is not a
/// conversation link and the element should be skipped.
pub fn extract_id(target: &str) -> Option<ConversationId> {
    conversation_path_re()
        .captures(target)
        .and_then(|caps| caps.get(1))
        .and_then(|m| ConversationId::parse(m.as_str()))
}
