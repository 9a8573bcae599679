//! Host markup contract.
//!
//! Every structural assumption about the chat application's sidebar lives
//! here. When the host changes its markup, this file changes; the engine
//! does not.

use super::Selector;

// Host markup.
pub const HISTORY_ID: &str = "history";
pub const MENU_ITEM_CLASS: &str = "__menu-item";
pub const MENU_LABEL_CLASS: &str = "__menu-label";
pub const TRAILING_CLASS: &str = "trailing";
pub const CONVERSATION_PATH: &str = "/c/";
pub const CHAT_ID_ATTR: &str = "data-chat-id";

// Injected markup.
pub const PINNED_SECTION_ID: &str = "pinned-chats-section";
pub const PINNED_SECTION_CLASS: &str = "pinned-chats-section";
pub const PINNED_HEADER_CLASS: &str = "pinned-header";
pub const PINNED_LIST_ID: &str = "pinned-chats-list";
pub const PINNED_LIST_CLASS: &str = "pinned-chats-list";
pub const PINNED_COUNT_ID: &str = "pinned-section-count";
pub const PIN_BUTTON_CLASS: &str = "pin-button";
pub const PINNED_CLASS: &str = "pinned";
pub const MIRROR_CLASS: &str = "pinned-chat-item";
pub const HOVERABLE_CLASS: &str = "hoverable";
pub const PINNED_HIGHLIGHT_CLASS: &str = "chat-item-pinned";
pub const ACTIVE_CLASS: &str = "active";
pub const NOTICE_CONTAINER_ID: &str = "chatpin-notices";

pub const PINNED_GLYPH: &str = "📌";
pub const UNPINNED_GLYPH: &str = "📍";
pub const PIN_TITLE: &str = "Pin this chat";
pub const UNPIN_TITLE: &str = "Unpin this chat";

/// `a[href*="/c/"]`
pub fn conversation_link() -> Selector {
    Selector::tag("a").and(Selector::attr_contains("href", CONVERSATION_PATH))
}

/// Anything that looks like a conversation link or list item.
pub fn conversation_like() -> Selector {
    conversation_link().or(Selector::class(MENU_ITEM_CLASS))
}

/// Host conversation links: inside the history root, never our mirrors.
pub fn host_conversation_link() -> Selector {
    conversation_link()
        .excluding(Selector::class(MIRROR_CLASS))
        .and(Selector::Not(Box::new(
            Selector::tag("a").within(Selector::id(PINNED_SECTION_ID)),
        )))
        .within(Selector::id(HISTORY_ID))
}

/// Host link pointing exactly at `href`.
pub fn host_link_with_href(href: &str) -> Selector {
    host_conversation_link().and(Selector::attr_eq("href", href))
}

/// Host link carrying `data-chat-id="<id>"`.
pub fn host_link_with_chat_id(chat_id: &str) -> Selector {
    Selector::tag("a")
        .and(Selector::attr_eq(CHAT_ID_ATTR, chat_id))
        .excluding(Selector::class(MIRROR_CLASS))
        .within(Selector::id(HISTORY_ID))
}

/// Container the pinned section is inserted into: `#history aside`.
pub fn sidebar() -> Selector {
    Selector::tag("aside").within(Selector::id(HISTORY_ID))
}

/// Any marker showing the sidebar has rendered.
pub fn sidebar_ready() -> Selector {
    sidebar()
        .or(Selector::attr_eq("data-testid", "history-list"))
        .or(Selector::tag("nav").and(Selector::attr_eq("aria-label", "Chat history")))
}

pub fn trailing() -> Selector {
    Selector::class(TRAILING_CLASS)
}

pub fn pin_button() -> Selector {
    Selector::class(PIN_BUTTON_CLASS)
}

/// Interactive host controls stripped from mirrors. The pin toggle is the
/// single exception.
pub fn stripped_control() -> Selector {
    Selector::tag("button")
        .or(Selector::attr_eq("role", "button"))
        .or(Selector::attr_eq("role", "menuitem"))
        .or(Selector::attr("aria-haspopup"))
        .or(Selector::tag("input"))
        .excluding(pin_button())
}
