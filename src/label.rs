//! Best-effort conversation title scraping.
//!
//! The host renders titles in a handful of shapes depending on release. We
//! try the known shapes in priority order and fall back to the element's
//! visible text.

use std::sync::OnceLock;

use regex::Regex;

use crate::dom::{Document, NodeId, Selector};

const MAX_LABEL_CHARS: usize = 200;
const FALLBACK_MIN_CHARS: usize = 4;
const FALLBACK_MAX_CHARS: usize = 99;

const ICON_GLYPHS: &[&str] = &["📌", "📍", "…", "⋯", "...", "×", "✕", "✎", "🗑"];
const SENTINELS: &[&str] = &["new chat", "new conversation", "untitled", "chats"];

/// Title selectors, most specific first.
fn title_selectors() -> &'static [Selector] {
    static SELECTORS: OnceLock<Vec<Selector>> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        vec![
            Selector::tag("span").and(Selector::attr("data-title")),
            Selector::class("text-sm"),
            Selector::attr_eq("data-testid", "conversation-title"),
            Selector::tag("span").and(Selector::attr_eq("dir", "auto")),
            Selector::class("truncate"),
            Selector::tag("span").child_of(Selector::tag("div").child_of(Selector::tag("div"))),
        ]
    })
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:[0-9]+|[a-f0-9-]{8,})$").expect("valid regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"))
}

fn collapse(text: &str) -> String {
    whitespace_re().replace_all(text.trim(), " ").into_owned()
}

/// Pure numbers and hex-like ids containing a digit.
fn looks_like_identifier(text: &str) -> bool {
    identifier_re().is_match(text) && text.bytes().any(|b| b.is_ascii_digit())
}

fn acceptable(text: &str) -> bool {
    let len = text.chars().count();
    if len == 0 || len > MAX_LABEL_CHARS {
        return false;
    }
    if ICON_GLYPHS.contains(&text) || looks_like_identifier(text) {
        return false;
    }
    let lower = text.to_lowercase();
    !SENTINELS.contains(&lower.as_str())
}

/// The node inside `element` that carries its title, if a known shape
/// matches.
pub fn title_node(doc: &Document, element: NodeId) -> Option<NodeId> {
    title_selectors().iter().find_map(|selector| {
        doc.query_all(element, selector)
            .into_iter()
            .find(|node| acceptable(&collapse(&doc.text_content(*node))))
    })
}

/// Scrape a display title for the conversation rendered at `element`.
///
/// `None` when nothing qualifies; callers substitute the placeholder.
pub fn extract_label(doc: &Document, element: NodeId) -> Option<String> {
    if let Some(node) = title_node(doc, element) {
        return Some(collapse(&doc.text_content(node)));
    }

    doc.text_content(element)
        .lines()
        .map(collapse)
        .find(|fragment| {
            let len = fragment.chars().count();
            (FALLBACK_MIN_CHARS..=FALLBACK_MAX_CHARS).contains(&len) && acceptable(fragment)
        })
}
