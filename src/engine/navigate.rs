//! Navigation for mirror elements.
//!
//! Mirrors live outside the host router's delegation root, so a plain click
//! on one would reload the page. Resolution order:
//!
//! 1. click the still-rendered host link with the same `href`;
//! 2. click a host link carrying the conversation's `data-chat-id`;
//! 3. update the location by hand, announce it, and fall back to a full
//!    page load if the location has not settled on the target by the
//!    deadline.

use crate::dom::markup;
use crate::dom::{Page, Window, WindowEvent};

/// A manual navigation awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNavigation {
    pub href: String,
    pub deadline: u64,
}

impl PendingNavigation {
    pub fn is_due(&self, now: u64) -> bool {
        now >= self.deadline
    }

    /// Load `href` in full unless the location already reached it. Returns
    /// whether a full load happened.
    pub fn resolve(self, window: &mut Window) -> bool {
        if window.location() == self.href {
            return false;
        }
        tracing::debug!("Client-side navigation to {} failed, loading directly", self.href);
        window.assign(&self.href);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorNavigation {
    /// Host link with the same target was clicked.
    HostLink,
    /// Host link found by its data identifier was clicked.
    DataIdentifier,
    /// Location was updated by hand.
    Manual(PendingNavigation),
}

fn chat_id_from_href(href: &str) -> Option<&str> {
    href.split(markup::CONVERSATION_PATH)
        .nth(1)
        .filter(|id| !id.is_empty())
}

pub fn navigate(page: &mut Page, href: &str, now: u64, fallback_ms: u64) -> MirrorNavigation {
    let body = page.document.body();

    if let Some(link) = page.document.query(body, &markup::host_link_with_href(href)) {
        tracing::debug!("Found original chat element for {}, clicking it", href);
        page.click(link);
        return MirrorNavigation::HostLink;
    }

    let chat_id = chat_id_from_href(href).map(str::to_string);
    if let Some(id) = &chat_id {
        if let Some(link) = page.document.query(body, &markup::host_link_with_chat_id(id)) {
            tracing::debug!("Found original chat by data id {}, clicking it", id);
            page.click(link);
            return MirrorNavigation::DataIdentifier;
        }
    }

    tracing::debug!("Navigating to {} through the history API", href);
    page.window.push_state(href);
    page.window.dispatch_event(WindowEvent::NavigationIntent {
        href: href.to_string(),
        chat_id,
    });
    page.window.dispatch_event(WindowEvent::PopState);
    MirrorNavigation::Manual(PendingNavigation {
        href: href.to_string(),
        deadline: now + fallback_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{fixture, Owner};

    #[test]
    fn prefers_the_rendered_host_link() {
        let mut page = fixture::host_page(&[("aa11", "First")]);
        let result = navigate(&mut page, "/c/aa11", 0, 100);

        assert_eq!(result, MirrorNavigation::HostLink);
        assert_eq!(page.window.location(), "/c/aa11");
        assert!(page.window.full_loads().is_empty());
    }

    #[test]
    fn falls_back_to_data_identifier() {
        let mut page = fixture::host_page(&[]);
        let aside = fixture::sidebar(&page).unwrap();
        let doc = &mut page.document;
        let link = doc.create_element("a", Owner::Host);
        doc.set_attr(link, "href", "/chat?id=bb22");
        doc.set_attr(link, markup::CHAT_ID_ATTR, "bb22");
        doc.append_child(aside, link);

        let result = navigate(&mut page, "/c/bb22", 0, 100);

        assert_eq!(result, MirrorNavigation::DataIdentifier);
        assert_eq!(page.window.location(), "/chat?id=bb22");
    }

    #[test]
    fn manual_navigation_announces_itself() {
        let mut page = fixture::host_page(&[]);
        let result = navigate(&mut page, "/c/cc33", 1_000, 100);

        assert_eq!(
            result,
            MirrorNavigation::Manual(PendingNavigation {
                href: "/c/cc33".into(),
                deadline: 1_100
            })
        );
        assert_eq!(page.window.location(), "/c/cc33");
        assert_eq!(
            page.window.events(),
            &[
                WindowEvent::NavigationIntent {
                    href: "/c/cc33".into(),
                    chat_id: Some("cc33".into())
                },
                WindowEvent::PopState
            ]
        );
    }

    #[test]
    fn pending_navigation_loads_in_full_when_location_moved_elsewhere() {
        let mut page = fixture::host_page(&[]);
        let MirrorNavigation::Manual(pending) = navigate(&mut page, "/c/cc33", 0, 100) else {
            panic!("expected manual navigation");
        };
        page.window.replace_state("/");

        assert!(!pending.is_due(99));
        assert!(pending.is_due(100));
        assert!(pending.clone().resolve(&mut page.window));
        assert_eq!(page.window.full_loads(), &["/c/cc33".to_string()]);
        assert!(!pending.resolve(&mut page.window));
    }
}
