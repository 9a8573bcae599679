//! Request side of the relay, used by the popup.
//!
//! Each request goes to the first tab on the host origin and waits a bounded
//! time for the content script to answer. Every way of not getting an
//! answer comes back as a [`RelayError`]; callers fall back to cached data.

use std::collections::BTreeMap;
use std::time::Duration;

use super::hub::{await_response, Hub, TabId};
use super::protocol::{Message, Response};
use crate::error::RelayError;

pub struct RelayClient {
    hub: Hub,
    /// URL prefix of tabs the content script runs in.
    host_prefix: String,
    timeout: Duration,
}

impl RelayClient {
    pub fn new(hub: Hub, host_prefix: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            hub,
            host_prefix: host_prefix.into(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn target_tab(&self) -> Result<TabId, RelayError> {
        self.hub
            .query_tabs(&self.host_prefix)
            .first()
            .map(|tab| tab.id)
            .ok_or_else(|| RelayError::NoMatchingTab(self.host_prefix.clone()))
    }

    /// Send a request and wait for the response.
    fn request(&self, message: Message) -> Result<Response, RelayError> {
        let action = message.action();
        let tab = self.target_tab()?;
        let rx = self.hub.send_to_tab(tab, message)?;
        let response = await_response(&rx, self.timeout)?;
        if let Response::Error { error } = &response {
            tracing::debug!("{} failed in content script: {}", action, error);
            return Err(RelayError::UnexpectedResponse(action));
        }
        Ok(response)
    }

    pub fn get_pinned_chats(&self) -> Result<Vec<String>, RelayError> {
        match self.request(Message::GetPinnedChats)? {
            Response::PinnedChats { pinned_chats } => Ok(pinned_chats),
            _ => Err(RelayError::UnexpectedResponse("getPinnedChats")),
        }
    }

    pub fn get_all_chat_titles(&self) -> Result<BTreeMap<String, String>, RelayError> {
        match self.request(Message::GetAllChatTitles)? {
            Response::Titles { titles } => Ok(titles),
            _ => Err(RelayError::UnexpectedResponse("getAllChatTitles")),
        }
    }

    pub fn get_chat_title(&self, chat_id: &str) -> Result<String, RelayError> {
        let req = Message::GetChatTitle {
            chat_id: chat_id.to_string(),
        };
        match self.request(req)? {
            Response::Title { title } => Ok(title),
            _ => Err(RelayError::UnexpectedResponse("getChatTitle")),
        }
    }

    /// Tell every host tab about a change without waiting. Returns how many
    /// content scripts took the notification.
    fn notify_tabs(&self, message: Message) -> usize {
        let mut delivered = 0;
        for tab in self.hub.query_tabs(&self.host_prefix) {
            match self.hub.notify_tab(tab.id, message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!("Content script not available on tab {}: {}", tab.id, e),
            }
        }
        delivered
    }

    pub fn notify_unpinned(&self, chat_id: &str) -> usize {
        self.notify_tabs(Message::ChatUnpinned {
            chat_id: chat_id.to_string(),
        })
    }

    pub fn notify_all_unpinned(&self) -> usize {
        self.notify_tabs(Message::AllChatsUnpinned)
    }
}
