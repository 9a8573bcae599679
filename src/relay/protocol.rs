//! Message schema shared by the content script, popup and background.
//!
//! Messages are JSON objects discriminated by `action`; responses are plain
//! objects whose single field identifies them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Messages exchanged between contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    /// popup → content: current pinned ids.
    GetPinnedChats,

    /// popup → content: titles of every pinned id.
    GetAllChatTitles,

    /// popup → content: title of one conversation.
    GetChatTitle {
        #[serde(rename = "chatId")]
        chat_id: String,
    },

    /// popup → content: the popup unpinned a conversation.
    ChatUnpinned {
        #[serde(rename = "chatId")]
        chat_id: String,
    },

    /// popup → content: the popup cleared every pin.
    AllChatsUnpinned,

    /// content → popup: the pinned set changed (notification, no reply).
    PinnedChatsUpdated {
        #[serde(rename = "pinnedChats")]
        pinned_chats: Vec<String>,
    },

    /// any → background: write the pinned list.
    SavePinnedChats {
        #[serde(rename = "pinnedChats")]
        pinned_chats: serde_json::Value,
    },

    /// any → background: log an error raised elsewhere.
    LogError { error: String },
}

impl Message {
    /// Wire name of the action, for logs and errors.
    pub fn action(&self) -> &'static str {
        match self {
            Message::GetPinnedChats => "getPinnedChats",
            Message::GetAllChatTitles => "getAllChatTitles",
            Message::GetChatTitle { .. } => "getChatTitle",
            Message::ChatUnpinned { .. } => "chatUnpinned",
            Message::AllChatsUnpinned => "allChatsUnpinned",
            Message::PinnedChatsUpdated { .. } => "pinnedChatsUpdated",
            Message::SavePinnedChats { .. } => "savePinnedChats",
            Message::LogError { .. } => "logError",
        }
    }
}

/// Replies to [`Message`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    PinnedChats {
        #[serde(rename = "pinnedChats")]
        pinned_chats: Vec<String>,
    },
    Titles {
        titles: BTreeMap<String, String>,
    },
    Title {
        title: String,
    },
    Success {
        success: bool,
    },
    Logged {
        logged: bool,
    },
    Error {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_use_action_tag_and_camel_case_fields() {
        let msg = Message::GetChatTitle {
            chat_id: "aa11".into(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"action": "getChatTitle", "chatId": "aa11"})
        );
        assert_eq!(
            serde_json::to_value(Message::AllChatsUnpinned).unwrap(),
            json!({"action": "allChatsUnpinned"})
        );
    }

    #[test]
    fn messages_parse_from_wire_json() {
        let msg: Message =
            serde_json::from_value(json!({"action": "pinnedChatsUpdated", "pinnedChats": ["aa11"]}))
                .unwrap();
        assert_eq!(
            msg,
            Message::PinnedChatsUpdated {
                pinned_chats: vec!["aa11".into()]
            }
        );
        assert_eq!(msg.action(), "pinnedChatsUpdated");
    }

    #[test]
    fn responses_are_identified_by_their_field() {
        let parse = |v| serde_json::from_value::<Response>(v).unwrap();
        assert!(matches!(
            parse(json!({"pinnedChats": []})),
            Response::PinnedChats { .. }
        ));
        assert!(matches!(
            parse(json!({"titles": {"aa11": "T"}})),
            Response::Titles { .. }
        ));
        assert_eq!(
            parse(json!({"title": "T"})),
            Response::Title { title: "T".into() }
        );
        assert_eq!(
            parse(json!({"success": true})),
            Response::Success { success: true }
        );
        assert_eq!(
            serde_json::to_value(Response::Error {
                error: "Unknown action".into()
            })
            .unwrap(),
            json!({"error": "Unknown action"})
        );
    }
}
