//! Export of the pinned list as a standalone JSON document.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::pins::ConversationId;
use crate::relay::HOST_URL;

/// Name recorded in every export.
pub const EXTENSION_NAME: &str = "ChatGPT Pin Chats";

/// One exported conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedChat {
    pub id: String,
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub extension: String,
    pub version: String,
    /// ISO-8601 timestamp with millisecond precision.
    pub exported: String,
    #[serde(rename = "pinnedChats")]
    pub pinned_chats: Vec<ExportedChat>,
}

impl ExportDocument {
    /// Build an export of `chats` (id and display title, in pinned order).
    pub fn new<'a, I>(chats: I, exported_at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (&'a ConversationId, String)>,
    {
        Self {
            extension: EXTENSION_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported: exported_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            pinned_chats: chats
                .into_iter()
                .map(|(id, title)| ExportedChat {
                    id: id.to_string(),
                    url: conversation_url(id),
                    title,
                })
                .collect(),
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Suggested file name, dated by the export day.
    pub fn file_name(&self) -> String {
        let day = self.exported.split('T').next().unwrap_or_default();
        format!("chatgpt-pinned-chats-{day}.json")
    }
}

/// Absolute URL of a conversation on the host.
pub fn conversation_url(id: &ConversationId) -> String {
    format!("{}{}", HOST_URL.trim_end_matches('/'), id.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn id(raw: &str) -> ConversationId {
        ConversationId::parse(raw).unwrap()
    }

    #[test]
    fn document_lists_chats_with_urls_in_order() {
        let a = id("abc123de-0001");
        let b = id("ff00");
        let at = Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap();
        let doc = ExportDocument::new([(&a, "Trip".to_string()), (&b, "Chat ff00".to_string())], at);

        assert_eq!(doc.extension, EXTENSION_NAME);
        assert_eq!(doc.exported, "2026-10-17T09:30:00.000Z");
        assert_eq!(doc.pinned_chats.len(), 2);
        assert_eq!(doc.pinned_chats[0].url, "https://chatgpt.com/c/abc123de-0001");
        assert_eq!(doc.pinned_chats[1].title, "Chat ff00");
        assert_eq!(doc.file_name(), "chatgpt-pinned-chats-2026-10-17.json");
    }

    #[test]
    fn json_uses_host_field_names() {
        let a = id("aa11");
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let json = ExportDocument::new([(&a, "A".to_string())], at)
            .to_json_pretty()
            .unwrap();

        assert!(json.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["pinnedChats"][0]["id"], "aa11");
        assert_eq!(value["pinnedChats"][0]["url"], "https://chatgpt.com/c/aa11");
        assert!(value["version"].is_string());
    }

    #[test]
    fn empty_export_is_valid() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let doc = ExportDocument::new(std::iter::empty::<(&ConversationId, String)>(), at);
        let parsed: ExportDocument = serde_json::from_str(&doc.to_json_pretty().unwrap()).unwrap();
        assert!(parsed.pinned_chats.is_empty());
    }
}
