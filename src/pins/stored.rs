//! Storage encodings of the pinned list.
//!
//! Two historical shapes live under the pinned-items key: a bare list of ids
//! (oldest releases) and a list of `{id, title}` objects. Both are decoded here
//! and nowhere else; the rest of the crate only sees [`PinEntry`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ConversationId, PinEntry};
use crate::error::PinError;

/// One element of the stored pinned list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredEntry {
    /// Bare conversation id.
    Legacy(String),
    /// Id with a cached title. `label` is accepted as an alias.
    Titled {
        id: String,
        #[serde(default, alias = "label", skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

impl StoredEntry {
    fn normalize(self) -> Result<PinEntry, String> {
        let (raw_id, title) = match self {
            StoredEntry::Legacy(id) => (id, None),
            StoredEntry::Titled { id, title } => (id, title),
        };
        let id = ConversationId::parse(&raw_id)
            .ok_or_else(|| format!("not a conversation id: {raw_id:?}"))?;
        Ok(match title.map(|t| t.trim().to_string()) {
            Some(title) if !title.is_empty() => PinEntry::new(id, title),
            _ => PinEntry::placeholder(id),
        })
    }
}

impl From<&PinEntry> for StoredEntry {
    fn from(entry: &PinEntry) -> Self {
        StoredEntry::Titled {
            id: entry.id.as_str().to_string(),
            title: Some(entry.label.clone()),
        }
    }
}

/// Result of decoding a stored pinned list.
#[derive(Debug, Default)]
pub struct Decoded {
    /// Valid entries in stored order, unique by id.
    pub entries: Vec<PinEntry>,
    /// Entries that were skipped.
    pub skipped: Vec<PinError>,
}

/// Decode whatever is stored under the pinned key.
///
/// A missing or non-array value decodes to an empty list. Individual entries
/// that fail to decode are skipped and reported; duplicates keep the first
/// occurrence.
pub fn decode_pinned(value: Option<&Value>) -> Decoded {
    let mut decoded = Decoded::default();
    let items = match value {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => return decoded,
        Some(other) => {
            decoded.skipped.push(PinError::MalformedStoredData {
                index: 0,
                reason: format!("expected a list, found {other}"),
            });
            return decoded;
        }
    };

    let mut seen = HashSet::new();
    for (index, item) in items.iter().enumerate() {
        let entry = serde_json::from_value::<StoredEntry>(item.clone())
            .map_err(|e| e.to_string())
            .and_then(StoredEntry::normalize);
        match entry {
            Ok(entry) => {
                if seen.insert(entry.id.clone()) {
                    decoded.entries.push(entry);
                }
            }
            Err(reason) => {
                decoded
                    .skipped
                    .push(PinError::MalformedStoredData { index, reason });
            }
        }
    }
    decoded
}

/// Encode entries in the current `{id, title}` shape.
pub fn encode_pinned(entries: &[PinEntry]) -> Value {
    let stored: Vec<StoredEntry> = entries.iter().map(StoredEntry::from).collect();
    serde_json::to_value(stored).unwrap_or(Value::Array(Vec::new()))
}
