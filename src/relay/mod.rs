//! Cross-context relay: the content script of each host tab, the popup and
//! the background coordinator talk only through messages.

/// Origin the content script runs on.
pub const HOST_URL: &str = "https://chatgpt.com/";

pub mod background;
pub mod client;
pub mod hub;
pub mod protocol;

pub use background::{Background, InstallReason};
pub use client::RelayClient;
pub use hub::{ContextKind, Envelope, Hub, Port, TabId, TabInfo};
pub use protocol::{Message, Response};
