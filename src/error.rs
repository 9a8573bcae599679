//! Error taxonomy shared across the pin engine.
//!
//! Nothing in this crate is fatal to the host page. Every variant here maps to
//! a degraded-but-working outcome: a refused pin, a stale store, a placeholder
//! label.

use thiserror::Error;

/// Failures of the persistent key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Recoverable conditions raised by pin operations.
#[derive(Debug, Error)]
pub enum PinError {
    /// The pinned set is already at capacity; state is unchanged.
    #[error("pin limit reached ({capacity} max)")]
    CapacityExceeded { capacity: usize },

    /// The in-memory change stands but could not be written.
    #[error("could not persist pinned chats: {0}")]
    Persistence(#[from] StoreError),

    /// No peer answered within the bounded wait.
    #[error("peer unavailable: {0}")]
    PeerUnavailable(#[from] RelayError),

    /// A single stored entry could not be understood and was skipped.
    #[error("malformed stored entry at index {index}: {reason}")]
    MalformedStoredData { index: usize, reason: String },
}

/// Ways a cross-context request can go unanswered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("no tab matches {0}")]
    NoMatchingTab(String),

    #[error("no response within {0} ms")]
    Timeout(u64),

    #[error("peer disconnected")]
    Disconnected,

    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}
