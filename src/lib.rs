//! chatpin library crate.
//!
//! This library provides the pinned-conversations engine for a chat web app
//! sidebar, including:
//! - Conversation identity and label extraction from host markup
//! - Pin state with persistence and a hard capacity
//! - A debounced mutation watcher and the reconciliation engine
//! - The message relay between content script, popup and background

pub mod config;
pub mod content;
pub mod dom;
pub mod engine;
pub mod error;
pub mod export;
pub mod identity;
pub mod label;
pub mod logging;
pub mod navigation;
pub mod notice;
pub mod pins;
pub mod popup;
pub mod relay;
pub mod store;
pub mod view;
pub mod watcher;
