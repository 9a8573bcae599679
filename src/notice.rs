//! Transient notices rendered into the page.
//!
//! Notices expire on their own and at most a few are kept at once; the
//! oldest is dropped when a new one would exceed the limit.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    /// Saving the pinned list failed.
    Warning,
    /// The pin limit was reached.
    Error,
}

impl NoticeKind {
    /// Class used when the notice is rendered into the page.
    pub fn css_class(&self) -> &'static str {
        match self {
            NoticeKind::Info => "chatpin-info",
            NoticeKind::Warning => "save-error",
            NoticeKind::Error => "pin-limit-error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub id: u64,
    pub message: String,
    pub kind: NoticeKind,
    pub created_at: u64,
    pub duration_ms: u64,
}

impl Notice {
    pub fn new(id: u64, message: impl Into<String>, kind: NoticeKind, now: u64) -> Self {
        Self {
            id,
            message: message.into(),
            kind,
            created_at: now,
            duration_ms: 3000,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) >= self.duration_ms
    }

    pub fn remaining_ms(&self, now: u64) -> u64 {
        self.duration_ms
            .saturating_sub(now.saturating_sub(self.created_at))
    }
}

/// Transient, non-blocking notices shown to the user.
pub struct NoticeManager {
    queue: VecDeque<Notice>,
    next_id: u64,
    max_visible: usize,
}

impl NoticeManager {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            next_id: 1,
            max_visible: 3,
        }
    }

    pub fn push(&mut self, message: impl Into<String>, kind: NoticeKind, now: u64) {
        self.push_for(message, kind, now, 3000);
    }

    pub fn push_for(
        &mut self,
        message: impl Into<String>,
        kind: NoticeKind,
        now: u64,
        duration_ms: u64,
    ) {
        let notice = Notice::new(self.next_id, message, kind, now).with_duration(duration_ms);
        self.next_id = self.next_id.wrapping_add(1);
        self.queue.push_back(notice);
        self.trim_queue();
    }

    fn trim_queue(&mut self) {
        // Keep only max_visible notices
        while self.queue.len() > self.max_visible {
            self.queue.pop_front();
        }
    }

    /// Drop expired notices. Returns whether anything was removed.
    pub fn update(&mut self, now: u64) -> bool {
        let before = self.queue.len();
        self.queue.retain(|n| !n.is_expired(now));
        self.queue.len() != before
    }

    pub fn visible(&self) -> Vec<&Notice> {
        self.queue.iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for NoticeManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_expire_after_their_duration() {
        let mut notices = NoticeManager::new();
        notices.push_for("Pin limit reached", NoticeKind::Error, 1_000, 4_000);
        notices.push("Could not save", NoticeKind::Warning, 1_000);

        assert!(!notices.update(3_999));
        assert!(notices.update(4_000));
        let visible = notices.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].kind, NoticeKind::Error);
        assert_eq!(visible[0].remaining_ms(4_000), 1_000);

        assert!(notices.update(5_000));
        assert!(notices.is_empty());
    }

    #[test]
    fn queue_keeps_most_recent_notices() {
        let mut notices = NoticeManager::new();
        for n in 0..5 {
            notices.push(format!("notice {n}"), NoticeKind::Info, 0);
        }
        let messages: Vec<&str> = notices.visible().iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["notice 2", "notice 3", "notice 4"]);
    }
}
