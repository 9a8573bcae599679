//! Location-change observation.
//!
//! The host environment may offer a hook that reports every location change.
//! When it does not, [`LocationPoller`] compares the location against the last
//! value it saw on a fixed interval.

use std::sync::mpsc::{Receiver, TryRecvError};

use crate::dom::Window;

/// Polling fallback for environments without a navigation hook.
#[derive(Debug, Clone)]
pub struct LocationPoller {
    last: String,
    interval: u64,
    next_check: u64,
}

impl LocationPoller {
    pub fn new(initial: &str, interval_ms: u64, now: u64) -> Self {
        Self {
            last: initial.to_string(),
            interval: interval_ms.max(1),
            next_check: now + interval_ms.max(1),
        }
    }

    /// Compare `current` against the last known location, at most once per
    /// interval. Returns the new location when it changed.
    pub fn poll(&mut self, now: u64, current: &str) -> Option<String> {
        if now < self.next_check {
            return None;
        }
        self.next_check = now + self.interval;
        if current == self.last {
            return None;
        }
        self.last = current.to_string();
        Some(self.last.clone())
    }

    pub fn last(&self) -> &str {
        &self.last
    }
}

pub enum NavigationObserver {
    /// Changes pushed by the host environment. Polls every `fallback_ms` if
    /// the hook goes away.
    HostHook {
        rx: Receiver<String>,
        fallback_ms: u64,
    },
    /// Explicit polling fallback.
    Polling(LocationPoller),
}

impl NavigationObserver {
    /// Subscribe to `window`, falling back to polling every `poll_interval_ms`
    /// when it offers no hook.
    pub fn attach(window: &mut Window, poll_interval_ms: u64, now: u64) -> Self {
        match window.subscribe_navigation() {
            Some(rx) => NavigationObserver::HostHook {
                rx,
                fallback_ms: poll_interval_ms,
            },
            None => {
                tracing::debug!(
                    "No navigation hook available, polling location every {}ms",
                    poll_interval_ms
                );
                NavigationObserver::Polling(LocationPoller::new(
                    window.location(),
                    poll_interval_ms,
                    now,
                ))
            }
        }
    }

    pub fn is_polling(&self) -> bool {
        matches!(self, NavigationObserver::Polling(_))
    }

    /// The newest location since the previous call, if it changed.
    pub fn changed(&mut self, window: &Window, now: u64) -> Option<String> {
        let (rx, fallback_ms) = match self {
            NavigationObserver::HostHook { rx, fallback_ms } => (rx, *fallback_ms),
            NavigationObserver::Polling(poller) => return poller.poll(now, window.location()),
        };

        let mut latest = None;
        let mut disconnected = false;
        loop {
            match rx.try_recv() {
                Ok(location) => latest = Some(location),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        if disconnected {
            tracing::warn!("Navigation hook went away, switching to polling");
            *self = NavigationObserver::Polling(LocationPoller::new(
                window.location(),
                fallback_ms,
                now,
            ));
        }
        latest
    }
}
