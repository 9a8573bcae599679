//! DOM mutation watcher.
//!
//! Turns bursts of child-list mutations into a single "reconcile now"
//! signal. Modelled as a small state machine over a logical clock:
//!
//! - `Idle`: nothing scheduled.
//! - `Pending`: a relevant batch arrived; reconcile once the settle delay
//!   passes without another relevant batch.
//! - `RateLimited`: a pass just ran; batches arriving before the quiet
//!   period ends are dropped, not queued.

use crate::config::TimingConfig;
use crate::dom::{markup, Document, MutationRecord, NodeId, Selector};

/// What a reconciliation pass should look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trigger {
    pub check_additions: bool,
    pub check_deletions: bool,
}

impl Trigger {
    pub const FULL: Trigger = Trigger {
        check_additions: true,
        check_deletions: true,
    };

    pub const ADDITIONS: Trigger = Trigger {
        check_additions: true,
        check_deletions: false,
    };

    pub fn is_relevant(&self) -> bool {
        self.check_additions || self.check_deletions
    }

    pub fn merge(self, other: Trigger) -> Trigger {
        Trigger {
            check_additions: self.check_additions || other.check_additions,
            check_deletions: self.check_deletions || other.check_deletions,
        }
    }
}

fn touches_conversation(doc: &Document, node: NodeId, selector: &Selector) -> bool {
    doc.is_element(node) && (selector.matches(doc, node) || doc.query(node, selector).is_some())
}

/// Classify one batch of mutation records.
pub fn classify(doc: &Document, batch: &[MutationRecord]) -> Trigger {
    let selector = markup::conversation_like();
    let mut trigger = Trigger::default();
    for record in batch {
        if !trigger.check_additions {
            trigger.check_additions = record
                .added
                .iter()
                .any(|n| touches_conversation(doc, *n, &selector));
        }
        if !trigger.check_deletions {
            trigger.check_deletions = record
                .removed
                .iter()
                .any(|n| touches_conversation(doc, *n, &selector));
        }
    }
    trigger
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Pending { deadline: u64, trigger: Trigger },
    RateLimited { until: u64 },
}

/// What happened to an observed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Arrived inside the quiet period; discarded.
    Dropped,
    /// Nothing conversation-related changed.
    Ignored,
    /// A pass is scheduled for `deadline`.
    Scheduled { deadline: u64 },
}

pub struct MutationWatcher {
    state: WatcherState,
    quiet_period: u64,
    settle_delay: u64,
}

impl MutationWatcher {
    pub fn new(quiet_period_ms: u64, settle_delay_ms: u64) -> Self {
        Self {
            state: WatcherState::Idle,
            quiet_period: quiet_period_ms,
            settle_delay: settle_delay_ms,
        }
    }

    pub fn from_config(timing: &TimingConfig) -> Self {
        Self::new(timing.quiet_period_ms, timing.settle_delay_ms)
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Observe a raw batch, classifying it only when it can matter.
    pub fn observe(&mut self, now: u64, doc: &Document, batch: &[MutationRecord]) -> BatchOutcome {
        if batch.is_empty() {
            return BatchOutcome::Ignored;
        }
        if self.is_rate_limited(now) {
            return BatchOutcome::Dropped;
        }
        self.on_batch(now, classify(doc, batch))
    }

    fn is_rate_limited(&self, now: u64) -> bool {
        matches!(self.state, WatcherState::RateLimited { until } if now < until)
    }

    /// Feed a classified batch observed at `now`.
    pub fn on_batch(&mut self, now: u64, trigger: Trigger) -> BatchOutcome {
        if self.is_rate_limited(now) {
            return BatchOutcome::Dropped;
        }
        if !trigger.is_relevant() {
            if let WatcherState::RateLimited { .. } = self.state {
                self.state = WatcherState::Idle;
            }
            return BatchOutcome::Ignored;
        }

        let merged = match self.state {
            WatcherState::Pending { trigger: earlier, .. } => earlier.merge(trigger),
            _ => trigger,
        };
        let deadline = now + self.settle_delay;
        self.state = WatcherState::Pending {
            deadline,
            trigger: merged,
        };
        BatchOutcome::Scheduled { deadline }
    }

    /// Advance the clock. Returns the trigger of a pass that is due now.
    pub fn on_timer(&mut self, now: u64) -> Option<Trigger> {
        match self.state {
            WatcherState::Pending { deadline, trigger } if now >= deadline => {
                self.state = WatcherState::RateLimited {
                    until: now + self.quiet_period,
                };
                Some(trigger)
            }
            WatcherState::RateLimited { until } if now >= until => {
                self.state = WatcherState::Idle;
                None
            }
            _ => None,
        }
    }

    /// When the next timer should fire, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        match self.state {
            WatcherState::Idle => None,
            WatcherState::Pending { deadline, .. } => Some(deadline),
            WatcherState::RateLimited { until } => Some(until),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{fixture, Owner};

    const REMOVAL: Trigger = Trigger {
        check_additions: false,
        check_deletions: true,
    };

    fn watcher() -> MutationWatcher {
        MutationWatcher::new(500, 200)
    }

    #[test]
    fn relevant_batch_schedules_after_settle_delay() {
        let mut w = watcher();
        assert_eq!(
            w.on_batch(1_000, Trigger::ADDITIONS),
            BatchOutcome::Scheduled { deadline: 1_200 }
        );
        assert_eq!(w.on_timer(1_199), None);
        assert_eq!(w.on_timer(1_200), Some(Trigger::ADDITIONS));
    }

    #[test]
    fn batches_within_delay_coalesce_and_restart_the_timer() {
        let mut w = watcher();
        w.on_batch(1_000, Trigger::ADDITIONS);
        w.on_batch(1_150, REMOVAL);

        assert_eq!(w.on_timer(1_200), None);
        assert_eq!(w.on_timer(1_350), Some(Trigger::FULL));
        assert_eq!(w.on_timer(1_400), None);
    }

    #[test]
    fn batches_inside_quiet_period_are_dropped_not_queued() {
        let mut w = watcher();
        w.on_batch(0, Trigger::ADDITIONS);
        w.on_timer(200);

        assert_eq!(w.on_batch(300, Trigger::FULL), BatchOutcome::Dropped);
        assert_eq!(w.on_batch(699, Trigger::FULL), BatchOutcome::Dropped);
        assert_eq!(w.on_timer(699), None);
        assert_eq!(w.on_timer(700), None);
        assert_eq!(w.state(), WatcherState::Idle);

        assert_eq!(
            w.on_batch(700, REMOVAL),
            BatchOutcome::Scheduled { deadline: 900 }
        );
    }

    #[test]
    fn irrelevant_batches_are_ignored() {
        let mut w = watcher();
        assert_eq!(w.on_batch(0, Trigger::default()), BatchOutcome::Ignored);
        assert_eq!(w.state(), WatcherState::Idle);
        assert_eq!(w.next_deadline(), None);
    }

    #[test]
    fn classify_sees_added_and_removed_conversations() {
        let mut page = fixture::host_page(&[("aa11", "First")]);
        fixture::add_chat(&mut page, "bb22", "Second");
        let batch = page.document.take_mutations();
        assert_eq!(classify(&page.document, &batch), Trigger::ADDITIONS);

        fixture::remove_chat(&mut page, "aa11");
        let batch = page.document.take_mutations();
        assert_eq!(classify(&page.document, &batch), REMOVAL);
    }

    #[test]
    fn classify_looks_inside_added_subtrees() {
        let mut page = fixture::host_page(&[]);
        let aside = fixture::sidebar(&page).unwrap();
        let wrapper = page.document.create_element("ol", Owner::Host);
        let link = fixture::build_chat(&mut page.document, "cc33", "Nested");
        page.document.append_child(wrapper, link);
        page.document.append_child(aside, wrapper);

        let batch = page.document.take_mutations();
        assert!(classify(&page.document, &batch).check_additions);
    }

    #[test]
    fn classify_ignores_unrelated_nodes() {
        let mut page = fixture::host_page(&[]);
        let body = page.document.body();
        let toast = page.document.create_element("div", Owner::Host);
        page.document.append_child(body, toast);

        let batch = page.document.take_mutations();
        assert_eq!(classify(&page.document, &batch), Trigger::default());
    }

    #[test]
    fn observe_skips_classification_while_rate_limited() {
        let mut page = fixture::host_page(&[]);
        let mut w = watcher();
        w.on_batch(0, Trigger::ADDITIONS);
        w.on_timer(200);

        fixture::add_chat(&mut page, "dd44", "Late");
        let batch = page.document.take_mutations();
        assert_eq!(w.observe(250, &page.document, &batch), BatchOutcome::Dropped);
    }
}
