#![forbid(unsafe_code)]

//! The bid store: which threads are running and which are pending.
//!
//! Both tables preserve insertion order — priority ties between candidates
//! resolve by pending order, so determinism here is load-bearing. A thread is
//! never in both tables at once; the scheduler moves entries between them
//! wholesale via `take_*`/`insert_*`.

use std::fmt;
use std::rc::Rc;

use crate::rules::{Idiom, RuleIter};

/// Identity of a thread in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ThreadKey {
    /// A thread registered under a caller-chosen name.
    Named(Rc<str>),
    /// An ephemeral thread minted by an external trigger. The sequence number
    /// keeps repeated triggers of the same event type distinct.
    Trigger { seq: u64, event_type: Rc<str> },
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Trigger { event_type, .. } => write!(f, "trigger({event_type})"),
        }
    }
}

/// A thread about to be resumed at the next step.
pub(crate) struct RunningBid {
    pub priority: u32,
    pub from_trigger: bool,
    /// `None` marks a body already terminated by an interrupt; the next
    /// drain reaps the entry without resuming anything.
    pub rules: Option<RuleIter>,
}

/// A thread that has yielded an idiom and awaits event selection.
pub(crate) struct PendingBid {
    pub priority: u32,
    pub from_trigger: bool,
    pub rules: RuleIter,
    pub idiom: Idiom,
}

/// Insertion-ordered running/pending tables.
#[derive(Default)]
pub(crate) struct BidStore {
    running: Vec<(ThreadKey, RunningBid)>,
    pending: Vec<(ThreadKey, PendingBid)>,
}

impl BidStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_running(&mut self, key: ThreadKey, bid: RunningBid) {
        debug_assert!(
            !self.pending_contains(&key),
            "thread {key} present in both tables"
        );
        if let Some(slot) = self.running.iter_mut().find(|(existing, _)| *existing == key) {
            slot.1 = bid;
        } else {
            self.running.push((key, bid));
        }
    }

    pub fn insert_pending(&mut self, key: ThreadKey, bid: PendingBid) {
        debug_assert!(
            !self.running_contains(&key),
            "thread {key} present in both tables"
        );
        if let Some(slot) = self.pending.iter_mut().find(|(existing, _)| *existing == key) {
            slot.1 = bid;
        } else {
            self.pending.push((key, bid));
        }
    }

    /// Drain the running table, preserving insertion order.
    pub fn take_running(&mut self) -> Vec<(ThreadKey, RunningBid)> {
        std::mem::take(&mut self.running)
    }

    /// Drain the pending table, preserving insertion order.
    pub fn take_pending(&mut self) -> Vec<(ThreadKey, PendingBid)> {
        std::mem::take(&mut self.pending)
    }

    /// Put back the pending entries that did not move this step.
    pub fn restore_pending(&mut self, entries: Vec<(ThreadKey, PendingBid)>) {
        debug_assert!(self.pending.is_empty(), "pending table not drained");
        self.pending = entries;
    }

    pub fn pending(&self) -> &[(ThreadKey, PendingBid)] {
        &self.pending
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn has_running(&self) -> bool {
        !self.running.is_empty()
    }

    fn running_contains(&self, key: &ThreadKey) -> bool {
        self.running.iter().any(|(existing, _)| existing == key)
    }

    fn pending_contains(&self, key: &ThreadKey) -> bool {
        self.pending.iter().any(|(existing, _)| existing == key)
    }

    /// Running/pending flags for a named thread.
    pub fn status(&self, name: &str) -> (bool, bool) {
        let is_named = |key: &ThreadKey| matches!(key, ThreadKey::Named(n) if **n == *name);
        (
            self.running.iter().any(|(key, _)| is_named(key)),
            self.pending.iter().any(|(key, _)| is_named(key)),
        )
    }
}
