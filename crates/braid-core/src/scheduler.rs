#![forbid(unsafe_code)]

//! The step/select/advance core.
//!
//! One step: resume every running thread to its next synchronization point,
//! gather requests from all pending threads, drop the candidates any thread
//! blocks, commit the lowest-priority survivor, and route matched threads
//! back to running. At most one event is committed per step; a step with no
//! selectable candidate has no side effects at all.
//!
//! # Key Invariants
//!
//! 1. A thread is in exactly one of the running/pending tables.
//! 2. Bodies are resumed only on the running→pending transition; pending
//!    idioms are only *matched*, never re-run.
//! 3. Equal-priority candidates tie-break by pending insertion order.
//! 4. Block listeners are collected from every pending thread, so a thread
//!    can veto events it never requested.
//! 5. Templates materialize once per step, at candidate construction.

use std::rc::Rc;

use crate::event::{template_eq, Event, EventTemplate, Listener, Request};
use crate::rules::{Idiom, RuleFn};
use crate::snapshot::{SelectionBid, SnapshotMessage};
use crate::store::{BidStore, PendingBid, RunningBid, ThreadKey};

/// What one committed step hands back for publication.
pub(crate) struct StepOutcome {
    /// Selection diagnostics, present when a snapshot listener asked for them.
    pub snapshot: Option<SnapshotMessage>,
    /// The event this step committed.
    pub event: Event,
}

/// A pending request flattened for selection.
struct Candidate {
    thread: ThreadKey,
    priority: u32,
    from_trigger: bool,
    event: Event,
    template: Option<EventTemplate>,
}

pub(crate) struct Scheduler {
    store: BidStore,
    trigger_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            store: BidStore::new(),
            trigger_seq: 0,
        }
    }

    /// Register a named thread unless the name is already live.
    ///
    /// Priority is the current running count plus one, so registration order
    /// is selection order among simultaneous requests.
    pub fn try_register(&mut self, name: &str, rule: &RuleFn) -> bool {
        let (running, pending) = self.store.status(name);
        if running || pending {
            return false;
        }
        let priority = self.store.running_len() as u32 + 1;
        self.store.insert_running(
            ThreadKey::Named(Rc::from(name)),
            RunningBid {
                priority,
                from_trigger: false,
                rules: Some((**rule)()),
            },
        );
        tracing::debug!(target: "braid.engine", thread = name, priority, "thread registered");
        true
    }

    /// Mint the ephemeral single-shot thread for an externally injected event.
    ///
    /// The thread requests the event at priority 0 and waits for anything, so
    /// it is routed back to running — and reaped — no matter which event the
    /// step selects.
    pub fn insert_trigger(&mut self, event: Event) {
        self.trigger_seq += 1;
        let key = ThreadKey::Trigger {
            seq: self.trigger_seq,
            event_type: Rc::from(event.event_type.as_str()),
        };
        let idiom = Idiom::new().with_request(event).with_wait_for(Listener::any());
        self.store.insert_running(
            key,
            RunningBid {
                priority: 0,
                from_trigger: true,
                rules: Some(Box::new(std::iter::once(idiom))),
            },
        );
    }

    pub fn status(&self, name: &str) -> (bool, bool) {
        self.store.status(name)
    }

    /// Run one full resume/select/advance cycle.
    ///
    /// Returns `None` when no candidate survives blocking — the engine idles
    /// until a trigger or registration adds running threads again.
    pub fn step(&mut self, want_snapshot: bool) -> Option<StepOutcome> {
        self.drain_running();

        let (candidates, blocked) = self.collect_bids();
        let selected = select(&candidates, &blocked)?;

        let snapshot = want_snapshot.then(|| self.selection_snapshot(&candidates, selected, &blocked));
        let selected_event = candidates[selected].event.clone();
        let selected_template = candidates[selected].template.clone();
        tracing::debug!(
            target: "braid.engine",
            event_type = %selected_event.event_type,
            thread = %candidates[selected].thread,
            priority = candidates[selected].priority,
            candidates = candidates.len(),
            "event selected"
        );

        self.advance(&selected_event, selected_template.as_ref());
        Some(StepOutcome {
            snapshot,
            event: selected_event,
        })
    }

    /// Resume every running thread once, moving survivors to pending.
    fn drain_running(&mut self) {
        for (key, bid) in self.store.take_running() {
            let RunningBid {
                priority,
                from_trigger,
                rules,
            } = bid;
            let Some(mut rules) = rules else {
                // Interrupted last step; nothing left to resume.
                continue;
            };
            match rules.next() {
                Some(idiom) => {
                    self.store.insert_pending(
                        key,
                        PendingBid {
                            priority,
                            from_trigger,
                            rules,
                            idiom,
                        },
                    );
                }
                None => {
                    tracing::trace!(target: "braid.engine", thread = %key, "thread completed");
                }
            }
        }
    }

    /// Gather block listeners and request candidates from all pending bids.
    ///
    /// Templates are invoked here — once per step — so candidate payloads are
    /// fresh every step the thread stays pending.
    fn collect_bids(&self) -> (Vec<Candidate>, Vec<(ThreadKey, Listener)>) {
        let mut blocked = Vec::new();
        let mut candidates = Vec::new();
        for (key, bid) in self.store.pending() {
            for listener in &bid.idiom.block {
                blocked.push((key.clone(), listener.clone()));
            }
            if let Some(request) = &bid.idiom.request {
                let (event, template) = match request {
                    Request::Event(event) => (event.clone(), None),
                    Request::Template(template) => ((**template)(), Some(Rc::clone(template))),
                };
                candidates.push(Candidate {
                    thread: key.clone(),
                    priority: bid.priority,
                    from_trigger: bid.from_trigger,
                    event,
                    template,
                });
            }
        }
        (candidates, blocked)
    }

    /// Reclassify pending threads against the selected event.
    fn advance(&mut self, selected: &Event, selected_template: Option<&EventTemplate>) {
        let pending = self.store.take_pending();
        let mut kept = Vec::with_capacity(pending.len());
        for (key, bid) in pending {
            let interrupted = bid.idiom.interrupt.iter().any(|l| l.matches(selected));
            let waited_for = bid.idiom.wait_for.iter().any(|l| l.matches(selected));
            let own_request = bid.idiom.request.as_ref().is_some_and(|request| match request {
                Request::Template(template) => {
                    selected_template.is_some_and(|selected| template_eq(template, selected))
                }
                Request::Event(event) => event.event_type == selected.event_type,
            });

            if interrupted {
                tracing::debug!(target: "braid.engine", thread = %key, "thread interrupted");
                // Terminate now so cleanup in the body runs at interrupt
                // time; the husk transits running and is reaped next drain.
                drop(bid.rules);
                self.store.insert_running(
                    key,
                    RunningBid {
                        priority: bid.priority,
                        from_trigger: bid.from_trigger,
                        rules: None,
                    },
                );
            } else if waited_for || own_request {
                self.store.insert_running(
                    key,
                    RunningBid {
                        priority: bid.priority,
                        from_trigger: bid.from_trigger,
                        rules: Some(bid.rules),
                    },
                );
            } else {
                kept.push((key, bid));
            }
        }
        self.store.restore_pending(kept);
    }

    /// The full candidate/selection/blocking picture for one step.
    fn selection_snapshot(
        &self,
        candidates: &[Candidate],
        selected: usize,
        blocked: &[(ThreadKey, Listener)],
    ) -> SnapshotMessage {
        let mut interrupters = Vec::new();
        for (key, bid) in self.store.pending() {
            for listener in &bid.idiom.interrupt {
                interrupters.push((key.clone(), listener.clone()));
            }
        }

        let selected_type = &candidates[selected].event.event_type;
        let mut bids: Vec<SelectionBid> = candidates
            .iter()
            .map(|candidate| SelectionBid {
                thread: candidate.thread.to_string(),
                trigger: candidate.from_trigger,
                selected: candidate.event.event_type == *selected_type,
                event_type: candidate.event.event_type.clone(),
                detail: candidate.event.detail.clone(),
                priority: candidate.priority,
                blocked_by: blocked
                    .iter()
                    .find(|(_, listener)| listener.matches(&candidate.event))
                    .map(|(key, _)| key.to_string()),
                interrupts: interrupters
                    .iter()
                    .find(|(_, listener)| listener.matches(&candidate.event))
                    .map(|(key, _)| key.to_string()),
            })
            .collect();
        bids.sort_by_key(|bid| bid.priority);
        SnapshotMessage::Selection { bids }
    }
}

/// First unblocked candidate with minimal priority, stable in pending order.
fn select(candidates: &[Candidate], blocked: &[(ThreadKey, Listener)]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        if blocked.iter().any(|(_, listener)| listener.matches(&candidate.event)) {
            tracing::trace!(
                target: "braid.engine",
                event_type = %candidate.event.event_type,
                "candidate blocked"
            );
            continue;
        }
        if best.is_none_or(|current| candidate.priority < candidates[current].priority) {
            best = Some(index);
        }
    }
    best
}
