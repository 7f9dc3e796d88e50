#![forbid(unsafe_code)]

//! The behavioral program facade.
//!
//! [`BProgram`] owns one engine instance: the bid store and scheduler behind
//! a `RefCell`, a feedback channel for selected events, and a lazily created
//! snapshot channel for diagnostics. Handles are cheap clones of the same
//! instance, so collaborators (transports, UI glue, timers) can each hold
//! their own.
//!
//! # Execution model
//!
//! Single-threaded, cooperative, synchronous. A `trigger` call runs the full
//! resume/select/advance/publish cascade on the caller's stack before
//! returning. Feedback handlers run synchronously too; a handler that
//! triggers another event nests a complete cascade inside the current one,
//! so transitively derived events resolve depth-first. The engine never
//! blocks on a handler — a handler needing asynchrony should hand the work
//! to its own worker and return.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Thread body panics | Propagates out of the triggering call |
//! | Feedback handler returns `Err` | `feedback_error` snapshot, cascade continues |
//! | Restricted trigger rejects | `restricted_trigger_error` snapshot, no scheduling |
//! | Duplicate thread name | `bthreads_warning` snapshot, registration skipped |

use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::event::{Detail, Event};
use crate::publisher::{Disconnect, Publisher};
use crate::rules::RuleFn;
use crate::scheduler::Scheduler;
use crate::snapshot::SnapshotMessage;

/// Result type for feedback handlers.
pub type HandlerResult = Result<(), Box<dyn Error>>;

type Handler = Rc<dyn Fn(Option<&Detail>) -> HandlerResult>;

/// A keyed set of feedback handlers.
///
/// A handler fires only when the selected event's type equals its key.
/// Handlers receive the event's payload and report failures through their
/// return value; the engine publishes failures as `feedback_error` snapshots
/// and moves on.
#[derive(Default)]
pub struct Handlers {
    map: FxHashMap<String, Handler>,
}

impl Handlers {
    /// An empty handler set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a handler for one event type.
    #[must_use]
    pub fn on(
        mut self,
        event_type: impl Into<String>,
        handler: impl Fn(Option<&Detail>) -> HandlerResult + 'static,
    ) -> Self {
        self.map.insert(event_type.into(), Rc::new(handler));
        self
    }

    fn get(&self, event_type: &str) -> Option<&Handler> {
        self.map.get(event_type)
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers").field("types", &self.map.len()).finish()
    }
}

/// Running/pending flags for a named thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadStatus {
    /// The thread is about to be resumed at the next step.
    pub running: bool,
    /// The thread has yielded an idiom and awaits event selection.
    pub pending: bool,
}

struct Core {
    scheduler: RefCell<Scheduler>,
    feedback: Publisher<Event>,
    snapshot: RefCell<Option<Publisher<SnapshotMessage>>>,
}

impl Core {
    fn publish_snapshot(&self, message: &SnapshotMessage) {
        // Clone the publisher handle out so listeners can re-subscribe or
        // trigger without hitting the borrow.
        let publisher = self.snapshot.borrow().clone();
        if let Some(publisher) = publisher {
            publisher.publish(message);
        }
    }

    fn wants_snapshots(&self) -> bool {
        self.snapshot.borrow().as_ref().is_some_and(Publisher::has_listeners)
    }

    /// Run steps until no candidate survives blocking.
    fn run_to_idle(&self) {
        loop {
            let want_snapshot = self.wants_snapshots();
            let outcome = self.scheduler.borrow_mut().step(want_snapshot);
            let Some(outcome) = outcome else { break };
            if let Some(message) = outcome.snapshot {
                self.publish_snapshot(&message);
            }
            self.feedback.publish(&outcome.event);
        }
    }
}

/// A behavioral program instance.
///
/// Create one with [`BProgram::new`], register threads with
/// [`set_threads`](Self::set_threads), react to selected events with
/// [`use_feedback`](Self::use_feedback), and inject external events with
/// [`trigger`](Self::trigger).
#[derive(Clone)]
pub struct BProgram {
    core: Rc<Core>,
}

impl BProgram {
    /// Create an engine with no threads and no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Rc::new(Core {
                scheduler: RefCell::new(Scheduler::new()),
                feedback: Publisher::new(),
                snapshot: RefCell::new(None),
            }),
        }
    }

    /// Inject an external event and run the resulting cascade to completion.
    ///
    /// Fire-and-forget: the call returns nothing, after every transitively
    /// derived event has been committed and published.
    pub fn trigger(&self, event: Event) {
        tracing::debug!(target: "braid.engine", event_type = %event.event_type, "external trigger");
        self.core.scheduler.borrow_mut().insert_trigger(event);
        self.core.run_to_idle();
    }

    /// Register threads in iteration order.
    ///
    /// Registration order determines priority among simultaneous requests:
    /// earlier threads win. A name that is still live (running or pending) is
    /// skipped and reported via a `bthreads_warning` snapshot; re-using a
    /// name is fine once its previous thread has completed or been
    /// interrupted.
    ///
    /// Registration alone schedules nothing — threads first run at the next
    /// trigger (or immediately, when called from inside a feedback handler
    /// while a cascade is in flight).
    pub fn set_threads<I, S>(&self, threads: I)
    where
        I: IntoIterator<Item = (S, RuleFn)>,
        S: Into<String>,
    {
        for (name, rule) in threads {
            let name: String = name.into();
            let registered = self.core.scheduler.borrow_mut().try_register(&name, &rule);
            if !registered {
                tracing::warn!(target: "braid.engine", thread = %name, "duplicate thread registration ignored");
                self.core.publish_snapshot(&SnapshotMessage::BthreadsWarning {
                    warning: format!("thread \"{name}\" already exists and was not replaced"),
                    thread: name,
                });
            }
        }
    }

    /// Running/pending flags for a named thread.
    #[must_use]
    pub fn thread_status(&self, name: &str) -> ThreadStatus {
        let (running, pending) = self.core.scheduler.borrow().status(name);
        ThreadStatus { running, pending }
    }

    /// Subscribe handlers to every event the scheduler commits.
    pub fn use_feedback(&self, handlers: Handlers) -> Disconnect {
        let core = Rc::downgrade(&self.core);
        self.core.feedback.subscribe(move |event: &Event| {
            let Some(handler) = handlers.get(&event.event_type) else {
                return;
            };
            if let Err(error) = (**handler)(event.detail.as_ref()) {
                tracing::warn!(
                    target: "braid.engine",
                    event_type = %event.event_type,
                    error = %error,
                    "feedback handler failed"
                );
                if let Some(core) = core.upgrade() {
                    core.publish_snapshot(&SnapshotMessage::FeedbackError {
                        event_type: event.event_type.clone(),
                        detail: event.detail.clone(),
                        error: error.to_string(),
                    });
                }
            }
        })
    }

    /// Subscribe a diagnostic listener to every snapshot message.
    ///
    /// The snapshot channel is created on first use; with no listeners the
    /// scheduler skips snapshot assembly entirely.
    pub fn use_snapshot(&self, listener: impl Fn(&SnapshotMessage) + 'static) -> Disconnect {
        let mut slot = self.core.snapshot.borrow_mut();
        let publisher = slot.get_or_insert_with(Publisher::new).clone();
        drop(slot);
        publisher.subscribe(listener)
    }

    /// Build a trigger restricted to an allow-list of event types.
    #[must_use]
    pub fn use_restricted_trigger<I, S>(&self, allowed: I) -> RestrictedTrigger
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RestrictedTrigger {
            core: Rc::clone(&self.core),
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for BProgram {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BProgram").finish_non_exhaustive()
    }
}

/// A trigger that only admits an allow-listed set of event types.
///
/// Rejected events never reach the scheduler; the rejection is reported as a
/// `restricted_trigger_error` snapshot instead of an error return, so
/// hostile or malformed input cannot disturb the program.
pub struct RestrictedTrigger {
    core: Rc<Core>,
    allowed: Vec<String>,
}

impl RestrictedTrigger {
    /// Inject the event if its type is allow-listed; report it otherwise.
    pub fn trigger(&self, event: Event) {
        if self.allowed.iter().any(|allowed| *allowed == event.event_type) {
            tracing::debug!(target: "braid.engine", event_type = %event.event_type, "restricted trigger admitted event");
            self.core.scheduler.borrow_mut().insert_trigger(event);
            self.core.run_to_idle();
            return;
        }
        tracing::warn!(target: "braid.engine", event_type = %event.event_type, "restricted trigger rejected event");
        let error = format!(
            "Event type \"{}\" is not in the allowed set: [{}]",
            event.event_type,
            self.allowed.join(", ")
        );
        self.core.publish_snapshot(&SnapshotMessage::RestrictedTriggerError {
            event_type: event.event_type,
            detail: event.detail,
            error,
        });
    }
}

impl fmt::Debug for RestrictedTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestrictedTrigger")
            .field("allowed", &self.allowed)
            .finish_non_exhaustive()
    }
}
