#![forbid(unsafe_code)]

//! Braid Core
//!
//! A behavioral-programming synchronization engine: independently authored
//! b-threads — cooperative state machines that never see each other — jointly
//! decide, one step at a time, which single event fires next.
//!
//! # Key Components
//!
//! - [`Idiom`] - The declaration a thread yields at a synchronization point
//!   (`request`, `wait_for`, `block`, `interrupt`)
//! - [`b_sync`] / [`b_thread`] / [`b_thread_repeat`] - Combinators shaping a
//!   thread's yield sequence
//! - [`BProgram`] - The engine: bid store, scheduler, trigger, and the
//!   feedback/snapshot channels
//! - [`Handlers`] - Event-type-keyed callbacks for selected events
//! - [`RestrictedTrigger`] - An allow-listed trigger for untrusted ingress
//! - [`SnapshotMessage`] - Per-step diagnostics for devtools and wire bridges
//!
//! # How a step works
//!
//! Every running thread is resumed to its next yield. All pending requests
//! become candidates (lazy templates materialize here, once per step), every
//! pending thread's blocks are honored, and the lowest-priority surviving
//! candidate is committed. Threads waiting on, requesting, or interrupted by
//! the committed event go back to running; feedback handlers fire; the cycle
//! repeats until nothing is selectable.
//!
//! ```
//! use braid_core::{b_sync, b_thread, BProgram, Event, Handlers, Idiom};
//! # use std::{cell::Cell, rc::Rc};
//!
//! let program = BProgram::new();
//! program.set_threads(vec![(
//!     "greeter",
//!     b_thread(vec![
//!         b_sync(Idiom::new().with_wait_for("app_ready")),
//!         b_sync(Idiom::new().with_request(Event::new("greet"))),
//!     ]),
//! )]);
//!
//! let greeted = Rc::new(Cell::new(false));
//! let seen = Rc::clone(&greeted);
//! let _feedback = program.use_feedback(Handlers::new().on("greet", move |_| {
//!     seen.set(true);
//!     Ok(())
//! }));
//!
//! program.trigger(Event::new("app_ready"));
//! assert!(greeted.get());
//! ```

pub mod event;
pub mod program;
pub mod publisher;
pub mod rules;
pub mod snapshot;

mod scheduler;
mod store;

pub use event::{Detail, Event, EventTemplate, Listener, Request, template_eq};
pub use program::{BProgram, HandlerResult, Handlers, RestrictedTrigger, ThreadStatus};
pub use publisher::{Disconnect, Publisher};
pub use rules::{Idiom, Repeat, RuleFn, RuleIter, b_sync, b_thread, b_thread_repeat};
pub use snapshot::{SelectionBid, SnapshotMessage};
