#![forbid(unsafe_code)]

//! Canonical event types for the synchronization engine.
//!
//! Events are the atomic unit of communication between b-threads. Only the
//! `type` field participates in matching; the `detail` payload is opaque JSON
//! carried along for whichever feedback handler ends up consuming the event.
//!
//! # Design Notes
//!
//! - `Listener` is a tagged union of a literal type string and a predicate
//!   closure, so matching never needs runtime type sniffing.
//! - `EventTemplate` defers payload construction until the scheduler actually
//!   builds a candidate from the request, once per step.
//! - Template identity is pointer identity: two clones of the same `Rc`
//!   template are the same request.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Opaque event payload. Matching never inspects it.
pub type Detail = serde_json::Value;

/// The atomic unit of communication between b-threads.
///
/// `type` is the only field used for matching and dispatch; `detail` is an
/// optional opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// String identifier used for matching and dispatching.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Optional data payload associated with the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Detail>,
}

impl Event {
    /// Create an event with no payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            detail: None,
        }
    }

    /// Attach a payload to the event.
    #[must_use]
    pub fn with_detail(mut self, detail: Detail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Validate an externally sourced JSON value as an event.
    ///
    /// Accepts any JSON object with a string `type` property; everything else
    /// is rejected. Use this at ingress boundaries (sockets, workers) before
    /// handing payloads to a trigger.
    #[must_use]
    pub fn from_value(value: &Detail) -> Option<Self> {
        let object = value.as_object()?;
        let event_type = object.get("type")?.as_str()?.to_owned();
        Some(Self {
            event_type,
            detail: object.get("detail").cloned(),
        })
    }
}

/// A thunk producing an [`Event`] lazily.
///
/// The scheduler invokes the template exactly once per step, at candidate
/// construction time, so the payload reflects the moment of selection rather
/// than the moment the thread yielded.
pub type EventTemplate = Rc<dyn Fn() -> Event>;

/// Compare two templates by identity.
///
/// A template request is "the same request" only when it is the same `Rc`
/// allocation, mirroring how a thread recognizes its own selected bid.
#[must_use]
pub fn template_eq(a: &EventTemplate, b: &EventTemplate) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// An event a thread proposes at a synchronization point.
#[derive(Clone)]
pub enum Request {
    /// A fully materialized event.
    Event(Event),
    /// A lazy template, materialized once per step.
    Template(EventTemplate),
}

impl Request {
    /// Wrap a closure as a template request.
    #[must_use]
    pub fn template(template: impl Fn() -> Event + 'static) -> Self {
        Self::Template(Rc::new(template))
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(event) => f.debug_tuple("Event").field(event).finish(),
            Self::Template(_) => f.write_str("Template(..)"),
        }
    }
}

impl From<Event> for Request {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

/// How a thread listens for events in `wait_for`, `block`, and `interrupt`.
///
/// Either an exact type-string match or an arbitrary predicate over the
/// event.
#[derive(Clone)]
pub enum Listener {
    /// Matches events whose `type` equals the string exactly.
    Literal(String),
    /// Matches events the predicate accepts.
    Predicate(Rc<dyn Fn(&Event) -> bool>),
}

impl Listener {
    /// Wrap a closure as a predicate listener.
    #[must_use]
    pub fn predicate(predicate: impl Fn(&Event) -> bool + 'static) -> Self {
        Self::Predicate(Rc::new(predicate))
    }

    /// A listener that matches every event.
    ///
    /// Trigger threads use this so they are routed back to running no matter
    /// which event the step selects.
    #[must_use]
    pub fn any() -> Self {
        Self::Predicate(Rc::new(|_| true))
    }

    /// Does this listener match the given event?
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::Literal(event_type) => *event_type == event.event_type,
            Self::Predicate(predicate) => predicate(event),
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(event_type) => f.debug_tuple("Literal").field(event_type).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for Listener {
    fn from(event_type: &str) -> Self {
        Self::Literal(event_type.to_owned())
    }
}

impl From<String> for Listener {
    fn from(event_type: String) -> Self {
        Self::Literal(event_type)
    }
}
