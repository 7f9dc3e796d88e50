#![forbid(unsafe_code)]

//! Synchronization idioms and thread combinators.
//!
//! A b-thread is written as a rule function: a factory that produces a fresh
//! iterator of [`Idiom`]s every time the thread is (re)started. Each item the
//! iterator yields is one synchronization point; advancing the iterator is
//! how the scheduler resumes the thread, and dropping it is how the thread is
//! terminated early (an interrupt), running any `Drop` cleanup the iterator
//! captured.
//!
//! Combinators here only shape the yield sequence. Scheduling decisions —
//! which event fires, which threads resume — belong to the scheduler alone.

use std::rc::Rc;

use crate::event::{Event, Listener, Request};

/// The declarative unit a thread yields at a synchronization point.
///
/// All fields are optional. An idiom with no request and no listeners
/// participates in nothing: the thread simply parks at that point until it is
/// resumed by nothing, i.e. it stays pending silently.
#[derive(Debug, Clone, Default)]
pub struct Idiom {
    /// An event the thread proposes for selection.
    pub request: Option<Request>,
    /// Events the thread waits for; a match resumes the thread.
    pub wait_for: Vec<Listener>,
    /// Events the thread prevents from being selected, program-wide.
    pub block: Vec<Listener>,
    /// Events that terminate the thread if selected.
    pub interrupt: Vec<Listener>,
}

impl Idiom {
    /// An empty idiom; combine with the `with_*` builders.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Propose an event for selection.
    #[must_use]
    pub fn with_request(mut self, event: Event) -> Self {
        self.request = Some(Request::Event(event));
        self
    }

    /// Propose a lazily materialized event for selection.
    #[must_use]
    pub fn with_request_template(mut self, template: impl Fn() -> Event + 'static) -> Self {
        self.request = Some(Request::template(template));
        self
    }

    /// Add a listener the thread waits for.
    #[must_use]
    pub fn with_wait_for(mut self, listener: impl Into<Listener>) -> Self {
        self.wait_for.push(listener.into());
        self
    }

    /// Add a listener that blocks matching events program-wide.
    #[must_use]
    pub fn with_block(mut self, listener: impl Into<Listener>) -> Self {
        self.block.push(listener.into());
        self
    }

    /// Add a listener that interrupts (terminates) the thread when matched.
    #[must_use]
    pub fn with_interrupt(mut self, listener: impl Into<Listener>) -> Self {
        self.interrupt.push(listener.into());
        self
    }
}

/// The resumable body of a running thread: one idiom per synchronization
/// point.
pub type RuleIter = Box<dyn Iterator<Item = Idiom>>;

/// A rule function: produces a fresh thread body on every invocation.
pub type RuleFn = Rc<dyn Fn() -> RuleIter>;

/// Repetition behavior for [`b_thread_repeat`].
pub enum Repeat {
    /// Restart the sequence indefinitely.
    Forever,
    /// Restart while the predicate holds; evaluated before every pass.
    While(Rc<dyn Fn() -> bool>),
}

impl Repeat {
    /// Build a conditional repeat from a closure.
    #[must_use]
    pub fn while_fn(predicate: impl Fn() -> bool + 'static) -> Self {
        Self::While(Rc::new(predicate))
    }

    fn holds(&self) -> bool {
        match self {
            Self::Forever => true,
            Self::While(predicate) => predicate(),
        }
    }
}

impl Clone for Repeat {
    fn clone(&self) -> Self {
        match self {
            Self::Forever => Self::Forever,
            Self::While(predicate) => Self::While(Rc::clone(predicate)),
        }
    }
}

impl std::fmt::Debug for Repeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forever => f.write_str("Forever"),
            Self::While(_) => f.write_str("While(..)"),
        }
    }
}

/// A rule function yielding exactly one synchronization point.
#[must_use]
pub fn b_sync(idiom: Idiom) -> RuleFn {
    Rc::new(move || -> RuleIter { Box::new(std::iter::once(idiom.clone())) })
}

/// A rule function that runs each sub-rule's whole sequence in array order.
#[must_use]
pub fn b_thread(rules: Vec<RuleFn>) -> RuleFn {
    Rc::new(move || sequence_pass(&rules))
}

/// Like [`b_thread`], restarting the whole sequence per the repeat policy.
///
/// The predicate form is evaluated with no arguments before each pass; it is
/// expected to be side-effect-driven (a counter, a flag) since threads cannot
/// receive values from the scheduler.
#[must_use]
pub fn b_thread_repeat(rules: Vec<RuleFn>, repeat: Repeat) -> RuleFn {
    Rc::new(move || -> RuleIter {
        Box::new(RepeatingRules {
            rules: rules.clone(),
            repeat: repeat.clone(),
            inner: None,
        })
    })
}

/// One pass over a rule sequence.
fn sequence_pass(rules: &[RuleFn]) -> RuleIter {
    Box::new(rules.to_vec().into_iter().flat_map(|rule| (*rule)()))
}

struct RepeatingRules {
    rules: Vec<RuleFn>,
    repeat: Repeat,
    inner: Option<RuleIter>,
}

impl Iterator for RepeatingRules {
    type Item = Idiom;

    fn next(&mut self) -> Option<Idiom> {
        loop {
            if let Some(inner) = self.inner.as_mut() {
                match inner.next() {
                    Some(idiom) => return Some(idiom),
                    None => self.inner = None,
                }
            } else if self.repeat.holds() {
                self.inner = Some(sequence_pass(&self.rules));
            } else {
                return None;
            }
        }
    }
}
