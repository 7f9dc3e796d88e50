#![forbid(unsafe_code)]

//! Minimal single-threaded publish/subscribe used by the engine's feedback
//! and snapshot channels.
//!
//! Listeners are invoked synchronously, in subscription order, against a
//! snapshot of the listener list taken at publish time: subscribing or
//! disconnecting from inside a callback affects later publishes only. This is
//! what keeps re-entrant triggers (a feedback handler firing another event)
//! well-defined.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Callback<T> = Rc<dyn Fn(&T)>;

struct Listeners<T: 'static> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// An ordered, re-entrancy-safe listener registry.
pub struct Publisher<T: 'static> {
    inner: Rc<RefCell<Listeners<T>>>,
}

impl<T: 'static> Publisher<T> {
    /// Create a publisher with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener; the returned handle removes it again.
    ///
    /// Dropping the handle does *not* unsubscribe — disconnection is always
    /// explicit.
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Disconnect {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push((id, Rc::new(listener)));
        drop(inner);

        let slot = Rc::downgrade(&self.inner);
        Disconnect::new(move || {
            if let Some(inner) = slot.upgrade() {
                inner.borrow_mut().entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Invoke every current listener with the value.
    pub fn publish(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = self
            .inner
            .borrow()
            .entries
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }

    /// Is anyone listening?
    #[must_use]
    pub fn has_listeners(&self) -> bool {
        !self.inner.borrow().entries.is_empty()
    }
}

impl<T: 'static> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("listeners", &self.inner.borrow().entries.len())
            .finish()
    }
}

/// Removes a subscription when invoked.
pub struct Disconnect(Box<dyn FnOnce()>);

impl Disconnect {
    pub(crate) fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self(Box::new(unsubscribe))
    }

    /// Remove the subscription this handle was returned for.
    pub fn disconnect(self) {
        (self.0)();
    }
}

impl fmt::Debug for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Disconnect(..)")
    }
}
