//! Typed publish-subscribe for the public event surface.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::call::CallError;

/// Events published by a [`Call`] to its consumer.
///
/// [`Call`]: crate::call::Call
#[derive(Clone, Debug)]
pub enum CallEvent {
    /// Observable call state changed (flags, controls, connection phase).
    Change,

    /// Local stream was (re)created or a local track was replaced.
    LocalTrackChange,

    /// Remote stream composition or a remote track's state changed.
    TrackChange,

    /// Call reached its terminal state.
    Finish,

    /// Application payload arrived over the data channel.
    Message(serde_json::Value),

    /// Diagnostic or fatal error.
    Error(CallError),
}

/// Identifier of a subscription, as returned by [`EventEmitter::on()`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubscriptionId(u64);

/// Synchronous publish-subscribe of `T` values.
///
/// Listeners run synchronously in registration order on the publishing task,
/// so they must not block. There is no back-pressure: a slow listener slows
/// the publisher down.
pub struct EventEmitter<T> {
    /// Registered listeners, in registration order.
    subs: RefCell<Vec<(SubscriptionId, Rc<dyn Fn(&T)>)>>,

    /// Id for the next subscription.
    next_id: Cell<u64>,
}

impl<T> Default for EventEmitter<T> {
    #[inline]
    fn default() -> Self {
        Self {
            subs: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }
}

impl<T> EventEmitter<T> {
    /// Registers the provided listener.
    pub fn on<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&T) + 'static,
    {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.subs.borrow_mut().push((id, Rc::new(f)));
        id
    }

    /// Removes the listener registered under the provided id.
    ///
    /// Returns `false` if no such listener exists (already removed).
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subs.borrow_mut();
        let before = subs.len();
        subs.retain(|(sub_id, _)| *sub_id != id);
        subs.len() != before
    }

    /// Publishes the provided value to every registered listener.
    ///
    /// The listener list is snapshotted before delivery, so listeners may
    /// re-subscribe or unsubscribe without affecting the current round.
    pub fn emit(&self, value: &T) {
        let listeners: Vec<_> = self
            .subs
            .borrow()
            .iter()
            .map(|(_, f)| Rc::clone(f))
            .collect();
        for f in listeners {
            f(value);
        }
    }
}
