//! Typed publish/subscribe used by requests, sockets and responses.
//!
//! # Design
//! Every entity owns one `EventBus` over its own closed event enum. The enum
//! implements `Event`, which maps a payload-carrying value to a plain `Kind`
//! used for subscription, so the lifecycle code matches exhaustively on
//! event kinds instead of strings.
//!
//! Listeners are `Fn` closures behind `Rc`. `emit` snapshots the matching
//! listeners and releases the borrow before calling them, so a listener may
//! subscribe, unsubscribe or emit on the same bus. One-shot listeners are
//! removed before they run.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// An event value that can be published on an `EventBus`.
pub trait Event: fmt::Debug {
    type Kind: Copy + Eq + fmt::Debug;

    fn kind(&self) -> Self::Kind;
}

/// Handle returned by subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Rc<dyn Fn(&E)>;

struct Listener<E: Event> {
    id: ListenerId,
    kind: E::Kind,
    once: bool,
    callback: Callback<E>,
}

pub struct EventBus<E: Event> {
    listeners: RefCell<Vec<Listener<E>>>,
    next_id: Cell<u64>,
}

impl<E: Event> EventBus<E> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Register a persistent listener for `kind`.
    pub fn on(&self, kind: E::Kind, listener: impl Fn(&E) + 'static) -> ListenerId {
        self.add(kind, false, Rc::new(listener))
    }

    /// Register a listener for `kind` that is removed after its first call.
    pub fn once(&self, kind: E::Kind, listener: impl Fn(&E) + 'static) -> ListenerId {
        self.add(kind, true, Rc::new(listener))
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Call every listener registered for the event's kind, in registration
    /// order. Returns `true` if at least one listener ran.
    pub fn emit(&self, event: &E) -> bool {
        let kind = event.kind();
        let callbacks: Vec<Callback<E>> = {
            let mut listeners = self.listeners.borrow_mut();
            let matched = listeners
                .iter()
                .filter(|l| l.kind == kind)
                .map(|l| l.callback.clone())
                .collect();
            listeners.retain(|l| !(l.once && l.kind == kind));
            matched
        };
        for callback in &callbacks {
            callback(event);
        }
        !callbacks.is_empty()
    }

    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.listeners.borrow().iter().filter(|l| l.kind == kind).count()
    }

    fn add(&self, kind: E::Kind, once: bool, callback: Callback<E>) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push(Listener {
            id,
            kind,
            once,
            callback,
        });
        id
    }
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}
