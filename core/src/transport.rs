//! Synthetic connection and socket.
//!
//! # Design
//! Neither type performs I/O. They exist so code that inspects
//! `request.socket()` or listens for `connect`/`timeout` behaves the way it
//! would against a live connection. Both are cheap `Rc` handles; the socket is
//! shared between a request and its response, so clones must observe the
//! same timeout state.
//!
//! Time never advances on its own. An external driver reports simulated
//! delay through `Socket::apply_delay`, which fires the timeout once the
//! accumulated delay exceeds the configured limit.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use rand::Rng;

use crate::event::{Event, EventBus, ListenerId};

/// Transport events shared by `Connection` and `Socket`.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    Connect(Socket),
    SecureConnect(Socket),
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketEventKind {
    Connect,
    SecureConnect,
    Timeout,
}

impl Event for SocketEvent {
    type Kind = SocketEventKind;

    fn kind(&self) -> SocketEventKind {
        match self {
            SocketEvent::Connect(_) => SocketEventKind::Connect,
            SocketEvent::SecureConnect(_) => SocketEventKind::SecureConnect,
            SocketEvent::Timeout => SocketEventKind::Timeout,
        }
    }
}

/// Scheme of the intercepted request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

/// Bare event-capable stand-in for `request.connection`.
#[derive(Clone, Default)]
pub struct Connection {
    bus: Rc<EventBus<SocketEvent>>,
}

impl Connection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, kind: SocketEventKind, listener: impl Fn(&SocketEvent) + 'static) -> ListenerId {
        self.bus.on(kind, listener)
    }

    pub fn once(&self, kind: SocketEventKind, listener: impl Fn(&SocketEvent) + 'static) -> ListenerId {
        self.bus.once(kind, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.bus.off(id)
    }

    pub fn emit(&self, event: SocketEvent) -> bool {
        self.bus.emit(&event)
    }

    pub fn ptr_eq(&self, other: &Connection) -> bool {
        Rc::ptr_eq(&self.bus, &other.bus)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

type TimeoutCallback = Rc<dyn Fn()>;
pub(crate) type SubscribeHook = Rc<dyn Fn(SocketEventKind)>;

/// Synthetic socket shared by a request and its response.
#[derive(Clone)]
pub struct Socket {
    inner: Rc<SocketInner>,
}

struct SocketInner {
    protocol: Protocol,
    bus: EventBus<SocketEvent>,
    timeout: Cell<Option<Duration>>,
    on_timeout: RefCell<Option<TimeoutCallback>>,
    total_delay: Cell<Duration>,
    subscribe_hook: RefCell<Option<SubscribeHook>>,
}

impl Socket {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            inner: Rc::new(SocketInner {
                protocol,
                bus: EventBus::new(),
                timeout: Cell::new(None),
                on_timeout: RefCell::new(None),
                total_delay: Cell::new(Duration::ZERO),
                subscribe_hook: RefCell::new(None),
            }),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.inner.protocol
    }

    /// TLS-style sockets report themselves as authorized.
    pub fn authorized(&self) -> bool {
        self.inner.protocol == Protocol::Https
    }

    pub fn readable(&self) -> bool {
        true
    }

    pub fn writable(&self) -> bool {
        true
    }

    /// Store the timeout and optional callback. No timer is started.
    pub fn set_timeout(&self, timeout: Duration, callback: Option<Box<dyn Fn()>>) {
        self.inner.timeout.set(Some(timeout));
        *self.inner.on_timeout.borrow_mut() = callback.map(Rc::from);
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout.get()
    }

    /// Account `delay` of simulated time against the stored timeout.
    ///
    /// Once the accumulated delay exceeds the timeout, the stored callback
    /// runs, or a `Timeout` event is emitted when there is none.
    pub fn apply_delay(&self, delay: Duration) {
        let total = self.inner.total_delay.get() + delay;
        self.inner.total_delay.set(total);

        let Some(timeout) = self.inner.timeout.get() else {
            return;
        };
        if total <= timeout {
            return;
        }
        tracing::debug!(?total, ?timeout, "socket timeout");
        let callback = self.inner.on_timeout.borrow().clone();
        match callback {
            Some(callback) => callback(),
            None => {
                self.inner.bus.emit(&SocketEvent::Timeout);
            }
        }
    }

    pub fn total_delay(&self) -> Duration {
        self.inner.total_delay.get()
    }

    pub fn set_no_delay(&self, _no_delay: bool) {}

    pub fn set_keep_alive(&self, _enable: bool, _initial_delay: Option<Duration>) {}

    pub fn destroy(&self) {}

    pub fn resume(&self) {}

    /// Opaque certificate token. Only its presence is meaningful.
    pub fn peer_certificate(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let jitter: f64 = rand::thread_rng().gen_range(0.0..10_000.0);
        let seed = format!("{}", millis as f64 + jitter);
        base64::engine::general_purpose::STANDARD.encode(seed)
    }

    pub fn on(&self, kind: SocketEventKind, listener: impl Fn(&SocketEvent) + 'static) -> ListenerId {
        let id = self.inner.bus.on(kind, listener);
        self.subscribed(kind);
        id
    }

    pub fn once(&self, kind: SocketEventKind, listener: impl Fn(&SocketEvent) + 'static) -> ListenerId {
        let id = self.inner.bus.once(kind, listener);
        self.subscribed(kind);
        id
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.bus.off(id)
    }

    pub fn emit(&self, event: SocketEvent) -> bool {
        self.inner.bus.emit(&event)
    }

    pub fn listener_count(&self, kind: SocketEventKind) -> usize {
        self.inner.bus.listener_count(kind)
    }

    pub fn ptr_eq(&self, other: &Socket) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Install the hook run after every subscription on this socket.
    pub(crate) fn set_subscribe_hook(&self, hook: SubscribeHook) {
        *self.inner.subscribe_hook.borrow_mut() = Some(hook);
    }

    fn subscribed(&self, kind: SocketEventKind) {
        let hook = self.inner.subscribe_hook.borrow().clone();
        if let Some(hook) = hook {
            hook(kind);
        }
    }
}

impl Default for Socket {
    fn default() -> Self {
        Self::new(Protocol::Http)
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("protocol", &self.inner.protocol)
            .field("timeout", &self.inner.timeout.get())
            .field("total_delay", &self.inner.total_delay.get())
            .finish_non_exhaustive()
    }
}
