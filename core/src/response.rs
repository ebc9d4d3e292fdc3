//! Synthetic response paired with an intercepted request.
//!
//! # Design
//! A passive carrier. It shares its request's socket and keeps only a weak
//! back-reference to the request, so a request and its memoized response do
//! not keep each other alive. The only event it receives from the lifecycle
//! is `Close`, emitted when the request is aborted.

use std::fmt;
use std::rc::Rc;

use crate::error::RequestError;
use crate::event::{Event, EventBus, ListenerId};
use crate::request::{ClientRequest, WeakRequest};
use crate::transport::Socket;

#[derive(Debug, Clone)]
pub enum ResponseEvent {
    /// The request was aborted; the error carries the code `aborted`.
    Close(RequestError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseEventKind {
    Close,
}

impl Event for ResponseEvent {
    type Kind = ResponseEventKind;

    fn kind(&self) -> ResponseEventKind {
        match self {
            ResponseEvent::Close(_) => ResponseEventKind::Close,
        }
    }
}

#[derive(Clone)]
pub struct IncomingResponse {
    inner: Rc<ResponseInner>,
}

struct ResponseInner {
    req: WeakRequest,
    socket: Socket,
    bus: EventBus<ResponseEvent>,
}

impl IncomingResponse {
    pub(crate) fn new(req: &ClientRequest, socket: Socket) -> Self {
        Self {
            inner: Rc::new(ResponseInner {
                req: req.downgrade(),
                socket,
                bus: EventBus::new(),
            }),
        }
    }

    /// The request this response belongs to, while it is still alive.
    pub fn req(&self) -> Option<ClientRequest> {
        self.inner.req.upgrade()
    }

    pub fn socket(&self) -> Socket {
        self.inner.socket.clone()
    }

    pub fn on(&self, kind: ResponseEventKind, listener: impl Fn(&ResponseEvent) + 'static) -> ListenerId {
        self.inner.bus.on(kind, listener)
    }

    pub fn once(&self, kind: ResponseEventKind, listener: impl Fn(&ResponseEvent) + 'static) -> ListenerId {
        self.inner.bus.once(kind, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.bus.off(id)
    }

    pub fn emit(&self, event: ResponseEvent) -> bool {
        self.inner.bus.emit(&event)
    }

    pub fn listener_count(&self, kind: ResponseEventKind) -> usize {
        self.inner.bus.listener_count(kind)
    }

    pub fn ptr_eq(&self, other: &IncomingResponse) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for IncomingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingResponse")
            .field("socket", &self.inner.socket)
            .finish_non_exhaustive()
    }
}
