//! The outbound request object handed to client code.
//!
//! # Design
//! `ClientRequest` is a handle to shared state. Interception mutates that
//! shared state in place (headers, path, transports, installed lifecycle), so
//! every clone held by client code, by the test framework or by the paired
//! response observes the same request. Identity is pointer identity of the
//! shared state, see `ClientRequest::ptr_eq`.
//!
//! Until a lifecycle is installed the request has no transport: lifecycle
//! calls are logged and ignored.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use http::Method;
use uuid::Uuid;

use crate::body::{Chunk, Encoding};
use crate::error::{InterceptError, RequestError};
use crate::event::{Event, EventBus, ListenerId};
use crate::headers::HeaderStore;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::response::IncomingResponse;
use crate::shim;
use crate::transport::{Connection, Protocol, Socket};

/// Unique identifier of one outbound request, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Lifecycle events emitted by a request.
#[derive(Debug, Clone)]
pub enum RequestEvent {
    Socket(Socket),
    /// Fires once per request; `aborted` tells which terminal state won.
    Complete { aborted: bool },
    Finish,
    End,
    Drain,
    Continue,
    Error(RequestError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEventKind {
    Socket,
    Complete,
    Finish,
    End,
    Drain,
    Continue,
    Error,
}

impl Event for RequestEvent {
    type Kind = RequestEventKind;

    fn kind(&self) -> RequestEventKind {
        match self {
            RequestEvent::Socket(_) => RequestEventKind::Socket,
            RequestEvent::Complete { .. } => RequestEventKind::Complete,
            RequestEvent::Finish => RequestEventKind::Finish,
            RequestEvent::End => RequestEventKind::End,
            RequestEvent::Drain => RequestEventKind::Drain,
            RequestEvent::Continue => RequestEventKind::Continue,
            RequestEvent::Error(_) => RequestEventKind::Error,
        }
    }
}

#[derive(Clone)]
pub struct ClientRequest {
    inner: Rc<RequestInner>,
}

struct RequestInner {
    id: RequestId,
    method: Method,
    protocol: Protocol,
    path: RefCell<String>,
    headers: RefCell<HeaderStore>,
    connection: RefCell<Option<Connection>>,
    socket: RefCell<Option<Socket>>,
    bus: EventBus<RequestEvent>,
    lifecycle: RefCell<Option<Rc<Lifecycle>>>,
}

impl ClientRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self::with_parts(method, path.into(), Protocol::Http)
    }

    /// Same as `new`, for a request sent over `protocol`.
    pub fn with_protocol(method: Method, path: impl Into<String>, protocol: Protocol) -> Self {
        Self::with_parts(method, path.into(), protocol)
    }

    /// Attach a caller-supplied connection. Interception keeps it.
    pub fn set_connection(&self, connection: Connection) {
        *self.inner.connection.borrow_mut() = Some(connection);
    }

    /// Attach a caller-supplied socket. Interception keeps it.
    pub fn set_socket(&self, socket: Socket) {
        *self.inner.socket.borrow_mut() = Some(socket);
    }

    fn with_parts(method: Method, path: String, protocol: Protocol) -> Self {
        Self {
            inner: Rc::new(RequestInner {
                id: RequestId::new(),
                method,
                protocol,
                path: RefCell::new(path),
                headers: RefCell::new(HeaderStore::new()),
                connection: RefCell::new(None),
                socket: RefCell::new(None),
                bus: EventBus::new(),
                lifecycle: RefCell::new(None),
            }),
        }
    }

    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn protocol(&self) -> Protocol {
        self.inner.protocol
    }

    pub fn path(&self) -> String {
        self.inner.path.borrow().clone()
    }

    pub fn set_path(&self, path: impl Into<String>) {
        *self.inner.path.borrow_mut() = path.into();
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.inner.headers.borrow().get(name)
    }

    pub fn set_header(&self, name: &str, value: &str) -> Result<(), InterceptError> {
        self.inner.headers.borrow_mut().set(name, value)
    }

    pub fn remove_header(&self, name: &str) -> Option<String> {
        self.inner.headers.borrow_mut().remove(name)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.inner.headers.borrow().contains(name)
    }

    pub fn headers(&self) -> Ref<'_, HeaderStore> {
        self.inner.headers.borrow()
    }

    pub fn connection(&self) -> Option<Connection> {
        self.inner.connection.borrow().clone()
    }

    pub fn socket(&self) -> Option<Socket> {
        self.inner.socket.borrow().clone()
    }

    pub fn on(&self, kind: RequestEventKind, listener: impl Fn(&RequestEvent) + 'static) -> ListenerId {
        let id = self.inner.bus.on(kind, listener);
        self.subscribed(kind);
        id
    }

    pub fn once(&self, kind: RequestEventKind, listener: impl Fn(&RequestEvent) + 'static) -> ListenerId {
        let id = self.inner.bus.once(kind, listener);
        self.subscribed(kind);
        id
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.bus.off(id)
    }

    pub fn listener_count(&self, kind: RequestEventKind) -> usize {
        self.inner.bus.listener_count(kind)
    }

    /// Publish `event` to this request's listeners.
    pub fn emit(&self, event: RequestEvent) -> bool {
        let delivered = self.inner.bus.emit(&event);
        if let (false, RequestEvent::Error(err)) = (delivered, &event) {
            tracing::warn!(request_id = %self.id(), error = %err, "unhandled request error");
        }
        delivered
    }

    /// Buffer `chunk`. Always returns `false`; wait for `Drain` before the
    /// next write.
    pub fn write(&self, chunk: impl Into<Chunk>) -> bool {
        match self.lifecycle() {
            Some(lifecycle) => lifecycle.write(self, chunk.into()),
            None => {
                self.detached("write");
                false
            }
        }
    }

    /// Decode `text` with `encoding`, then `write` it.
    pub fn write_encoded(&self, text: &str, encoding: Encoding) -> Result<bool, InterceptError> {
        let chunk = Chunk::decode(text, encoding)?;
        Ok(self.write(chunk))
    }

    pub fn end(&self) {
        match self.lifecycle() {
            Some(lifecycle) => lifecycle.end(self, None),
            None => self.detached("end"),
        }
    }

    /// Write `chunk` and end the request in one call.
    pub fn end_with(&self, chunk: impl Into<Chunk>) {
        match self.lifecycle() {
            Some(lifecycle) => lifecycle.end(self, Some(chunk.into())),
            None => self.detached("end"),
        }
    }

    pub fn abort(&self) {
        match self.lifecycle() {
            Some(lifecycle) => lifecycle.abort(self),
            None => self.detached("abort"),
        }
    }

    /// The paired response, created on first access.
    pub fn response(&self) -> Option<IncomingResponse> {
        self.lifecycle().map(|lifecycle| lifecycle.response(self))
    }

    /// Body captured so far: UTF-8 text, or lowercase hex for binary bytes.
    pub fn body(&self) -> Option<String> {
        self.lifecycle().map(|lifecycle| lifecycle.body())
    }

    pub fn is_intercepted(&self) -> bool {
        self.inner.lifecycle.borrow().is_some()
    }

    /// Lifecycle state, `None` until the request is intercepted.
    pub fn state(&self) -> Option<LifecycleState> {
        self.lifecycle().map(|lifecycle| lifecycle.state())
    }

    pub fn is_aborted(&self) -> bool {
        self.state() == Some(LifecycleState::Aborted)
    }

    pub fn is_ended(&self) -> bool {
        self.state() == Some(LifecycleState::Ended)
    }

    pub fn ptr_eq(&self, other: &ClientRequest) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakRequest {
        WeakRequest(Rc::downgrade(&self.inner))
    }

    pub(crate) fn replace_headers(&self, headers: HeaderStore) {
        *self.inner.headers.borrow_mut() = headers;
    }

    pub(crate) fn install(&self, lifecycle: Rc<Lifecycle>) {
        *self.inner.lifecycle.borrow_mut() = Some(lifecycle);
    }

    pub(crate) fn lifecycle(&self) -> Option<Rc<Lifecycle>> {
        // Cloned out so the borrow is released before any listener runs.
        self.inner.lifecycle.borrow().clone()
    }

    fn subscribed(&self, kind: RequestEventKind) {
        if kind != RequestEventKind::Socket {
            return;
        }
        if let Some(lifecycle) = self.lifecycle() {
            shim::handshake(self, &lifecycle, shim::HandshakeStep::Socket);
        }
    }

    fn detached(&self, op: &'static str) {
        tracing::warn!(request_id = %self.id(), op, "request is not intercepted; call ignored");
    }
}

impl fmt::Debug for ClientRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRequest")
            .field("id", &self.inner.id)
            .field("method", &self.inner.method)
            .field("path", &self.inner.path.borrow())
            .field("intercepted", &self.is_intercepted())
            .finish_non_exhaustive()
    }
}

/// Non-owning request handle held by deferred tasks and the response.
#[derive(Clone)]
pub(crate) struct WeakRequest(Weak<RequestInner>);

impl WeakRequest {
    pub(crate) fn upgrade(&self) -> Option<ClientRequest> {
        self.0.upgrade().map(|inner| ClientRequest { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn request() -> ClientRequest {
        ClientRequest::new(Method::POST, "/upload")
    }

    #[test]
    fn clones_share_identity_and_state() {
        let req = request();
        let alias = req.clone();
        alias.set_path("/moved");
        alias.set_header("X-Token", "abc").unwrap();

        assert!(req.ptr_eq(&alias));
        assert!(!req.ptr_eq(&request()));
        assert_eq!(req.path(), "/moved");
        assert_eq!(req.header("x-token").as_deref(), Some("abc"));
    }

    #[test]
    fn header_accessors_delegate_to_store() {
        let req = request();
        req.set_header("Content-Type", "text/plain").unwrap();
        assert!(req.has_header("content-type"));
        assert_eq!(req.headers().len(), 1);
        assert_eq!(req.remove_header("CONTENT-TYPE").as_deref(), Some("text/plain"));
        assert!(!req.has_header("content-type"));
    }

    #[test]
    fn detached_request_ignores_lifecycle_calls() {
        let req = request();
        let events = Rc::new(Cell::new(0));
        for kind in [RequestEventKind::Complete, RequestEventKind::Finish, RequestEventKind::End] {
            let events = events.clone();
            req.on(kind, move |_| events.set(events.get() + 1));
        }

        assert!(!req.write("ignored"));
        req.end();
        req.abort();

        assert_eq!(events.get(), 0);
        assert!(!req.is_intercepted());
        assert!(!req.is_ended());
        assert!(!req.is_aborted());
        assert_eq!(req.state(), None);
        assert_eq!(req.body(), None);
        assert!(req.response().is_none());
    }

    #[test]
    fn caller_supplied_transports_are_stored() {
        let req = request();
        let connection = Connection::new();
        let socket = Socket::new(Protocol::Https);
        req.set_connection(connection.clone());
        req.set_socket(socket.clone());

        assert!(req.connection().unwrap().ptr_eq(&connection));
        assert!(req.socket().unwrap().ptr_eq(&socket));
    }

    #[test]
    fn emit_reaches_listeners_by_kind() {
        let req = request();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        req.on(RequestEventKind::Complete, move |event| {
            if let RequestEvent::Complete { aborted } = event {
                sink.borrow_mut().push(*aborted);
            }
        });

        assert!(req.emit(RequestEvent::Complete { aborted: true }));
        assert!(!req.emit(RequestEvent::Finish));
        assert_eq!(*seen.borrow(), vec![true]);
    }

    #[test]
    fn request_id_display_is_prefixed() {
        let id = RequestId::new();
        assert!(id.to_string().starts_with("req-"));
        assert_ne!(id, RequestId::new());
    }

    #[test]
    fn protocol_is_fixed_at_construction() {
        let req = ClientRequest::with_protocol(Method::GET, "/", Protocol::Https);
        assert_eq!(req.protocol(), Protocol::Https);
        assert_eq!(req.method(), &Method::GET);
    }
}
