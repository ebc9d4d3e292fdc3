//! Request interception and the write/end/abort state machine.
//!
//! # Design
//! `Interceptor::intercept` takes a request built by client code and installs
//! a `Lifecycle` into it in place. From then on the request's `write`, `end`
//! and `abort` run through the lifecycle:
//!
//! ```text
//! Open ──end──▶ Ended      complete(false) → finish → end
//!   │
//!   └──abort──▶ Aborted    complete(true) → response close(aborted)
//! ```
//!
//! Terminal states have no exit. Writes never flush: each accepted write
//! schedules a deferred `drain` and returns `false`. Calls that arrive after a
//! terminal state are rejected with an `error` event on the next scheduler
//! turn, never synchronously, so a listener attached right after the failing
//! call still sees it. Deferred tasks hold weak request handles and do
//! nothing once the request is gone.

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::body::{BinaryDetector, BodyBuffer, Chunk, Utf8Detector};
use crate::error::{InterceptError, RequestError};
use crate::options::RequestOptions;
use crate::request::{ClientRequest, RequestEvent, RequestEventKind};
use crate::response::{IncomingResponse, ResponseEvent};
use crate::scheduler::Scheduler;
use crate::shim::{self, HandshakeStep};
use crate::transport::{Connection, Socket, SocketEventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Open,
    Ended,
    Aborted,
}

/// Installs lifecycles into requests. One per test suite is typical; every
/// request it intercepts shares its scheduler.
#[derive(Clone)]
pub struct Interceptor {
    scheduler: Scheduler,
    detector: Rc<dyn BinaryDetector>,
}

impl Interceptor {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            detector: Rc::new(Utf8Detector),
        }
    }

    /// Replace the detector used to decide whether a body renders as hex.
    pub fn with_detector(mut self, detector: impl BinaryDetector + 'static) -> Self {
        self.detector = Rc::new(detector);
        self
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Take over `req`: apply `options`, provide transports the request lacks,
    /// install the lifecycle and the subscription shim.
    pub fn intercept(&self, req: &ClientRequest, options: &RequestOptions) -> Result<(), InterceptError> {
        if req.is_intercepted() {
            return Err(InterceptError::AlreadyIntercepted(req.id()));
        }
        options.apply(req)?;

        if req.connection().is_none() {
            req.set_connection(Connection::new());
        }
        let socket = match req.socket() {
            Some(socket) => socket,
            None => {
                let socket = Socket::new(req.protocol());
                req.set_socket(socket.clone());
                socket
            }
        };

        let lifecycle = Rc::new(Lifecycle::new(
            self.scheduler.clone(),
            self.detector.clone(),
            socket.clone(),
        ));
        req.install(lifecycle.clone());
        shim::attach(req, &socket);

        tracing::debug!(
            request_id = %req.id(),
            method = %req.method(),
            path = %req.path(),
            "request intercepted"
        );

        if expects_continue(req) {
            let weak = req.downgrade();
            self.scheduler.defer(move || {
                if let Some(req) = weak.upgrade() {
                    tracing::trace!(request_id = %req.id(), "continue");
                    req.emit(RequestEvent::Continue);
                }
            });
        }

        let waiting = req.listener_count(RequestEventKind::Socket)
            + socket.listener_count(SocketEventKind::Connect)
            + socket.listener_count(SocketEventKind::SecureConnect);
        if waiting > 0 {
            shim::handshake(req, &lifecycle, HandshakeStep::Socket);
        }
        Ok(())
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

fn expects_continue(req: &ClientRequest) -> bool {
    req.header("expect")
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("100-continue"))
}

/// State machine installed into one intercepted request.
pub(crate) struct Lifecycle {
    state: Cell<LifecycleState>,
    body: RefCell<BodyBuffer>,
    response: OnceCell<IncomingResponse>,
    socket: Socket,
    handshake: Cell<Option<HandshakeStep>>,
    handshake_replay: Cell<bool>,
    scheduler: Scheduler,
    detector: Rc<dyn BinaryDetector>,
}

impl Lifecycle {
    fn new(scheduler: Scheduler, detector: Rc<dyn BinaryDetector>, socket: Socket) -> Self {
        Self {
            state: Cell::new(LifecycleState::Open),
            body: RefCell::new(BodyBuffer::new()),
            response: OnceCell::new(),
            socket,
            handshake: Cell::new(None),
            handshake_replay: Cell::new(false),
            scheduler,
            detector,
        }
    }

    pub(crate) fn write(&self, req: &ClientRequest, chunk: Chunk) -> bool {
        match self.state.get() {
            LifecycleState::Open => {
                tracing::trace!(request_id = %req.id(), len = chunk.len(), "write");
                self.body.borrow_mut().push(chunk);
                self.schedule_drain(req);
            }
            LifecycleState::Ended | LifecycleState::Aborted => {
                self.reject(req, RequestError::WriteAfterAbort)
            }
        }
        false
    }

    pub(crate) fn end(&self, req: &ClientRequest, chunk: Option<Chunk>) {
        match self.state.get() {
            LifecycleState::Aborted => self.reject(req, RequestError::WriteAfterAbort),
            LifecycleState::Ended => {
                tracing::trace!(request_id = %req.id(), "end ignored, already ended");
            }
            LifecycleState::Open => {
                if let Some(chunk) = chunk {
                    self.write(req, chunk);
                }
                // State flips before any listener runs so re-entrant calls
                // see the terminal state.
                self.state.set(LifecycleState::Ended);
                tracing::debug!(request_id = %req.id(), bytes = self.body.borrow().len(), "request ended");
                req.emit(RequestEvent::Complete { aborted: false });
                req.emit(RequestEvent::Finish);
                req.emit(RequestEvent::End);
            }
        }
    }

    pub(crate) fn abort(&self, req: &ClientRequest) {
        let state = self.state.get();
        if state != LifecycleState::Open {
            tracing::trace!(request_id = %req.id(), ?state, "abort ignored");
            return;
        }
        self.state.set(LifecycleState::Aborted);
        tracing::debug!(request_id = %req.id(), "request aborted");
        req.emit(RequestEvent::Complete { aborted: true });
        self.response(req).emit(ResponseEvent::Close(RequestError::Aborted));
    }

    pub(crate) fn response(&self, req: &ClientRequest) -> IncomingResponse {
        self.response
            .get_or_init(|| IncomingResponse::new(req, self.socket.clone()))
            .clone()
    }

    pub(crate) fn body(&self) -> String {
        self.body.borrow().render(self.detector.as_ref())
    }

    pub(crate) fn socket(&self) -> &Socket {
        &self.socket
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.state.get()
    }

    /// Step of the handshake being played, if any.
    pub(crate) fn handshake_step(&self) -> Option<HandshakeStep> {
        self.handshake.get()
    }

    pub(crate) fn set_handshake_step(&self, step: Option<HandshakeStep>) {
        self.handshake.set(step);
    }

    pub(crate) fn queue_handshake_replay(&self) {
        self.handshake_replay.set(true);
    }

    pub(crate) fn take_handshake_replay(&self) -> bool {
        self.handshake_replay.replace(false)
    }

    fn schedule_drain(&self, req: &ClientRequest) {
        let weak = req.downgrade();
        self.scheduler.defer(move || {
            if let Some(req) = weak.upgrade() {
                req.emit(RequestEvent::Drain);
            }
        });
    }

    fn reject(&self, req: &ClientRequest, err: RequestError) {
        tracing::debug!(request_id = %req.id(), error = %err, "call rejected");
        let weak = req.downgrade();
        self.scheduler.next_turn(move || {
            if let Some(req) = weak.upgrade() {
                req.emit(RequestEvent::Error(err));
            }
        });
    }
}
