//! In-process stand-in for an outbound HTTP client request.
//!
//! # Overview
//! An interception test framework hands every outbound `ClientRequest` it
//! wants to mock to an `Interceptor`. From then on the request accepts
//! writes, emits the lifecycle events client libraries expect, pairs itself
//! with a synthetic `IncomingResponse` and supports abort, without touching
//! the network. The captured body is available through
//! `ClientRequest::body`.
//!
//! # Design
//! - Interception mutates the request in place, so every clone of the handle
//!   sees the intercepted behaviour.
//! - Each entity (request, socket, response) owns a typed event bus over a
//!   closed event enum.
//! - Deferred work (`drain`, `continue`, post-abort errors) goes through an
//!   explicit two-band `Scheduler` that the caller drives, which keeps event
//!   ordering deterministic.
//! - Everything is single threaded (`Rc`/`RefCell`); requests are
//!   independent of each other apart from sharing a scheduler.

pub mod body;
pub mod error;
pub mod event;
pub mod headers;
pub mod lifecycle;
pub mod options;
pub mod request;
pub mod response;
pub mod scheduler;
mod shim;
pub mod transport;

pub use body::{BinaryDetector, BodyBuffer, Chunk, Encoding, Utf8Detector};
pub use error::{InterceptError, RequestError};
pub use event::{Event, EventBus, ListenerId};
pub use headers::HeaderStore;
pub use lifecycle::{Interceptor, LifecycleState};
pub use options::{basic_auth, RequestOptions};
pub use request::{ClientRequest, RequestEvent, RequestEventKind, RequestId};
pub use response::{IncomingResponse, ResponseEvent, ResponseEventKind};
pub use scheduler::Scheduler;
pub use transport::{Connection, Protocol, Socket, SocketEvent, SocketEventKind};
