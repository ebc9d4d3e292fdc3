//! Synthetic connection handshake.
//!
//! # Design
//! Client code commonly waits for `socket` (and then `connect` /
//! `secureConnect`) before writing. No connection is ever made, so the
//! handshake is played eagerly: subscribing to the request's `Socket` event,
//! or to `Connect`/`SecureConnect` on its socket, emits in order
//!
//! ```text
//! request: Socket(socket) → socket: Connect(socket) → socket: SecureConnect(socket)
//! ```
//!
//! within the subscribing call. Subscriptions made from listeners of a
//! handshake that is being played do not start a second one right away. If
//! the step they wait for is still to come, the running handshake reaches
//! them. Otherwise one more handshake is played as soon as the running one
//! finishes.

use std::rc::Rc;

use crate::lifecycle::Lifecycle;
use crate::request::{ClientRequest, RequestEvent};
use crate::transport::{Socket, SocketEvent, SocketEventKind};

/// Position within a handshake, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum HandshakeStep {
    Socket,
    Connect,
    SecureConnect,
}

/// Route socket-level subscriptions on `socket` into the handshake of `req`.
pub(crate) fn attach(req: &ClientRequest, socket: &Socket) {
    let weak = req.downgrade();
    socket.set_subscribe_hook(Rc::new(move |kind| {
        let step = match kind {
            SocketEventKind::Connect => HandshakeStep::Connect,
            SocketEventKind::SecureConnect => HandshakeStep::SecureConnect,
            SocketEventKind::Timeout => return,
        };
        let Some(req) = weak.upgrade() else {
            return;
        };
        if let Some(lifecycle) = req.lifecycle() {
            handshake(&req, &lifecycle, step);
        }
    }));
}

/// Play `socket` → `connect` → `secureConnect` synchronously for a
/// subscription waiting on `wanted`.
pub(crate) fn handshake(req: &ClientRequest, lifecycle: &Lifecycle, wanted: HandshakeStep) {
    if let Some(current) = lifecycle.handshake_step() {
        if wanted <= current {
            tracing::trace!(request_id = %req.id(), ?wanted, ?current, "handshake replay queued");
            lifecycle.queue_handshake_replay();
        }
        return;
    }
    loop {
        play(req, lifecycle);
        if !lifecycle.take_handshake_replay() {
            break;
        }
    }
}

fn play(req: &ClientRequest, lifecycle: &Lifecycle) {
    let guard = HandshakeGuard { lifecycle };
    tracing::trace!(request_id = %req.id(), "synthetic handshake");

    let socket = lifecycle.socket().clone();
    guard.step(HandshakeStep::Socket);
    req.emit(RequestEvent::Socket(socket.clone()));
    guard.step(HandshakeStep::Connect);
    socket.emit(SocketEvent::Connect(socket.clone()));
    guard.step(HandshakeStep::SecureConnect);
    socket.emit(SocketEvent::SecureConnect(socket.clone()));
}

/// Clears the in-flight step even if a listener panics.
struct HandshakeGuard<'a> {
    lifecycle: &'a Lifecycle,
}

impl HandshakeGuard<'_> {
    fn step(&self, step: HandshakeStep) {
        self.lifecycle.set_handshake_step(Some(step));
    }
}

impl Drop for HandshakeGuard<'_> {
    fn drop(&mut self) {
        self.lifecycle.set_handshake_step(None);
    }
}
