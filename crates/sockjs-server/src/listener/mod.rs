//! Transport listeners.
//!
//! A listener adapts one HTTP response (or one upgraded socket) to what a
//! [`Session`](crate::session::Session) needs: deliver a frame, end cleanly,
//! and report when the underlying connection went away. The session never
//! learns which transport it is talking to.

pub mod http;
pub mod websocket;

use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

pub use http::{Framing, HttpListener, ListenerBody};
pub use websocket::WebSocketListener;

/// Process-unique listener identifier.
pub type ListenerId = u64;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_listener_id() -> ListenerId {
    NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Outcome of handing a frame to a listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The listener stays attached and can take more frames.
    Continue,
    /// The listener has finished: a one-shot response was written, the
    /// streaming byte budget was reached, or the peer is gone.
    Complete,
}

/// One attachable connection of a session.
pub trait TransportListener: Send + Sync {
    fn id(&self) -> ListenerId;

    /// Short transport name for logs (`xhr`, `eventsource`, ...).
    fn transport(&self) -> &'static str;

    /// Write one frame. Never calls back into the session.
    fn send_frame(&self, frame: &str) -> Delivery;

    /// End the connection. Idempotent.
    fn close(&self);

    /// Cancelled once the underlying connection has gone away, whether
    /// because it ended normally or because the peer aborted it.
    fn disconnected(&self) -> CancellationToken;
}
