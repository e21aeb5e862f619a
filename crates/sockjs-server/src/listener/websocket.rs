//! Full-duplex listener over an upgraded socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use sockjs_core::codec;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{next_listener_id, Delivery, ListenerId, TransportListener};
use crate::session::Session;

/// Listener that forwards frames to a socket writer task.
pub struct WebSocketListener {
    id: ListenerId,
    tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    token: CancellationToken,
}

impl WebSocketListener {
    /// Create a listener and the receiving end its writer drains.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = Arc::new(Self {
            id: next_listener_id(),
            tx: Mutex::new(Some(tx)),
            token: CancellationToken::new(),
        });
        (listener, rx)
    }
}

impl TransportListener for WebSocketListener {
    fn id(&self) -> ListenerId {
        self.id
    }

    fn transport(&self) -> &'static str {
        "websocket"
    }

    fn send_frame(&self, frame: &str) -> Delivery {
        let mut tx = self.tx.lock();
        let Some(sender) = tx.as_ref() else {
            return Delivery::Complete;
        };
        trace!(listener_id = self.id, frame, "sending websocket frame");
        if sender.send(Message::Text(frame.to_owned().into())).is_err() {
            *tx = None;
            return Delivery::Complete;
        }
        Delivery::Continue
    }

    fn close(&self) {
        // Dropping the sender lets the writer flush what is queued and then
        // send a close frame.
        let _ = self.tx.lock().take();
    }

    fn disconnected(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Drive one upgraded socket until either side finishes.
///
/// Inbound text frames are fed to the session; empty frames are ignored and
/// anything that is not a JSON string or array of strings closes the session.
/// Returns once the socket is done; the listener is marked disconnected.
/// Cancelling `shutdown` closes the session.
pub async fn drive(
    socket: WebSocket,
    session: &Session,
    listener: &WebSocketListener,
    mut rx: mpsc::UnboundedReceiver<Message>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = async {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                return;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    };

    let reader = async {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    if session.is_closed() {
                        break;
                    }
                    let payload = text.as_str();
                    if payload.is_empty() {
                        continue;
                    }
                    if !codec::has_frame_shape(payload) {
                        warn!(session_id = %session.id(), "websocket payload is not a frame, closing");
                        session.close();
                        break;
                    }
                    if session.handle_inbound(payload).is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    tokio::pin!(writer);
    let flush = tokio::select! {
        () = &mut writer => false,
        () = reader => session.is_closed(),
        () = shutdown.cancelled() => {
            session.close();
            true
        }
    };
    // A closed session has dropped its sender; let the close frame out.
    if flush {
        writer.await;
    }

    debug!(listener_id = listener.id, session_id = %session.id(), "websocket finished");
    listener.token.cancel();
}
