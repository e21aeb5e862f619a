//! Listener over a streaming HTTP response body.
//!
//! The handler returns the response immediately with a [`ListenerBody`]; the
//! session pushes framed chunks through an unbounded channel. Dropping the
//! body (client abort, or the response finishing) cancels the listener's
//! `disconnected` token through a drop guard.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use sockjs_core::codec;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

use super::{next_listener_id, Delivery, ListenerId, TransportListener};

/// Streaming-poll padding: 2048 `h` bytes and a newline.
const STREAMING_PREAMBLE_LEN: usize = 2048;

/// How frames are laid out on the response body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Framing {
    /// Long-poll: one `frame\n`, then the response ends.
    XhrPolling,
    /// Streaming-poll: padding once, then `frame\n` until the byte budget.
    XhrStreaming { max_bytes: usize },
    /// Callback-wrapped poll: one `callback("escaped");\r\n`.
    Jsonp { callback: String },
    /// Push-stream: `\r\n` once, then `data: frame\r\n\r\n` until the budget.
    EventSource { max_bytes: usize },
}

impl Framing {
    pub fn name(&self) -> &'static str {
        match self {
            Self::XhrPolling => "xhr",
            Self::XhrStreaming { .. } => "xhr_streaming",
            Self::Jsonp { .. } => "jsonp",
            Self::EventSource { .. } => "eventsource",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::XhrPolling | Self::XhrStreaming { .. } | Self::Jsonp { .. } => {
                "application/javascript; charset=UTF-8"
            }
            Self::EventSource { .. } => "text/event-stream; charset=UTF-8",
        }
    }

    fn preamble(&self) -> Option<Bytes> {
        match self {
            Self::XhrStreaming { .. } => {
                let mut block = vec![b'h'; STREAMING_PREAMBLE_LEN];
                block.push(b'\n');
                Some(Bytes::from(block))
            }
            Self::EventSource { .. } => Some(Bytes::from_static(b"\r\n")),
            Self::XhrPolling | Self::Jsonp { .. } => None,
        }
    }

    fn wrap(&self, frame: &str) -> String {
        match self {
            Self::XhrPolling | Self::XhrStreaming { .. } => format!("{frame}\n"),
            Self::Jsonp { callback } => {
                format!("{callback}(\"{}\");\r\n", codec::escape_for_script(frame))
            }
            Self::EventSource { .. } => format!("data: {frame}\r\n\r\n"),
        }
    }

    /// Bytes after which the response is recycled; `None` for one-shot
    /// framings.
    fn budget(&self) -> Option<usize> {
        match self {
            Self::XhrStreaming { max_bytes } | Self::EventSource { max_bytes } => Some(*max_bytes),
            Self::XhrPolling | Self::Jsonp { .. } => None,
        }
    }
}

struct Progress {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    preamble_sent: bool,
    bytes_sent: usize,
}

/// Listener for every HTTP-response-backed transport.
pub struct HttpListener {
    id: ListenerId,
    framing: Framing,
    progress: Mutex<Progress>,
    token: CancellationToken,
}

impl HttpListener {
    /// Create a listener and the response body it writes into.
    pub fn new(framing: Framing) -> (Arc<Self>, ListenerBody) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let listener = Arc::new(Self {
            id: next_listener_id(),
            framing,
            progress: Mutex::new(Progress {
                tx: Some(tx),
                preamble_sent: false,
                bytes_sent: 0,
            }),
            token: token.clone(),
        });
        let body = ListenerBody {
            chunks: UnboundedReceiverStream::new(rx),
            _guard: token.drop_guard(),
        };
        (listener, body)
    }

    pub fn framing(&self) -> &Framing {
        &self.framing
    }

    /// Payload bytes written so far, padding excluded.
    pub fn bytes_sent(&self) -> usize {
        self.progress.lock().bytes_sent
    }
}

impl TransportListener for HttpListener {
    fn id(&self) -> ListenerId {
        self.id
    }

    fn transport(&self) -> &'static str {
        self.framing.name()
    }

    fn send_frame(&self, frame: &str) -> Delivery {
        let mut progress = self.progress.lock();
        let Some(tx) = progress.tx.clone() else {
            return Delivery::Complete;
        };

        if !progress.preamble_sent {
            progress.preamble_sent = true;
            if let Some(preamble) = self.framing.preamble() {
                let _ = tx.send(preamble);
            }
        }

        let chunk = self.framing.wrap(frame);
        let len = chunk.len();
        trace!(listener_id = self.id, transport = self.framing.name(), frame, "sending frame");
        if tx.send(Bytes::from(chunk)).is_err() {
            progress.tx = None;
            return Delivery::Complete;
        }
        progress.bytes_sent += len;

        let finished = match self.framing.budget() {
            None => true,
            Some(max_bytes) => {
                let over = progress.bytes_sent >= max_bytes;
                if over {
                    debug!(
                        listener_id = self.id,
                        transport = self.framing.name(),
                        bytes = progress.bytes_sent,
                        "byte budget reached, recycling response"
                    );
                }
                over
            }
        };

        if finished {
            progress.tx = None;
            Delivery::Complete
        } else {
            Delivery::Continue
        }
    }

    fn close(&self) {
        self.progress.lock().tx = None;
    }

    fn disconnected(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Response body fed by an [`HttpListener`].
///
/// Ends once the listener closes; dropping it marks the listener
/// disconnected.
pub struct ListenerBody {
    chunks: UnboundedReceiverStream<Bytes>,
    _guard: DropGuard,
}

impl Stream for ListenerBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().chunks)
            .poll_next(cx)
            .map(|chunk| chunk.map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    async fn collect(body: ListenerBody) -> String {
        let chunks: Vec<_> = body.collect().await;
        let mut out = String::new();
        for chunk in chunks {
            out.push_str(std::str::from_utf8(&chunk.unwrap()).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn polling_writes_one_frame_then_ends() {
        let (listener, body) = HttpListener::new(Framing::XhrPolling);
        assert_eq!(listener.send_frame("o"), Delivery::Complete);
        assert_eq!(listener.send_frame("h"), Delivery::Complete);
        assert_eq!(collect(body).await, "o\n");
    }

    #[tokio::test]
    async fn jsonp_wraps_and_escapes() {
        let (listener, body) = HttpListener::new(Framing::Jsonp {
            callback: "cb".into(),
        });
        assert_eq!(listener.send_frame(r#"a["x"]"#), Delivery::Complete);
        assert_eq!(collect(body).await, "cb(\"a[\\\"x\\\"]\");\r\n");
    }

    #[tokio::test]
    async fn streaming_prepends_padding_once() {
        let (listener, body) = HttpListener::new(Framing::XhrStreaming { max_bytes: 1024 });
        assert_eq!(listener.send_frame("o"), Delivery::Continue);
        assert_eq!(listener.send_frame("h"), Delivery::Continue);
        listener.close();
        let out = collect(body).await;
        let (padding, rest) = out.split_at(STREAMING_PREAMBLE_LEN + 1);
        assert!(padding[..STREAMING_PREAMBLE_LEN].bytes().all(|b| b == b'h'));
        assert!(padding.ends_with('\n'));
        assert_eq!(rest, "o\nh\n");
        assert_eq!(listener.bytes_sent(), 4);
    }

    #[tokio::test]
    async fn eventsource_framing_and_budget() {
        let (listener, body) = HttpListener::new(Framing::EventSource { max_bytes: 20 });
        // "data: o\r\n\r\n" is 11 bytes
        assert_eq!(listener.send_frame("o"), Delivery::Continue);
        assert_eq!(listener.send_frame("h"), Delivery::Complete);
        assert_eq!(listener.send_frame("h"), Delivery::Complete);
        assert_eq!(collect(body).await, "\r\ndata: o\r\n\r\ndata: h\r\n\r\n");
        assert_eq!(listener.bytes_sent(), 22);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_ends_body() {
        let (listener, body) = HttpListener::new(Framing::EventSource { max_bytes: 100 });
        listener.close();
        listener.close();
        assert_eq!(listener.send_frame("o"), Delivery::Complete);
        assert_eq!(collect(body).await, "");
    }

    #[tokio::test]
    async fn body_yields_frames_as_they_are_sent() {
        let (listener, mut body) = HttpListener::new(Framing::EventSource { max_bytes: 100 });
        let writer = Arc::clone(&listener);
        let send = tokio::spawn(async move {
            tokio::task::yield_now().await;
            let _ = writer.send_frame("o");
        });

        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from_static(b"\r\n"));
        assert_eq!(
            body.next().await.unwrap().unwrap(),
            Bytes::from_static(b"data: o\r\n\r\n")
        );
        send.await.unwrap();

        listener.close();
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_body_cancels_token() {
        let (listener, body) = HttpListener::new(Framing::XhrPolling);
        let token = listener.disconnected();
        assert!(!token.is_cancelled());
        drop(body);
        assert!(token.is_cancelled());
        assert_eq!(listener.send_frame("o"), Delivery::Complete);
    }

    #[test]
    fn content_types() {
        assert_eq!(
            Framing::XhrPolling.content_type(),
            "application/javascript; charset=UTF-8"
        );
        assert_eq!(
            Framing::EventSource { max_bytes: 1 }.content_type(),
            "text/event-stream; charset=UTF-8"
        );
    }
}
