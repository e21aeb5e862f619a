//! The virtual socket handed to application code, and the peer details
//! captured when its session opened.

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use axum::extract::connect_info::{ConnectInfo, Connected};
use axum::extract::{FromRequestParts, OriginalUri};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Uri};
use axum::serve::IncomingStream;
use sockjs_core::{SessionId, SocketError};
use tokio::net::TcpListener;

use crate::session::Session;

/// Both ends of an accepted TCP connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionAddrs {
    pub remote: SocketAddr,
    pub local: Option<SocketAddr>,
}

impl Connected<IncomingStream<'_, TcpListener>> for ConnectionAddrs {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        Self {
            remote: *stream.remote_addr(),
            local: stream.io().local_addr().ok(),
        }
    }
}

/// Who opened a session.
///
/// Taken from the first request of the session. The `Cookie` header is
/// stripped.
#[derive(Clone, Debug)]
pub struct PeerInfo {
    pub remote_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl PeerInfo {
    #[cfg(test)]
    pub(crate) fn for_uri(uri: &'static str) -> Self {
        Self {
            remote_addr: None,
            local_addr: None,
            uri: Uri::from_static(uri),
            headers: HeaderMap::new(),
        }
    }
}

impl<S> FromRequestParts<S> for PeerInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let addrs = parts
            .extensions
            .get::<ConnectInfo<ConnectionAddrs>>()
            .map(|info| info.0);
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map_or_else(|| parts.uri.clone(), |original| original.0.clone());
        let mut headers = parts.headers.clone();
        let _ = headers.remove(header::COOKIE);

        Ok(Self {
            remote_addr: addrs.map(|a| a.remote),
            local_addr: addrs.and_then(|a| a.local),
            uri,
            headers,
        })
    }
}

/// Application-side handle onto a session.
///
/// Cheap to clone. Holds the session weakly: once the session is closed and
/// dropped, writes fail with [`SocketError::Closed`] and everything else is
/// a no-op.
#[derive(Clone)]
pub struct SockJsSocket {
    id: SessionId,
    session: Weak<Session>,
}

impl SockJsSocket {
    pub(crate) fn new(id: SessionId, session: Weak<Session>) -> Self {
        Self { id, session }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Send one message to the client.
    pub fn write(&self, message: impl Into<String>) -> Result<(), SocketError> {
        let session = self.session.upgrade().ok_or(SocketError::Closed)?;
        session.write(message.into())
    }

    /// Install the callback for inbound messages. Messages that arrived
    /// before it was installed are delivered first.
    ///
    /// The callback runs synchronously on the task handling the request
    /// that carried the message, and deliveries on one session never
    /// overlap. It must not block: hand slow work to `tokio::spawn` and
    /// write the result back through a cloned socket.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        if let Some(session) = self.session.upgrade() {
            session.set_data_handler(Arc::new(handler));
        }
    }

    /// Install a callback that runs once when the session closes. Runs
    /// immediately if it already has.
    pub fn set_close_handler<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.session.upgrade() {
            Some(session) => session.set_close_handler(Box::new(handler)),
            None => handler(),
        }
    }

    /// Stop delivering inbound messages; they are buffered in order.
    pub fn pause(&self) {
        if let Some(session) = self.session.upgrade() {
            session.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(session) = self.session.upgrade() {
            session.resume();
        }
    }

    pub fn close(&self) {
        if let Some(session) = self.session.upgrade() {
            session.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.session.upgrade().map_or(true, |session| session.is_closed())
    }

    pub fn peer(&self) -> Option<PeerInfo> {
        self.session.upgrade().and_then(|session| session.peer())
    }
}

impl fmt::Debug for SockJsSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SockJsSocket").field("id", &self.id).finish()
    }
}
