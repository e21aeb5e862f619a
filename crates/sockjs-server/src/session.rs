//! Session state machine.
//!
//! A session outlives the individual HTTP requests that carry it. At most
//! one listener is attached at a time; while none is, outbound messages
//! queue up and a detach deadline runs. All mutation happens under the
//! per-session state lock, so racing `register` calls are linearised.
//!
//! ```text
//! NEW ──register──▶ OPEN(attached) ◀──register── OPEN(detached)
//!                        │   └──Complete / disconnect──▶ ┘ │
//!                        └──close / malformed / deadline──▶ CLOSED
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use sockjs_core::{codec, ProtocolError, SessionId, SocketError, SockJsOptions};
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

use crate::listener::{Delivery, ListenerId, TransportListener};
use crate::registry::SessionRegistry;
use crate::socket::{PeerInfo, SockJsSocket};

/// Application callback invoked once per session, when it opens.
pub type OpenHandler = Arc<dyn Fn(SockJsSocket) + Send + Sync>;

/// Floor for the heartbeat timer so a zero period cannot spin.
const MIN_HEARTBEAT: Duration = Duration::from_millis(1);

pub(crate) type DataHandler = Arc<dyn Fn(String) + Send + Sync>;
pub(crate) type CloseHandler = Box<dyn FnOnce() + Send>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    New,
    Open,
    Closed,
}

/// Timing fixed at session creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub heartbeat_period: Duration,
    /// How long a detached session waits for a new listener. `None` closes
    /// the session as soon as its listener goes away.
    pub session_timeout: Option<Duration>,
}

impl SessionConfig {
    /// Sessions shared by a sequence of HTTP requests.
    pub fn polling(options: &SockJsOptions) -> Self {
        Self {
            heartbeat_period: options.heartbeat_period(),
            session_timeout: Some(options.session_timeout()),
        }
    }

    /// Sessions bound to a single upgraded socket.
    pub fn full_duplex(options: &SockJsOptions) -> Self {
        Self {
            heartbeat_period: options.heartbeat_period(),
            session_timeout: None,
        }
    }
}

#[derive(Default)]
struct SessionState {
    phase: SessionPhase,
    listener: Option<Arc<dyn TransportListener>>,
    outbound: Vec<String>,
    inbound: VecDeque<String>,
    paused: bool,
    data_handler: Option<DataHandler>,
    close_handler: Option<CloseHandler>,
    heartbeat: Option<AbortHandle>,
    deadline: Option<AbortHandle>,
    /// Bumped on every detach so a stale deadline can tell it lost a race.
    detach_epoch: u64,
    peer: Option<PeerInfo>,
}

impl SessionState {
    fn listener_id(&self) -> Option<ListenerId> {
        self.listener.as_ref().map(|l| l.id())
    }
}

fn cancel(timer: &mut Option<AbortHandle>) {
    if let Some(handle) = timer.take() {
        handle.abort();
    }
}

/// One logical connection.
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    on_open: OpenHandler,
    registry: Weak<SessionRegistry>,
    weak_self: Weak<Session>,
    state: Mutex<SessionState>,
    /// Serialises inbound delivery. Reentrant so a data handler may call
    /// `resume` (or anything else that drains) on its own session.
    delivery: ReentrantMutex<()>,
}

impl Session {
    /// Create a session in the NEW phase.
    ///
    /// `registry` is where the session removes itself on close; pass
    /// `Weak::new()` for sessions that are never registered.
    pub fn new(
        id: SessionId,
        config: SessionConfig,
        on_open: OpenHandler,
        registry: Weak<SessionRegistry>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            id,
            config,
            on_open,
            registry,
            weak_self: weak_self.clone(),
            state: Mutex::new(SessionState::default()),
            delivery: ReentrantMutex::new(()),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == SessionPhase::Closed
    }

    pub fn has_listener(&self) -> bool {
        self.state.lock().listener.is_some()
    }

    /// Messages queued for the next listener.
    pub fn pending(&self) -> usize {
        self.state.lock().outbound.len()
    }

    /// Record who opened the session. Only the first call has an effect.
    pub fn set_peer(&self, peer: PeerInfo) {
        let mut st = self.state.lock();
        if st.peer.is_none() {
            st.peer = Some(peer);
        }
    }

    pub fn peer(&self) -> Option<PeerInfo> {
        self.state.lock().peer.clone()
    }

    /// Attach a listener.
    ///
    /// The first attach opens the session: `o` goes out, then the open
    /// handler runs with a fresh socket. Later attaches flush the queue as a
    /// single frame. A previously attached listener is closed without a
    /// frame. A closed session answers with the go-away frame.
    pub fn register(&self, listener: Arc<dyn TransportListener>) {
        let opened = {
            let mut st = self.state.lock();

            if st.phase == SessionPhase::Closed {
                debug!(
                    session_id = %self.id,
                    listener_id = listener.id(),
                    transport = listener.transport(),
                    "register on closed session"
                );
                let _ = listener.send_frame(&codec::encode_go_away());
                listener.close();
                return;
            }

            if let Some(previous) = st.listener.take() {
                debug!(
                    session_id = %self.id,
                    listener_id = previous.id(),
                    replaced_by = listener.id(),
                    "closing replaced listener"
                );
                previous.close();
            }
            cancel(&mut st.heartbeat);
            cancel(&mut st.deadline);

            debug!(
                session_id = %self.id,
                listener_id = listener.id(),
                transport = listener.transport(),
                "listener attached"
            );
            self.watch(listener.as_ref());
            st.listener = Some(listener);

            if st.phase == SessionPhase::New {
                st.phase = SessionPhase::Open;
                info!(session_id = %self.id, "session opened");
                self.send_locked(&mut st, &codec::encode_open());
                true
            } else {
                if st.outbound.is_empty() {
                    self.arm_heartbeat(&mut st);
                } else {
                    self.flush_locked(&mut st);
                }
                false
            }
        };

        if opened {
            (self.on_open)(SockJsSocket::new(self.id.clone(), self.weak_self.clone()));
        }
    }

    /// Queue a message; sent at once if a listener is attached.
    pub(crate) fn write(&self, message: String) -> Result<(), SocketError> {
        let mut st = self.state.lock();
        if st.phase == SessionPhase::Closed {
            return Err(SocketError::Closed);
        }
        st.outbound.push(message);
        if st.listener.is_some() {
            self.flush_locked(&mut st);
        }
        Ok(())
    }

    /// Decode an inbound body and deliver its messages in order.
    ///
    /// The data handler runs on the calling task. Concurrent callers on the
    /// same session are serialised, so one caller's batch is delivered whole
    /// before the next begins. A malformed body closes the session.
    pub fn handle_inbound(&self, body: &str) -> Result<(), ProtocolError> {
        let messages = match codec::decode(body) {
            Ok(messages) => messages,
            Err(err) => {
                warn!(
                    session_id = %self.id,
                    error_kind = err.error_kind(),
                    "malformed inbound frame, closing session"
                );
                self.close();
                return Err(err);
            }
        };

        let _gate = self.delivery.lock();
        {
            let mut st = self.state.lock();
            if st.phase == SessionPhase::Closed {
                return Ok(());
            }
            trace!(session_id = %self.id, count = messages.len(), "inbound messages");
            st.inbound.extend(messages);
        }
        self.drain_inbound();
        Ok(())
    }

    pub(crate) fn set_data_handler(&self, handler: DataHandler) {
        self.state.lock().data_handler = Some(handler);
        self.drain_inbound();
    }

    /// Install the close handler, or run it now if already closed.
    pub(crate) fn set_close_handler(&self, handler: CloseHandler) {
        let mut st = self.state.lock();
        if st.phase == SessionPhase::Closed {
            drop(st);
            handler();
            return;
        }
        st.close_handler = Some(handler);
    }

    pub(crate) fn pause(&self) {
        self.state.lock().paused = true;
    }

    pub(crate) fn resume(&self) {
        self.state.lock().paused = false;
        self.drain_inbound();
    }

    /// Close the session. Idempotent.
    pub fn close(&self) {
        self.shutdown_if(|_| true, "closed");
    }

    // ── internals ──────────────────────────────────────────────────────

    /// Hand buffered inbound messages to the data handler, one at a time,
    /// outside the state lock.
    fn drain_inbound(&self) {
        let _gate = self.delivery.lock();
        loop {
            let (handler, message) = {
                let mut st = self.state.lock();
                if st.paused || st.phase == SessionPhase::Closed {
                    return;
                }
                let Some(handler) = st.data_handler.clone() else {
                    return;
                };
                let Some(message) = st.inbound.pop_front() else {
                    return;
                };
                (handler, message)
            };
            handler(message);
        }
    }

    fn flush_locked(&self, st: &mut SessionState) {
        let batch = std::mem::take(&mut st.outbound);
        self.send_locked(st, &codec::encode_messages(&batch));
    }

    fn send_locked(&self, st: &mut SessionState, frame: &str) {
        let Some(listener) = st.listener.clone() else {
            return;
        };
        match listener.send_frame(frame) {
            Delivery::Continue => {
                if st.heartbeat.is_none() {
                    self.arm_heartbeat(st);
                }
            }
            Delivery::Complete => self.detach_locked(st),
        }
    }

    fn detach_locked(&self, st: &mut SessionState) {
        if let Some(listener) = st.listener.take() {
            listener.close();
            debug!(
                session_id = %self.id,
                listener_id = listener.id(),
                transport = listener.transport(),
                "listener detached"
            );
        }
        cancel(&mut st.heartbeat);
        self.arm_deadline(st);
    }

    fn arm_heartbeat(&self, st: &mut SessionState) {
        let Some(listener_id) = st.listener_id() else {
            return;
        };
        cancel(&mut st.heartbeat);
        let period = self.config.heartbeat_period.max(MIN_HEARTBEAT);
        let weak = self.weak_self.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let Some(session) = weak.upgrade() else {
                    return;
                };
                if !session.heartbeat(listener_id) {
                    return;
                }
            }
        });
        st.heartbeat = Some(task.abort_handle());
    }

    /// Emit `h` if `listener_id` is still attached. Returns whether it
    /// remains attached afterwards.
    fn heartbeat(&self, listener_id: ListenerId) -> bool {
        let mut st = self.state.lock();
        if st.phase != SessionPhase::Open || st.listener_id() != Some(listener_id) {
            return false;
        }
        trace!(session_id = %self.id, listener_id, "heartbeat");
        self.send_locked(&mut st, &codec::encode_heartbeat());
        st.listener_id() == Some(listener_id)
    }

    fn arm_deadline(&self, st: &mut SessionState) {
        cancel(&mut st.deadline);
        st.detach_epoch += 1;
        let epoch = st.detach_epoch;
        let timeout = self.config.session_timeout.unwrap_or(Duration::ZERO);
        let weak = self.weak_self.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(session) = weak.upgrade() {
                session.shutdown_if(
                    |st| st.listener.is_none() && st.detach_epoch == epoch,
                    "detach deadline expired",
                );
            }
        });
        st.deadline = Some(task.abort_handle());
    }

    /// Detach when the listener's connection goes away.
    fn watch(&self, listener: &dyn TransportListener) {
        let token = listener.disconnected();
        let listener_id = listener.id();
        let weak = self.weak_self.clone();
        drop(tokio::spawn(async move {
            token.cancelled().await;
            if let Some(session) = weak.upgrade() {
                session.transport_closed(listener_id);
            }
        }));
    }

    fn transport_closed(&self, listener_id: ListenerId) {
        let mut st = self.state.lock();
        if st.phase == SessionPhase::Closed || st.listener_id() != Some(listener_id) {
            return;
        }
        debug!(session_id = %self.id, listener_id, "listener disconnected");
        self.detach_locked(&mut st);
    }

    fn shutdown_if(&self, should_close: impl FnOnce(&SessionState) -> bool, reason: &str) {
        let (on_close, _released) = {
            let mut st = self.state.lock();
            if st.phase == SessionPhase::Closed || !should_close(&st) {
                return;
            }
            st.phase = SessionPhase::Closed;
            if let Some(listener) = st.listener.take() {
                let _ = listener.send_frame(&codec::encode_go_away());
                listener.close();
            }
            cancel(&mut st.heartbeat);
            cancel(&mut st.deadline);
            st.outbound.clear();
            st.inbound.clear();
            (st.close_handler.take(), st.data_handler.take())
        };

        if let Some(registry) = self.registry.upgrade() {
            let _ = registry.remove(self);
        }
        info!(session_id = %self.id, reason, "session closed");

        if let Some(on_close) = on_close {
            on_close();
        }
    }

    #[cfg(test)]
    fn deadline_armed(&self) -> bool {
        self.state.lock().deadline.is_some()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let st = self.state.get_mut();
        cancel(&mut st.heartbeat);
        cancel(&mut st.deadline);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
