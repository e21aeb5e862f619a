//! Built-in applications used by the binary and the protocol test suites.

use tracing::debug;

use crate::socket::SockJsSocket;

/// Write every inbound message straight back to the client.
pub fn echo(socket: SockJsSocket) {
    let writer = socket.clone();
    socket.set_handler(move |message| {
        if let Err(e) = writer.write(message) {
            debug!(session_id = %writer.id(), error = %e, "echo dropped message");
        }
    });
}

/// Close every session as soon as it opens.
pub fn close(socket: SockJsSocket) {
    socket.close();
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Weak};
    use std::time::Duration;

    use sockjs_core::{SessionId, SockJsOptions};

    use super::*;
    use crate::listener::testing::RecordingListener;
    use crate::session::{Session, SessionConfig};

    fn open(handler: fn(SockJsSocket)) -> (Arc<Session>, Arc<RecordingListener>) {
        let session = Session::new(
            SessionId::from_raw("app"),
            SessionConfig::polling(&SockJsOptions::default()),
            Arc::new(handler),
            Weak::new(),
        );
        let listener = RecordingListener::streaming();
        session.register(listener.clone());
        (session, listener)
    }

    #[tokio::test(start_paused = true)]
    async fn echo_writes_messages_back() {
        let (session, listener) = open(echo);
        session.handle_inbound(r#"["a","b"]"#).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(listener.frames(), vec!["o", "a[\"a\"]", "a[\"b\"]"]);
    }

    #[tokio::test(start_paused = true)]
    async fn close_app_sends_go_away_on_open() {
        let (session, listener) = open(close);
        assert!(session.is_closed());
        assert_eq!(listener.frames(), vec!["o", "c[3000,\"Go away!\"]"]);
        assert!(listener.is_closed());
    }
}
