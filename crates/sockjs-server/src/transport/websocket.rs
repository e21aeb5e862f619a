//! Full-duplex transport.
//!
//! Each upgrade gets a session of its own that never enters the registry
//! and closes as soon as the socket does.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sockjs_core::SessionId;
use std::sync::{Arc, Weak};
use tracing::debug;

use super::{session_id, AppState, Rejection};
use crate::listener::{websocket, WebSocketListener};
use crate::session::{Session, SessionConfig};
use crate::socket::PeerInfo;

/// `GET .../websocket`
pub async fn websocket(
    State(app): State<AppState>,
    Path((server, session)): Path<(String, String)>,
    peer: PeerInfo,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, Rejection> {
    let id = session_id(&server, &session)?;
    let Ok(upgrade) = upgrade else {
        return Ok((
            StatusCode::BAD_REQUEST,
            "Can \"Upgrade\" only to \"WebSocket\".",
        )
            .into_response());
    };
    Ok(upgrade.on_upgrade(move |socket| serve(app, id, peer, socket)))
}

async fn serve(app: AppState, id: SessionId, peer: PeerInfo, socket: WebSocket) {
    debug!(session_id = %id, "websocket upgraded");
    let session = Session::new(
        id,
        SessionConfig::full_duplex(&app.options),
        Arc::clone(&app.on_open),
        Weak::new(),
    );
    session.set_peer(peer);

    let (listener, rx) = WebSocketListener::new();
    session.register(listener.clone());
    websocket::drive(socket, &session, &listener, rx, app.shutdown.clone()).await;
    // Nothing else holds the session; close it here so the close handler runs.
    session.close();
}
