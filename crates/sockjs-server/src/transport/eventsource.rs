use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;

use super::{attach, session_id, AppState, Rejection};
use crate::listener::Framing;
use crate::socket::PeerInfo;

/// `GET .../eventsource`: server-sent events until the byte budget is spent.
pub async fn eventsource(
    State(app): State<AppState>,
    Path((server, session)): Path<(String, String)>,
    peer: PeerInfo,
    request: HeaderMap,
) -> Result<Response, Rejection> {
    let id = session_id(&server, &session)?;
    let framing = Framing::EventSource {
        max_bytes: app.options.max_bytes_streaming,
    };
    Ok(attach(&app, &id, peer, framing, &request, false))
}
