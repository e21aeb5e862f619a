//! Long-poll and streaming XHR transports, and their send endpoint.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use super::{attach, deliver, headers, session_id, AppState, Rejection, TEXT_PLAIN};
use crate::listener::Framing;
use crate::socket::PeerInfo;

const XHR_METHODS: &str = "OPTIONS, POST";

/// `POST .../xhr`: one frame per request.
pub async fn xhr_polling(
    State(app): State<AppState>,
    Path((server, session)): Path<(String, String)>,
    peer: PeerInfo,
    request: HeaderMap,
) -> Result<Response, Rejection> {
    let id = session_id(&server, &session)?;
    Ok(attach(&app, &id, peer, Framing::XhrPolling, &request, true))
}

/// `POST .../xhr_streaming`: frames until the byte budget is spent.
pub async fn xhr_streaming(
    State(app): State<AppState>,
    Path((server, session)): Path<(String, String)>,
    peer: PeerInfo,
    request: HeaderMap,
) -> Result<Response, Rejection> {
    let id = session_id(&server, &session)?;
    let framing = Framing::XhrStreaming {
        max_bytes: app.options.max_bytes_streaming,
    };
    Ok(attach(&app, &id, peer, framing, &request, true))
}

/// `POST .../xhr_send`: a JSON body of messages for an open session.
pub async fn xhr_send(
    State(app): State<AppState>,
    Path((server, session)): Path<(String, String)>,
    request: HeaderMap,
    body: Bytes,
) -> Result<Response, Rejection> {
    let id = session_id(&server, &session)?;
    let session = app.existing_session(&id)?;
    deliver(&session, &body)?;

    let mut out = HeaderMap::new();
    let _ = out.insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    headers::no_cache(&mut out);
    headers::jsessionid(&app.options, &request, &mut out);
    headers::cors(&request, &mut out);
    Ok((StatusCode::NO_CONTENT, out).into_response())
}

/// `OPTIONS` on any of the XHR endpoints.
pub async fn xhr_options(State(app): State<AppState>, request: HeaderMap) -> Response {
    headers::preflight(&app.options, &request, XHR_METHODS)
}
