//! Axum handlers for one installed application.
//!
//! Every app gets the same route set under its prefix:
//!
//! | Route | Handler |
//! |---|---|
//! | `GET {prefix}`, `{prefix}/` | greeting |
//! | `GET/OPTIONS {prefix}/info` | [`info`] |
//! | `GET {prefix}/{server}/{session}/websocket` | [`websocket`] |
//! | `POST/OPTIONS .../xhr`, `.../xhr_streaming`, `.../xhr_send` | [`xhr`] |
//! | `GET .../jsonp`, `POST .../jsonp_send` | [`jsonp`] |
//! | `GET .../eventsource` | [`eventsource`] |

pub mod eventsource;
pub mod headers;
pub mod info;
pub mod jsonp;
pub mod websocket;
pub mod xhr;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use sockjs_core::{ProtocolError, SessionId, SockJsOptions};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::listener::{Framing, HttpListener};
use crate::registry::SessionRegistry;
use crate::session::{OpenHandler, Session, SessionConfig};
use crate::socket::PeerInfo;

pub(crate) const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";

/// Everything the handlers of one installed application share.
pub struct AppContext {
    pub options: SockJsOptions,
    pub on_open: OpenHandler,
    pub registry: Arc<SessionRegistry>,
    /// Cancelled when the server shuts down.
    pub shutdown: CancellationToken,
}

pub(crate) type AppState = Arc<AppContext>;

impl AppContext {
    /// Look up or create the polling session `id`.
    pub(crate) fn session(&self, id: &SessionId) -> Arc<Session> {
        self.registry.get_or_insert_with(id, || {
            Session::new(
                id.clone(),
                SessionConfig::polling(&self.options),
                Arc::clone(&self.on_open),
                Arc::downgrade(&self.registry),
            )
        })
    }

    /// An open session for a send endpoint. Never creates one.
    pub(crate) fn existing_session(&self, id: &SessionId) -> Result<Arc<Session>, ProtocolError> {
        self.registry
            .get(id)
            .filter(|session| !session.is_closed())
            .ok_or(ProtocolError::UnknownSession)
    }
}

/// A [`ProtocolError`] answered over HTTP with its fixed status and body.
#[derive(Debug)]
pub struct Rejection(pub ProtocolError);

impl From<ProtocolError> for Rejection {
    fn from(err: ProtocolError) -> Self {
        Self(err)
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN))],
            self.0.body(),
        )
            .into_response()
    }
}

/// Validate the `{server}/{session}` path segments.
pub(crate) fn session_id(server: &str, session: &str) -> Result<SessionId, Rejection> {
    if !SessionId::is_valid_segment(server) {
        return Err(Rejection(ProtocolError::UnknownSession));
    }
    Ok(session.parse::<SessionId>()?)
}

/// Attach a new HTTP listener to session `id` and build the streaming
/// response that carries it.
pub(crate) fn attach(
    app: &AppContext,
    id: &SessionId,
    peer: PeerInfo,
    framing: Framing,
    request: &HeaderMap,
    cors: bool,
) -> Response {
    let mut response_headers = HeaderMap::new();
    let _ = response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(framing.content_type()),
    );
    headers::no_cache(&mut response_headers);
    headers::jsessionid(&app.options, request, &mut response_headers);
    if cors {
        headers::cors(request, &mut response_headers);
    }

    let session = app.session(id);
    session.set_peer(peer);
    let (listener, body) = HttpListener::new(framing);
    session.register(listener);

    (response_headers, Body::from_stream(body)).into_response()
}

/// Feed a send-endpoint payload into `session`.
///
/// A body that is not UTF-8 is malformed and closes the session.
pub(crate) fn deliver(session: &Session, payload: &[u8]) -> Result<(), Rejection> {
    if payload.is_empty() {
        return Err(Rejection(ProtocolError::PayloadExpected));
    }
    let Ok(text) = std::str::from_utf8(payload) else {
        warn!(session_id = %session.id(), "inbound payload is not UTF-8, closing session");
        session.close();
        return Err(Rejection(ProtocolError::MalformedFrame));
    };
    session.handle_inbound(text).map_err(|err| {
        warn!(session_id = %session.id(), error_kind = err.error_kind(), "rejected inbound payload");
        Rejection(err)
    })
}

/// Greeting served at the app prefix.
async fn greeting() -> Response {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN))],
        "Welcome to SockJS!\n",
    )
        .into_response()
}

/// Build the routes for one application mounted at `prefix`.
pub fn app_router(prefix: &str, app: AppState) -> Router {
    let base = prefix.trim_end_matches('/');
    let session_path = |transport: &str| format!("{base}/{{server}}/{{session}}/{transport}");

    let mut router = Router::new();
    router = if base.is_empty() {
        router.route("/", get(greeting))
    } else {
        router
            .route(base, get(greeting))
            .route(&format!("{base}/"), get(greeting))
    };

    router = router
        .route(
            &format!("{base}/info"),
            get(info::info).options(info::info_options),
        )
        .route(
            &session_path("xhr"),
            post(xhr::xhr_polling).options(xhr::xhr_options),
        )
        .route(
            &session_path("xhr_streaming"),
            post(xhr::xhr_streaming).options(xhr::xhr_options),
        )
        .route(
            &session_path("xhr_send"),
            post(xhr::xhr_send).options(xhr::xhr_options),
        )
        .route(&session_path("jsonp"), get(jsonp::jsonp))
        .route(&session_path("jsonp_send"), post(jsonp::jsonp_send))
        .route(&session_path("eventsource"), get(eventsource::eventsource));

    if app.options.websocket_enabled {
        router = router.route(&session_path("websocket"), get(websocket::websocket));
    }

    router.with_state(app)
}
