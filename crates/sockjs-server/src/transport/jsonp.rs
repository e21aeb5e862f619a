//! Callback-wrapped polling and its form-encoded send endpoint.

use std::borrow::Cow;
use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use sockjs_core::ProtocolError;

use super::{attach, deliver, headers, session_id, AppState, Rejection, TEXT_PLAIN};
use crate::listener::Framing;
use crate::socket::PeerInfo;

/// `GET .../jsonp?c=callback`
pub async fn jsonp(
    State(app): State<AppState>,
    Path((server, session)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    peer: PeerInfo,
    request: HeaderMap,
) -> Result<Response, Rejection> {
    let id = session_id(&server, &session)?;
    let callback = params
        .get("callback")
        .or_else(|| params.get("c"))
        .cloned()
        .ok_or(ProtocolError::MissingCallback)?;
    Ok(attach(
        &app,
        &id,
        peer,
        Framing::Jsonp { callback },
        &request,
        false,
    ))
}

/// `POST .../jsonp_send`
pub async fn jsonp_send(
    State(app): State<AppState>,
    Path((server, session)): Path<(String, String)>,
    request: HeaderMap,
    body: Bytes,
) -> Result<Response, Rejection> {
    let id = session_id(&server, &session)?;
    let session = app.existing_session(&id)?;

    let form_encoded = match media_type(&request).as_deref() {
        Some("application/x-www-form-urlencoded") => true,
        Some("text/plain") => false,
        _ => return Err(ProtocolError::InvalidContentType.into()),
    };

    let payload = extract_payload(&body, form_encoded)?;
    deliver(&session, &payload)?;

    let mut out = HeaderMap::new();
    let _ = out.insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    headers::no_cache(&mut out);
    headers::jsessionid(&app.options, &request, &mut out);
    Ok((out, "ok").into_response())
}

/// The request's media type, lower-cased, without parameters.
fn media_type(request: &HeaderMap) -> Option<String> {
    let value = headers::get(request, &header::CONTENT_TYPE)?;
    let media = value.split(';').next().unwrap_or_default().trim();
    Some(media.to_ascii_lowercase())
}

/// The message body of a send: raw for `text/plain`, the decoded `d` field
/// for form posts.
fn extract_payload(body: &[u8], form_encoded: bool) -> Result<Cow<'_, [u8]>, ProtocolError> {
    if body.is_empty() {
        return Err(ProtocolError::PayloadExpected);
    }
    if !form_encoded {
        return Ok(Cow::Borrowed(body));
    }
    if !body.starts_with(b"d=") || body.len() <= 2 {
        return Err(ProtocolError::PayloadExpected);
    }
    url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "d")
        .map(|(_, value)| Cow::Owned(value.into_owned().into_bytes()))
        .ok_or(ProtocolError::PayloadExpected)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use parking_lot::Mutex;
    use sockjs_core::{SessionId, SockJsOptions};
    use tower::ServiceExt;

    use super::*;
    use crate::session::OpenHandler;
    use crate::socket::SockJsSocket;
    use crate::transport::app_router;
    use crate::transport::testing::{app_with, body_string, echo_app};

    fn send(uri: &str, content_type: &'static str, body: &'static str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn missing_callback_creates_no_session() {
        let app = echo_app();
        let router = app_router("/echo", Arc::clone(&app));
        let resp = router
            .oneshot(Request::get("/echo/0/j/jsonp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(resp).await, "\"callback\" parameter required\n");
        assert!(app.registry.is_empty());
    }

    #[tokio::test]
    async fn poll_wraps_frame_in_callback() {
        let router = app_router("/echo", echo_app());
        let resp = router
            .oneshot(
                Request::get("/echo/0/j/jsonp?c=cb")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "application/javascript; charset=UTF-8"
        );
        assert_eq!(body_string(resp).await, "cb(\"o\");\r\n");
    }

    #[tokio::test]
    async fn form_send_delivers_messages_in_order() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let on_open: OpenHandler = Arc::new(move |socket: SockJsSocket| {
            let sink = Arc::clone(&sink);
            socket.set_handler(move |msg| sink.lock().push(msg));
        });
        let router = app_router("/app", app_with(SockJsOptions::default(), on_open));

        let resp = router
            .clone()
            .oneshot(
                Request::get("/app/0/f/jsonp?callback=x")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_string(resp).await, "x(\"o\");\r\n");

        let resp = router
            .oneshot(send(
                "/app/0/f/jsonp_send",
                "application/x-www-form-urlencoded",
                "d=%5B%22msg1%22%2C%22msg2%22%5D",
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "ok");
        assert_eq!(*received.lock(), vec!["msg1", "msg2"]);
    }

    #[tokio::test]
    async fn text_plain_send_and_echo() {
        let router = app_router("/echo", echo_app());
        let _ = router
            .clone()
            .oneshot(Request::get("/echo/0/t/jsonp?c=cb").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let resp = router
            .clone()
            .oneshot(send(
                "/echo/0/t/jsonp_send",
                "text/plain; charset=UTF-8",
                r#"["x"]"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = router
            .oneshot(Request::get("/echo/0/t/jsonp?c=cb").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_string(resp).await, "cb(\"a[\\\"x\\\"]\");\r\n");
    }

    #[tokio::test]
    async fn wrong_content_type_is_rejected() {
        let app = echo_app();
        let router = app_router("/echo", Arc::clone(&app));
        let _ = router
            .clone()
            .oneshot(Request::get("/echo/0/w/jsonp?c=cb").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let resp = router
            .oneshot(send("/echo/0/w/jsonp_send", "application/json", r#"["x"]"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(resp).await, "Invalid Content-Type");
        assert!(app.registry.contains(&SessionId::from_raw("w")));
    }

    #[tokio::test]
    async fn non_utf8_text_send_closes_session() {
        let app = echo_app();
        let router = app_router("/echo", Arc::clone(&app));
        let _ = router
            .clone()
            .oneshot(Request::get("/echo/0/u/jsonp?c=cb").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let resp = router
            .oneshot(
                Request::post("/echo/0/u/jsonp_send")
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(Body::from(vec![0xff, 0xfe]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(resp).await, "Broken JSON encoding.");
        assert!(app.registry.is_empty());
    }

    #[tokio::test]
    async fn send_to_unknown_session_is_404() {
        let router = app_router("/echo", echo_app());
        let resp = router
            .oneshot(send("/echo/0/none/jsonp_send", "text/plain", r#"["x"]"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn payload_extraction() {
        assert_eq!(extract_payload(b"", false), Err(ProtocolError::PayloadExpected));
        assert_eq!(extract_payload(b"d=", true), Err(ProtocolError::PayloadExpected));
        assert_eq!(extract_payload(b"x=1", true), Err(ProtocolError::PayloadExpected));
        assert_eq!(extract_payload(b"d=%22a+b%22", true).unwrap(), &b"\"a b\""[..]);
        assert_eq!(extract_payload(br#"["raw"]"#, false).unwrap(), &br#"["raw"]"#[..]);
    }

    #[test]
    fn media_type_ignores_parameters_and_case() {
        let mut request = HeaderMap::new();
        let _ = request.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("Text/Plain; charset=UTF-8"),
        );
        assert_eq!(media_type(&request).as_deref(), Some("text/plain"));
        assert_eq!(media_type(&HeaderMap::new()), None);
    }
}
