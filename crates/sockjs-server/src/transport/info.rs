//! `/info`: what the server offers, so a client can pick a transport.

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use super::{headers, AppState};

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub websocket: bool,
    pub cookie_needed: bool,
    pub origins: Vec<&'static str>,
    pub entropy: u32,
}

pub async fn info(State(app): State<AppState>, request: HeaderMap) -> Response {
    let body = InfoResponse {
        websocket: app.options.websocket_enabled,
        cookie_needed: app.options.insert_jsessionid,
        origins: vec!["*:*"],
        entropy: rand::random(),
    };

    let mut out = HeaderMap::new();
    let _ = out.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=UTF-8"),
    );
    headers::no_cache(&mut out);
    headers::cors(&request, &mut out);
    let json = serde_json::to_string(&body).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize info response");
        String::from("{}")
    });
    (out, json).into_response()
}

pub async fn info_options(State(app): State<AppState>, request: HeaderMap) -> Response {
    headers::preflight(&app.options, &request, "OPTIONS, GET")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sockjs_core::SockJsOptions;
    use tower::ServiceExt;

    use super::*;
    use crate::transport::app_router;
    use crate::transport::testing::{app_with, body_string, echo_app};

    #[tokio::test]
    async fn info_describes_options() {
        let router = app_router("/echo", echo_app());
        let resp = router
            .oneshot(Request::get("/echo/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "application/json; charset=UTF-8"
        );
        let parsed: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(parsed["websocket"], true);
        assert_eq!(parsed["cookie_needed"], true);
        assert_eq!(parsed["origins"], serde_json::json!(["*:*"]));
        assert!(parsed["entropy"].is_u64());
    }

    #[tokio::test]
    async fn info_reflects_disabled_websocket() {
        let options = SockJsOptions {
            websocket_enabled: false,
            insert_jsessionid: false,
            ..SockJsOptions::default()
        };
        let router = app_router("/x", app_with(options, Arc::new(|_| {})));
        let resp = router
            .oneshot(Request::get("/x/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(parsed["websocket"], false);
        assert_eq!(parsed["cookie_needed"], false);
    }

    #[tokio::test]
    async fn info_preflight() {
        let router = app_router("/echo", echo_app());
        let resp = router
            .oneshot(Request::options("/echo/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "OPTIONS, GET"
        );
    }
}
