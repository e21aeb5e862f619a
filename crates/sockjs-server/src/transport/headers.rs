//! Response header helpers shared by the transport handlers.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{Days, Utc};
use sockjs_core::SockJsOptions;

const ONE_YEAR_SECS: u64 = 31_536_000;

/// Forbid caching of a transport response.
pub fn no_cache(out: &mut HeaderMap) {
    let _ = out.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
    );
}

/// Allow the requesting origin, with credentials.
pub fn cors(request: &HeaderMap, out: &mut HeaderMap) {
    let origin = request
        .get(header::ORIGIN)
        .filter(|origin| origin.as_bytes() != b"null")
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));
    let _ = out.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    let _ = out.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    if let Some(requested) = request.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
        let _ = out.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    }
}

/// Let the client cache the response for a year.
pub fn cache_for_a_year(out: &mut HeaderMap) {
    let _ = out.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000"),
    );
    let now = Utc::now();
    let expires = now.checked_add_days(Days::new(365)).unwrap_or(now);
    if let Ok(value) =
        HeaderValue::from_str(&expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
    {
        let _ = out.insert(header::EXPIRES, value);
    }
    let _ = out.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from(ONE_YEAR_SECS),
    );
}

/// Echo the client's `JSESSIONID` cookie, or set a dummy one, when the app
/// asks for it.
pub fn jsessionid(options: &SockJsOptions, request: &HeaderMap, out: &mut HeaderMap) {
    if !options.insert_jsessionid {
        return;
    }
    let value = request
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == "JSESSIONID")
        .map_or("dummy", |(_, value)| value);
    if let Ok(cookie) = HeaderValue::from_str(&format!("JSESSIONID={value}; path=/")) {
        let _ = out.insert(header::SET_COOKIE, cookie);
    }
}

/// `204` answer to a CORS preflight for an endpoint accepting `methods`.
pub fn preflight(options: &SockJsOptions, request: &HeaderMap, methods: &'static str) -> Response {
    let mut out = HeaderMap::new();
    cache_for_a_year(&mut out);
    let _ = out.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(methods),
    );
    cors(request, &mut out);
    jsessionid(options, request, &mut out);
    (StatusCode::NO_CONTENT, out).into_response()
}

/// A header value as text, if it is visible ASCII.
pub(crate) fn get<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
