//! Frame codec.
//!
//! Outbound frames are plain strings:
//!
//! | Frame | Wire form |
//! |---|---|
//! | open | `o` |
//! | heartbeat | `h` |
//! | messages | `a` + JSON array of strings |
//! | close | `c` + JSON `[code, reason]` |
//!
//! Inbound bodies are either a JSON array of strings or a single JSON string.

use serde::Deserialize;

use crate::errors::ProtocolError;

/// Close code sent when the server ends a session.
pub const GO_AWAY_CODE: u16 = 3000;

/// Close reason sent alongside [`GO_AWAY_CODE`].
pub const GO_AWAY_REASON: &str = "Go away!";

/// Open frame.
pub const OPEN_FRAME: &str = "o";

/// Heartbeat frame.
pub const HEARTBEAT_FRAME: &str = "h";

#[derive(Deserialize)]
#[serde(untagged)]
enum InboundBody {
    Batch(Vec<String>),
    Single(String),
}

/// Decode an inbound body into its messages, in order.
///
/// Accepts `["a","b"]` or the single-message shorthand `"a"`. Any other
/// shape is rejected as a whole.
pub fn decode(body: &str) -> Result<Vec<String>, ProtocolError> {
    match serde_json::from_str::<InboundBody>(body) {
        Ok(InboundBody::Batch(messages)) => Ok(messages),
        Ok(InboundBody::Single(message)) => Ok(vec![message]),
        Err(_) => Err(ProtocolError::MalformedFrame),
    }
}

/// Cheap top-level shape check applied to full-duplex payloads before
/// decoding: `["…"]` or `"…"`.
pub fn has_frame_shape(payload: &str) -> bool {
    (payload.len() >= 4 && payload.starts_with("[\"") && payload.ends_with("\"]"))
        || (payload.len() >= 2 && payload.starts_with('"') && payload.ends_with('"'))
}

pub fn encode_open() -> String {
    OPEN_FRAME.to_string()
}

pub fn encode_heartbeat() -> String {
    HEARTBEAT_FRAME.to_string()
}

/// Encode a batch of messages as one `a[...]` frame.
pub fn encode_messages<S: AsRef<str>>(messages: &[S]) -> String {
    let refs: Vec<&str> = messages.iter().map(AsRef::as_ref).collect();
    // Serializing a slice of &str cannot fail.
    let body = serde_json::to_string(&refs).unwrap_or_else(|_| "[]".to_string());
    format!("a{body}")
}

pub fn encode_close(code: u16, reason: &str) -> String {
    let body = serde_json::to_string(&(code, reason)).unwrap_or_else(|_| format!("[{code},\"\"]"));
    format!("c{body}")
}

/// The close frame sent whenever the server shuts a session down.
pub fn encode_go_away() -> String {
    encode_close(GO_AWAY_CODE, GO_AWAY_REASON)
}

/// Escape a frame so it can sit inside a double-quoted script string literal.
///
/// Only backslash, double quote and the two line terminators that a script
/// string may not contain (U+2028, U+2029) are touched.
pub fn escape_for_script(frame: &str) -> String {
    let mut out = String::with_capacity(frame.len() + 8);
    for ch in frame.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    out
}
