//! Protocol and socket error types.

use thiserror::Error;

/// Errors raised while handling a transport request.
///
/// Each variant carries the fixed diagnostic body the HTTP layer answers
/// with (see [`ProtocolError::body`]).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Inbound body is not a JSON array of strings or a JSON string.
    #[error("broken JSON encoding")]
    MalformedFrame,
    /// A send endpoint received an empty body.
    #[error("payload expected")]
    PayloadExpected,
    /// A send endpoint received a body with an unsupported content type.
    #[error("invalid content type")]
    InvalidContentType,
    /// A callback-wrapped poll arrived without a `callback`/`c` parameter.
    #[error("callback parameter required")]
    MissingCallback,
    /// The session referenced by a send endpoint is unknown or closed.
    #[error("unknown or closed session")]
    UnknownSession,
}

impl ProtocolError {
    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::UnknownSession => 404,
            Self::MalformedFrame
            | Self::PayloadExpected
            | Self::InvalidContentType
            | Self::MissingCallback => 500,
        }
    }

    /// Fixed response body for this error.
    pub fn body(&self) -> &'static str {
        match self {
            Self::MalformedFrame => "Broken JSON encoding.",
            Self::PayloadExpected => "Payload expected.",
            Self::InvalidContentType => "Invalid Content-Type",
            Self::MissingCallback => "\"callback\" parameter required\n",
            Self::UnknownSession => "",
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MalformedFrame => "malformed_frame",
            Self::PayloadExpected => "payload_expected",
            Self::InvalidContentType => "invalid_content_type",
            Self::MissingCallback => "missing_callback",
            Self::UnknownSession => "unknown_session",
        }
    }
}

/// Errors surfaced to application code through the virtual socket.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SocketError {
    /// The session behind this socket has closed.
    #[error("socket closed")]
    Closed,
}
