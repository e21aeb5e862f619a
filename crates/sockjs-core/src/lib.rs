//! # sockjs-core
//!
//! Transport-independent pieces of the virtual socket protocol.
//!
//! - [`codec`]: frame encoding (`o`, `h`, `a[...]`, `c[...]`) and inbound decoding
//! - [`ids`]: client-supplied session identifiers
//! - [`options`]: per-application session options
//! - [`errors`]: protocol and socket error types

#![deny(unsafe_code)]

pub mod codec;
pub mod errors;
pub mod ids;
pub mod options;

pub use errors::{ProtocolError, SocketError};
pub use ids::SessionId;
pub use options::SockJsOptions;
