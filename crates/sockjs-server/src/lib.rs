//! # sockjs-server
//!
//! Virtual sockets over WebSocket and HTTP fallback transports.
//!
//! - Sessions outlive individual HTTP requests: messages written while no
//!   request is attached are queued and replayed on the next one
//! - Transports: XHR polling and streaming, JSONP polling, `EventSource`,
//!   and WebSocket
//! - A shared [`SessionRegistry`] indexes polling sessions by id
//! - Applications get a [`SockJsSocket`] per session and never see which
//!   transport carries it
//! - Graceful shutdown via [`ShutdownCoordinator`] closes every session
//!
//! ```no_run
//! # async fn run() -> Result<(), sockjs_server::ServerError> {
//! use sockjs_server::{apps, ServerConfig, SockJsOptions, SockJsServer};
//!
//! let mut server = SockJsServer::new(ServerConfig::default());
//! let _ = server.install_app("/echo", SockJsOptions::default(), apps::echo);
//! let (addr, handle) = server.listen().await?;
//! println!("listening on {addr}");
//! # let _ = handle;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod apps;
pub mod config;
pub mod listener;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod socket;
pub mod transport;

pub use config::ServerConfig;
pub use registry::SessionRegistry;
pub use server::{ServerError, SockJsServer};
pub use session::{Session, SessionConfig, SessionPhase};
pub use shutdown::ShutdownCoordinator;
pub use socket::{PeerInfo, SockJsSocket};
pub use sockjs_core::{SocketError, SockJsOptions};
