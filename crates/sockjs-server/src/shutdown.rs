//! Server shutdown.
//!
//! Stopping a server is more than stopping its accept loop: streaming
//! responses only end when their sessions close, and upgraded sockets hold
//! sessions the registry never sees. [`ShutdownCoordinator::shutdown`]
//! handles all three in one call.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::SessionRegistry;

/// How long [`ShutdownCoordinator::stop`] waits for the serving task.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Stops one server and every session it carries.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    registry: Arc<SessionRegistry>,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            token: CancellationToken::new(),
            registry,
        }
    }

    /// Token cancelled when shutdown begins. The accept loop and every
    /// upgraded socket watch it.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop accepting, close upgraded sockets and close every registered
    /// session with the go-away frame. Returns how many registered sessions
    /// were closed by this call.
    ///
    /// Safe to call repeatedly; later calls close sessions that were created
    /// by requests already in flight.
    pub fn shutdown(&self) -> usize {
        if !self.token.is_cancelled() {
            info!(sessions = self.registry.len(), "shutdown started");
            self.token.cancel();
        }
        self.registry.close_all()
    }

    /// Shut down, then wait up to `timeout` for the serving task.
    ///
    /// Returns whether the serving task finished in time.
    pub async fn stop(&self, server: JoinHandle<()>, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        let _ = self.shutdown();

        let drained = match tokio::time::timeout(timeout, server).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "serving task failed during shutdown");
                true
            }
            Err(_) => {
                warn!(?timeout, "serving task still running after shutdown timeout");
                false
            }
        };

        let stragglers = self.shutdown();
        if stragglers > 0 {
            debug!(stragglers, "closed sessions opened during shutdown");
        }
        drained
    }
}
