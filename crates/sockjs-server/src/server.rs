//! `SockJsServer`: installed applications, the shared session registry and
//! the listening socket.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sockjs_core::SockJsOptions;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::registry::SessionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::socket::{ConnectionAddrs, SockJsSocket};
use crate::transport::{app_router, AppContext, AppState};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

struct InstalledApp {
    prefix: String,
    context: AppState,
}

/// A set of applications served from one listening socket.
pub struct SockJsServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    apps: Vec<InstalledApp>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl SockJsServer {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        Self {
            config,
            shutdown: Arc::new(ShutdownCoordinator::new(Arc::clone(&registry))),
            registry,
            apps: Vec::new(),
        }
    }

    /// Mount an application at `prefix`.
    ///
    /// `handler` runs once for every session that opens. Installing a second
    /// application at the same prefix replaces the first.
    pub fn install_app<F>(&mut self, prefix: &str, options: SockJsOptions, handler: F) -> &mut Self
    where
        F: Fn(SockJsSocket) + Send + Sync + 'static,
    {
        let prefix = normalize_prefix(prefix);
        let context = Arc::new(AppContext {
            options,
            on_open: Arc::new(handler),
            registry: Arc::clone(&self.registry),
            shutdown: self.shutdown.token(),
        });

        if let Some(existing) = self.apps.iter_mut().find(|app| app.prefix == prefix) {
            warn!(prefix = %prefix, "replacing installed app");
            existing.context = context;
        } else {
            debug!(prefix = %prefix, "app installed");
            self.apps.push(InstalledApp { prefix, context });
        }
        self
    }

    /// Build the router for every installed application.
    pub fn router(&self) -> Router {
        self.apps
            .iter()
            .fold(Router::new(), |router, app| {
                router.merge(app_router(&app.prefix, Arc::clone(&app.context)))
            })
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// Returns the bound address (useful with port 0) and the serving task,
    /// which finishes after [`ShutdownCoordinator::shutdown`].
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let prefixes: Vec<&str> = self.apps.iter().map(|app| app.prefix.as_str()).collect();
        info!(%local_addr, apps = ?prefixes, "sockjs server listening");

        let service = self
            .router()
            .into_make_service_with_connect_info::<ConnectionAddrs>();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, service)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
            info!(%local_addr, "sockjs server stopped");
        });

        Ok((local_addr, handle))
    }

    /// Sessions of every installed application.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Installed prefixes, in install order.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.apps.iter().map(|app| app.prefix.as_str())
    }
}

/// `echo`, `/echo/` and `/echo` all mount at `/echo`; `/` and `""` mount at
/// the root.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::apps;
    use crate::transport::testing::body_string;

    fn make_server() -> SockJsServer {
        let mut server = SockJsServer::new(ServerConfig::default());
        let _ = server
            .install_app("/echo", SockJsOptions::default(), apps::echo)
            .install_app("close/", SockJsOptions::default(), apps::close);
        server
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(!server.shutdown().is_shutting_down());
        assert!(server.registry().is_empty());
    }

    #[test]
    fn prefixes_are_normalized() {
        assert_eq!(normalize_prefix("echo"), "/echo");
        assert_eq!(normalize_prefix("/echo/"), "/echo");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix(""), "");

        let server = make_server();
        assert_eq!(server.prefixes().collect::<Vec<_>>(), vec!["/echo", "/close"]);
    }

    #[test]
    fn reinstalling_a_prefix_replaces_it() {
        let mut server = make_server();
        let _ = server.install_app("/echo/", SockJsOptions::default(), apps::close);
        assert_eq!(server.prefixes().count(), 2);
        // The merged router would panic on a duplicate route.
        let _ = server.router();
    }

    #[tokio::test]
    async fn every_app_is_routed() {
        let app = make_server().router();
        for uri in ["/echo", "/close/"] {
            let resp = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(body_string(resp).await, "Welcome to SockJS!\n");
        }
    }

    #[tokio::test]
    async fn apps_share_one_registry() {
        let server = make_server();
        let app = server.router();
        let resp = app
            .oneshot(Request::post("/echo/0/shared/xhr").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_string(resp).await, "o\n");
        assert_eq!(server.registry().len(), 1);
    }

    #[tokio::test]
    async fn close_app_closes_session_after_open() {
        let server = make_server();
        let app = server.router();
        let resp = app
            .oneshot(Request::post("/close/0/c/xhr").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_string(resp).await, "o\n");
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let resp = app
            .oneshot(Request::get("/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops_on_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(addr.ip().is_loopback());

        let _ = server.shutdown().shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn stop_closes_polling_sessions_and_the_listener() {
        let server = make_server();
        let (_addr, handle) = server.listen().await.unwrap();
        let resp = server
            .router()
            .oneshot(Request::post("/echo/0/live/xhr").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_string(resp).await, "o\n");
        assert_eq!(server.registry().len(), 1);

        assert!(server.shutdown().stop(handle, Some(Duration::from_secs(5))).await);
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn listen_reports_bind_failure() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let server = SockJsServer::new(ServerConfig {
            host: "127.0.0.1".into(),
            port: taken.local_addr().unwrap().port(),
        });
        let err = server.listen().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
