//! # sockjs
//!
//! Server binary: loads layered settings, installs the demo applications
//! and serves them until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sockjs_core::SockJsOptions;
use sockjs_server::{apps, ServerConfig, SockJsServer, SockJsSocket};
use sockjs_settings::{LoggingSettings, SockJsSettings};
use sockjs_telemetry::{LogFormat, TelemetryConfig};
use tracing::Level;

/// Virtual socket server with WebSocket and HTTP fallback transports.
#[derive(Parser, Debug)]
#[command(name = "sockjs", about = "Virtual socket server with HTTP fallback transports")]
struct Cli {
    /// Settings file (defaults to `~/.sockjs/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Human-readable logs instead of JSON lines.
    #[arg(long)]
    pretty: bool,
}

impl Cli {
    fn server_config(&self, settings: &SockJsSettings) -> ServerConfig {
        ServerConfig {
            host: self
                .host
                .clone()
                .unwrap_or_else(|| settings.server.host.clone()),
            port: self.port.unwrap_or(settings.server.port),
        }
    }
}

fn telemetry_config(logging: &LoggingSettings, pretty: bool) -> TelemetryConfig {
    let log_level = logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let format = if pretty || !logging.json {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    };
    TelemetryConfig {
        log_level,
        format,
        ..TelemetryConfig::default()
    }
}

/// The applications the protocol conformance suites expect.
///
/// `/cookie_needed_echo` is the only one that sets `JSESSIONID`, so the
/// suites can tell cookie handling apart from plain echo.
fn demo_apps(base: &SockJsOptions) -> Vec<(&'static str, SockJsOptions, fn(SockJsSocket))> {
    let (echo_app, close_app): (fn(SockJsSocket), fn(SockJsSocket)) = (apps::echo, apps::close);
    let echo = SockJsOptions {
        insert_jsessionid: false,
        ..base.clone()
    };
    vec![
        ("/echo", echo.clone(), echo_app),
        (
            "/disabled_websocket_echo",
            SockJsOptions {
                websocket_enabled: false,
                ..echo.clone()
            },
            echo_app,
        ),
        (
            "/cookie_needed_echo",
            SockJsOptions {
                insert_jsessionid: true,
                ..base.clone()
            },
            echo_app,
        ),
        ("/close", echo, close_app),
    ]
}

fn install_demo_apps(server: &mut SockJsServer, base: &SockJsOptions) {
    for (prefix, options, handler) in demo_apps(base) {
        let _ = server.install_app(prefix, options, handler);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = match &args.config {
        Some(path) => sockjs_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => sockjs_settings::load_settings().context("Failed to load settings")?,
    };

    sockjs_telemetry::init_telemetry(&telemetry_config(&settings.logging, args.pretty))
        .context("Failed to initialize logging")?;

    let mut server = SockJsServer::new(args.server_config(&settings));
    install_demo_apps(&mut server, &settings.sockjs);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("sockjs listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.shutdown().stop(handle, None).await {
        tracing::warn!("Server did not stop within the drain timeout");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
