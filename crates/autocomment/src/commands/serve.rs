//! HTTP server command implementation.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{error, info};

use autocomment::api::StartEngineResponse;
use autocomment::server;

use super::{Workspace, shutdown_signal};

pub async fn run(
    workspace: Workspace,
    host_override: Option<IpAddr>,
    port_override: Option<u16>,
    start: bool,
) -> Result<()> {
    let controller = workspace.controller()?;
    let engine = controller.engine().clone();
    let server_config = &workspace.config.server;

    if start {
        match controller.start().await {
            Ok(report) => {
                let summary = StartEngineResponse::from(&report);
                info!(
                    started = summary.started.len(),
                    failed = summary.failed.len(),
                    "Engine started"
                );
            }
            Err(e) => error!(error = %e, "Engine did not start"),
        }
    }

    // Create shutdown channel for HTTP-triggered shutdown
    let (shutdown_tx, shutdown_rx) = server::shutdown_channel();

    let state = server::AppState {
        controller,
        log_file: workspace.paths.log_file.clone(),
        tail_lines: workspace.config.logging.tail_lines,
        api_token: server_config.api_token().map(str::to_string),
        admin_token: server_config.admin_token().map(str::to_string),
        shutdown_tx: Arc::new(Mutex::new(Some(shutdown_tx))),
    };
    let app = server::build_app(state, server_config.request_timeout_seconds);

    let ip: IpAddr = match host_override {
        Some(ip) => ip,
        None => server_config.host.parse()?,
    };
    let addr = SocketAddr::new(ip, port_override.unwrap_or(server_config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(addr = %addr, "Starting server");
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(Some(shutdown_rx)))
    .await;

    // Close every session even when the server failed
    engine.shutdown().await;
    served?;

    info!("Server stopped");
    Ok(())
}
