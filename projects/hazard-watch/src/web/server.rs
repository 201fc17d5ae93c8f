use crate::web::api::{get_detections, get_status, StatusSlot};
use anyhow::{anyhow, Result};
use axum::{routing::get, Router};
use std::future::Future;
use std::net::{IpAddr, SocketAddr, TcpListener};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub fn router(status: StatusSlot) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/detections", get(get_detections))
        .layer(TraceLayer::new_for_http())
        .with_state(status)
}

/// Bind `host:port`, moving on to the next port while the address is taken.
pub fn bind_with_fallback(host: IpAddr, port: u16) -> Result<TcpListener> {
    let mut current_port = port;
    loop {
        let addr = SocketAddr::new(host, current_port);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                // Must be non-blocking before Tokio takes it over
                listener.set_nonblocking(true)?;
                info!("Successfully bound to {}", addr);
                return Ok(listener);
            }
            Err(e) => {
                warn!("Failed to bind to {}: {}. Trying next port...", addr, e);
                current_port = current_port
                    .checked_add(1)
                    .ok_or_else(|| anyhow!("No available ports found"))?;
            }
        }
    }
}

pub async fn run_server<F>(host: IpAddr, port: u16, status: StatusSlot, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = bind_with_fallback(host, port)?;
    let tokio_listener = tokio::net::TcpListener::from_std(listener)?;
    info!(
        "Hazard Watch server started on http://{:?}",
        tokio_listener.local_addr()?
    );

    axum::serve(tokio_listener, router(status))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
