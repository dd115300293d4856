//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::service::ShelfService;

use super::routes::routes;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// If true, ignore SIGTERM and wait for explicit /shutdown or SIGINT.
    pub await_explicit_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4200,
            await_explicit_shutdown: false,
        }
    }
}

/// Start the HTTP server with provided service.
pub async fn serve(config: ServerConfig, service: Arc<ShelfService>) -> anyhow::Result<()> {
    let app = routes(Arc::clone(&service));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Starting shelfsort server on {}", actual_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(
            Arc::clone(&service),
            config.await_explicit_shutdown,
        ))
        .await?;

    info!("Server shutdown complete");

    Ok(())
}

/// Resolve once the server should stop, after cancelling open connections.
///
/// Upgraded WebSocket connections are not tracked by the graceful shutdown,
/// so they are cancelled here before the listener is closed.
async fn wait_for_shutdown(service: Arc<ShelfService>, await_explicit_shutdown: bool) {
    let reason = tokio::select! {
        _ = interrupt() => "SIGINT",
        _ = terminate(await_explicit_shutdown) => "SIGTERM",
        _ = requested(service.shutdown_rx()) => "shutdown endpoint",
    };

    info!(
        reason,
        open_sessions = service.active_sessions(),
        "Shutting down"
    );
    service.close_connections();
}

async fn requested(mut shutdown_rx: watch::Receiver<bool>) {
    if shutdown_rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// # Panics
///
/// Panics if the SIGINT handler cannot be installed, which means the runtime
/// is misconfigured at startup.
async fn interrupt() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install SIGINT handler");
}

/// # Panics
///
/// Panics if the SIGTERM handler cannot be installed.
#[cfg(unix)]
async fn terminate(ignore: bool) {
    if ignore {
        info!("await_explicit_shutdown enabled, ignoring SIGTERM");
        return std::future::pending::<()>().await;
    }
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler")
        .recv()
        .await;
}

#[cfg(not(unix))]
async fn terminate(_ignore: bool) {
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::test_service;
    use std::time::Duration;

    #[test]
    fn server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 4200);
        assert!(!config.await_explicit_shutdown);
    }

    #[tokio::test]
    async fn shutdown_request_closes_connections() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());
        let token = service.connection_token();

        let waiter = tokio::spawn(wait_for_shutdown(Arc::clone(&service), true));
        assert!(!token.is_cancelled());
        service.trigger_shutdown();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("shutdown did not resolve")
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn serve_stops_after_shutdown_request() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());
        let token = service.connection_token();
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            await_explicit_shutdown: true,
        };

        let server = tokio::spawn(serve(config, Arc::clone(&service)));
        service.trigger_shutdown();

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
        assert!(token.is_cancelled());
    }
}
