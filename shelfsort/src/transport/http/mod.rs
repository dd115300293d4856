//! HTTP transport: axum server, routes and the WebSocket connection loop.

mod routes;
mod server;
mod ws;

pub use routes::{HealthCheckResponse, routes};
pub use server::{ServerConfig, serve};
pub use ws::handle_socket;
