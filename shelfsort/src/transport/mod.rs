//! Transport layer for shelfsort.
//!
//! Provides the HTTP/WebSocket transport via axum.

pub mod http;

pub use http::{ServerConfig, serve};
