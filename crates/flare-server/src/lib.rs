//! # flare-server
//!
//! Axum HTTP + `WebSocket` transport for live views.
//!
//! - `GET /live`: `WebSocket` upgrade; one session loop per connection with
//!   a bounded, lossy send queue, server pings and a read deadline
//! - `GET /health`: uptime, connection and session counts
//! - `GET /metrics`: Prometheus text when a recorder is installed
//! - Connection limit enforced at upgrade time with 503
//! - Graceful shutdown via `CancellationToken`: every joined topic gets a
//!   `phx_close` before its socket closes

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::TransportError;
pub use server::{AppState, FlareServer};
