//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket disconnections total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Upgrades refused at the connection limit (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Outbound frames dropped on a full send queue (counter).
pub const WS_OUTBOUND_DROPS_TOTAL: &str = "ws_outbound_drops_total";
/// Inbound frames that failed to decode (counter).
pub const WS_DECODE_ERRORS_TOTAL: &str = "ws_decode_errors_total";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Joined sessions (gauge).
pub const LIVE_SESSIONS_ACTIVE: &str = "live_sessions_active";
/// Client events handled (counter).
pub const LIVE_EVENTS_TOTAL: &str = "live_events_total";
/// Render plus diff time (histogram).
pub const LIVE_DIFF_DURATION_SECONDS: &str = "live_diff_duration_seconds";
/// Broadcasts dropped on a full connection inbox (counter).
pub const LIVE_INBOX_DROPS_TOTAL: &str = "live_inbox_drops_total";
/// Publishes dropped on a full dispatch queue (counter).
pub const PUBSUB_DISPATCH_DROPS_TOTAL: &str = "pubsub_dispatch_drops_total";
