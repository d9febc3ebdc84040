//! `/health` endpoint.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
    /// Number of joined sessions.
    pub sessions: usize,
    /// Joined sessions per topic.
    pub topics: BTreeMap<String, usize>,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    topics: impl IntoIterator<Item = (String, usize)>,
) -> HealthResponse {
    let topics: BTreeMap<String, usize> = topics.into_iter().collect();
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        sessions: topics.values().sum(),
        topics,
    }
}
