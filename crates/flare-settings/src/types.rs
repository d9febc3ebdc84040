//! Settings sections.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlareSettings {
    /// Listener and transport settings.
    pub server: ServerSettings,
    /// Session manager settings.
    pub session: SessionSettings,
    /// Local pubsub bus settings.
    pub pubsub: PubSubSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl FlareSettings {
    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("server.maxConnections", self.server.max_connections),
            ("server.sendQueueCapacity", self.server.send_queue_capacity),
            ("server.maxMessageSize", self.server.max_message_size),
            ("session.inboxCapacity", self.session.inbox_capacity),
            ("pubsub.workers", self.pubsub.workers),
            ("pubsub.queueCapacity", self.pubsub.queue_capacity),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!("{name} must be positive")));
            }
        }
        if self.server.ping_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.pingIntervalSecs must be positive".into(),
            ));
        }
        if self.server.heartbeat_timeout_secs < self.server.ping_interval_secs {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutSecs must be at least pingIntervalSecs".into(),
            ));
        }
        Ok(())
    }
}

/// Listener and per-connection transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (0 picks a free port).
    pub port: u16,
    /// Path of the WebSocket endpoint.
    pub live_path: String,
    /// Connections beyond this are refused.
    pub max_connections: usize,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before dropping.
    pub send_queue_capacity: usize,
    /// Seconds between server pings.
    pub ping_interval_secs: u64,
    /// Seconds without client activity before the connection is closed.
    pub heartbeat_timeout_secs: u64,
    /// Seconds to wait for connections to drain on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            live_path: "/live".to_string(),
            max_connections: 1024,
            max_message_size: 1024 * 1024,
            send_queue_capacity: 256,
            ping_interval_secs: 54,
            heartbeat_timeout_secs: 60,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Session manager settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Send every Nth diff as a full structural render. 0 disables.
    pub full_render_every: u32,
    /// Broadcast deliveries buffered per connection before dropping.
    pub inbox_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            full_render_every: 0,
            inbox_capacity: 256,
        }
    }
}

/// Local pubsub bus settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PubSubSettings {
    /// Dispatch worker tasks.
    pub workers: usize,
    /// Pending publishes before dropping.
    pub queue_capacity: usize,
}

impl Default for PubSubSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
