//! Server configuration.

use std::time::Duration;

use flare_settings::FlareSettings;

/// Configuration for the Flare server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Path of the WebSocket endpoint.
    pub live_path: String,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames queued per connection before new ones are dropped.
    pub send_queue_capacity: usize,
    /// Interval between server pings.
    pub ping_interval: Duration,
    /// Close a connection after this long without client activity.
    pub heartbeat_timeout: Duration,
    /// How long shutdown waits for connections to finish.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            live_path: "/live".into(),
            max_connections: 1024,
            max_message_size: 1024 * 1024, // 1 MB
            send_queue_capacity: 256,
            ping_interval: Duration::from_secs(54),
            heartbeat_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// How often the read deadline is checked.
    pub fn heartbeat_check_interval(&self) -> Duration {
        (self.heartbeat_timeout / 4).max(Duration::from_millis(10))
    }
}

impl From<&FlareSettings> for ServerConfig {
    fn from(settings: &FlareSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            live_path: server.live_path.clone(),
            max_connections: server.max_connections,
            max_message_size: server.max_message_size,
            send_queue_capacity: server.send_queue_capacity,
            ping_interval: Duration::from_secs(server.ping_interval_secs),
            heartbeat_timeout: Duration::from_secs(server.heartbeat_timeout_secs),
            shutdown_timeout: Duration::from_secs(server.shutdown_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn default_live_path() {
        assert_eq!(ServerConfig::default().live_path, "/live");
    }

    #[test]
    fn from_settings() {
        let mut settings = FlareSettings::default();
        settings.server.port = 8080;
        settings.server.send_queue_capacity = 16;
        settings.server.heartbeat_timeout_secs = 90;

        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.send_queue_capacity, 16);
        assert_eq!(cfg.ping_interval, Duration::from_secs(54));
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(90));
    }

    #[test]
    fn check_interval_is_fraction_of_timeout() {
        let cfg = ServerConfig {
            heartbeat_timeout: Duration::from_secs(60),
            ..ServerConfig::default()
        };
        assert_eq!(cfg.heartbeat_check_interval(), Duration::from_secs(15));
    }

    #[test]
    fn check_interval_has_floor() {
        let cfg = ServerConfig {
            heartbeat_timeout: Duration::from_millis(8),
            ..ServerConfig::default()
        };
        assert_eq!(cfg.heartbeat_check_interval(), Duration::from_millis(10));
    }
}
