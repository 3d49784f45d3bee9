//! Server configuration.

use std::time::Duration;

use courier_settings::CourierSettings;

/// Per-connection and per-hub tuning.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Interval between keepalive pings.
    pub keepalive_interval: Duration,
    /// Deadline for one outbound write.
    pub send_timeout: Duration,
    /// Outbound queue depth per connection.
    pub send_queue_capacity: usize,
    /// Cumulative drops after which a connection is evicted.
    pub max_dropped_messages: u64,
    /// Reaper tick.
    pub reap_interval: Duration,
    /// Idle lifetime of an empty hub.
    pub idle_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(30),
            send_timeout: Duration::from_secs(5),
            send_queue_capacity: 256,
            max_dropped_messages: 100,
            reap_interval: Duration::from_secs(60),
            idle_ttl: Duration::from_secs(4 * 60 * 60),
        }
    }
}

/// Configuration for the courier server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Fixed base for handed-out connection URLs, e.g. `wss://track.example.com`.
    pub public_ws_base: Option<String>,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Credential lifetime when session creation omits one.
    pub default_ttl: Duration,
    /// Live session tuning.
    pub session: SessionConfig,
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &CourierSettings) -> Self {
        let session = &settings.session;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            public_ws_base: settings.server.public_ws_base.clone(),
            max_message_size: settings.server.max_message_size,
            default_ttl: settings.auth.default_ttl(),
            session: SessionConfig {
                keepalive_interval: session.keepalive_interval(),
                send_timeout: session.send_timeout(),
                send_queue_capacity: session.send_queue_capacity,
                max_dropped_messages: session.max_dropped_messages,
                reap_interval: session.reap_interval(),
                idle_ttl: session.idle_ttl(),
            },
        }
    }

    /// Base for connection URLs: the configured public base, else
    /// `ws://{host}` from the request, else the bind address.
    pub fn ws_base(&self, request_host: Option<&str>) -> String {
        if let Some(base) = &self.public_ws_base {
            return base.trim_end_matches('/').to_string();
        }
        match request_host {
            Some(host) if !host.is_empty() => format!("ws://{host}"),
            _ => format!("ws://{}:{}", self.host, self.port),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            public_ws_base: None,
            max_message_size: 1 << 20,
            default_ttl: Duration::from_secs(4 * 60 * 60),
            session: SessionConfig::default(),
        }
    }
}
