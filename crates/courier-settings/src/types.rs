//! Settings types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{Result, SettingsError};

/// Secret used when none is configured. Only suitable for local development.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourierSettings {
    /// Network settings.
    pub server: ServerSettings,
    /// Credential settings.
    pub auth: AuthSettings,
    /// Live session tuning.
    pub session: SessionSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl CourierSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.session;
        let checks = [
            (s.keepalive_interval_ms == 0, "session.keepaliveIntervalMs", "must be > 0"),
            (s.send_timeout_ms == 0, "session.sendTimeoutMs", "must be > 0"),
            (s.send_queue_capacity == 0, "session.sendQueueCapacity", "must be > 0"),
            (s.reap_interval_ms == 0, "session.reapIntervalMs", "must be > 0"),
            (s.idle_ttl_ms == 0, "session.idleTtlMs", "must be > 0"),
            (self.auth.default_ttl_minutes == 0, "auth.defaultTtlMinutes", "must be > 0"),
            (self.auth.jwt_secret.is_empty(), "auth.jwtSecret", "must not be empty"),
        ];
        match checks.iter().find(|(bad, _, _)| *bad) {
            Some(&(_, key, reason)) => Err(SettingsError::InvalidValue { key, reason }),
            None => Ok(()),
        }
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port.
    pub port: u16,
    /// Base for connection URLs handed out at session creation
    /// (e.g. `wss://track.example.com`). Derived from the request `Host`
    /// header when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ws_base: Option<String>,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            public_ws_base: None,
            max_message_size: 1 << 20,
        }
    }
}

/// Credential settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HMAC secret for session credentials.
    pub jwt_secret: String,
    /// Credential lifetime when session creation does not specify one.
    pub default_ttl_minutes: u64,
}

impl AuthSettings {
    /// Whether the development secret is still in use.
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    /// Default credential lifetime.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_minutes * 60)
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            default_ttl_minutes: 240,
        }
    }
}

/// Live session tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Interval between keepalive pings.
    pub keepalive_interval_ms: u64,
    /// Deadline for a single outbound write (messages and pings).
    pub send_timeout_ms: u64,
    /// Outbound queue depth per connection.
    pub send_queue_capacity: usize,
    /// Cumulative dropped messages after which a slow connection is closed.
    pub max_dropped_messages: u64,
    /// How often idle hubs are reaped.
    pub reap_interval_ms: u64,
    /// How long a hub with no connections survives without activity.
    pub idle_ttl_ms: u64,
}

impl SessionSettings {
    /// Keepalive interval.
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    /// Per-write deadline.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Reaper interval.
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    /// Idle hub lifetime.
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_millis(self.idle_ttl_ms)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            keepalive_interval_ms: 30_000,
            send_timeout_ms: 5_000,
            send_queue_capacity: 256,
            max_dropped_messages: 100,
            reap_interval_ms: 60_000,
            idle_ttl_ms: 4 * 60 * 60 * 1000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_serialization() {
        let v = serde_json::to_value(CourierSettings::default()).unwrap();
        assert_eq!(v["server"]["maxMessageSize"], 1 << 20);
        assert_eq!(v["session"]["keepaliveIntervalMs"], 30_000);
        assert_eq!(v["auth"]["defaultTtlMinutes"], 240);
        assert!(v["server"].get("publicWsBase").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: CourierSettings =
            serde_json::from_str(r#"{"server":{"port":9000},"session":{"sendTimeoutMs":100}}"#)
                .unwrap();
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.session.send_timeout(), Duration::from_millis(100));
        assert_eq!(s.session.keepalive_interval(), Duration::from_secs(30));
    }

    #[test]
    fn durations() {
        let s = CourierSettings::default();
        assert_eq!(s.auth.default_ttl(), Duration::from_secs(4 * 3600));
        assert_eq!(s.session.idle_ttl(), Duration::from_secs(4 * 3600));
        assert_eq!(s.session.reap_interval(), Duration::from_secs(60));
    }

    #[test]
    fn dev_secret_detected() {
        let mut s = AuthSettings::default();
        assert!(s.uses_dev_secret());
        s.jwt_secret = "prod".into();
        assert!(!s.uses_dev_secret());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut s = CourierSettings::default();
        s.session.send_timeout_ms = 0;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("sendTimeoutMs"));
    }

    #[test]
    fn validate_rejects_zero_idle_ttl() {
        let mut s = CourierSettings::default();
        s.session.idle_ttl_ms = 0;
        assert!(matches!(
            s.validate(),
            Err(SettingsError::InvalidValue { key: "session.idleTtlMs", .. })
        ));
    }

    #[test]
    fn validate_rejects_empty_secret() {
        let mut s = CourierSettings::default();
        s.auth.jwt_secret.clear();
        assert!(s.validate().is_err());
    }
}
