//! Endpoint and timeout configuration for device connections

use std::env;
use std::time::Duration;

/// Default port of the local ADB server.
pub const DEFAULT_ADB_PORT: u16 = 5037;

/// Default port of the on-device view server, also used as the forwarded
/// local port.
pub const DEFAULT_VIEW_SERVER_PORT: u16 = 4939;

fn env_timeout(key: &str, default_secs: f64) -> Option<Duration> {
    let secs = env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default_secs);
    // A zero or negative value disables the watchdog.
    if secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// Configuration for the connection to the local ADB server
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    /// Close and reopen the socket after each shell command. The ADB server
    /// drops the stream once a shell command finishes; with this disabled the
    /// caller must reconnect explicitly.
    pub reconnect_after_command: bool,
    pub socket_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: env::var("ANDROID_ADB_SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("ANDROID_ADB_SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_ADB_PORT),
            reconnect_after_command: true,
            socket_timeout: env_timeout("DROIDVIEW_SOCKET_TIMEOUT", 60.0),
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_reconnect_after_command(mut self, reconnect: bool) -> Self {
        self.reconnect_after_command = reconnect;
        self
    }

    pub fn with_socket_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.socket_timeout = timeout;
        self
    }
}

/// Configuration for the forwarded view-server connection
#[derive(Debug, Clone)]
pub struct DumpServiceConfig {
    /// Local end of the forwarded port.
    pub local_port: u16,
    /// Port the service listens on on the device.
    pub remote_port: u16,
    /// Watchdog aborting a stuck dump; `None` disables it.
    pub watchdog_timeout: Option<Duration>,
}

impl Default for DumpServiceConfig {
    fn default() -> Self {
        Self {
            local_port: env::var("DROIDVIEW_VIEW_SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_VIEW_SERVER_PORT),
            remote_port: DEFAULT_VIEW_SERVER_PORT,
            watchdog_timeout: env_timeout("DROIDVIEW_DUMP_TIMEOUT", 15.0),
        }
    }
}

impl DumpServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    pub fn with_watchdog_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.watchdog_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert!(!config.host.is_empty());
        assert!(config.reconnect_after_command);
    }

    #[test]
    fn test_transport_config_builder() {
        let config = TransportConfig::new()
            .with_host("10.0.0.2")
            .with_port(5038)
            .with_reconnect_after_command(false)
            .with_socket_timeout(None);
        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.port, 5038);
        assert!(!config.reconnect_after_command);
        assert!(config.socket_timeout.is_none());
    }

    #[test]
    fn test_dump_service_config_default() {
        let config = DumpServiceConfig::default();
        assert_eq!(config.remote_port, DEFAULT_VIEW_SERVER_PORT);
    }
}
