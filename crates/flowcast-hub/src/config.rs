//! Hub configuration.

use std::time::Duration;

use tracing::warn;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default interval between server pings.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Default interval between stats reports.
pub const DEFAULT_STATS_SECS: u64 = 60;

/// Runtime settings for the broadcast hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub host: String,
    pub port: u16,
    /// How often every open connection is pinged.
    pub heartbeat_interval: Duration,
    /// Silence after which a connection is considered dead.
    pub heartbeat_timeout: Duration,
    pub stats_interval: Duration,
    /// How long shutdown waits for connections to close.
    pub shutdown_grace: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            heartbeat_timeout: Duration::from_secs(DEFAULT_HEARTBEAT_SECS * 2),
            stats_interval: Duration::from_secs(DEFAULT_STATS_SECS),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl HubConfig {
    /// Build from `FLOWCAST_HOST`, `FLOWCAST_PORT`, `FLOWCAST_HEARTBEAT_SECS`
    /// and `FLOWCAST_STATS_SECS`, falling back to defaults.
    pub fn from_env() -> Self {
        let host = std::env::var("FLOWCAST_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = env_number("FLOWCAST_PORT", DEFAULT_PORT);
        let heartbeat = env_secs("FLOWCAST_HEARTBEAT_SECS", DEFAULT_HEARTBEAT_SECS);
        let stats = env_secs("FLOWCAST_STATS_SECS", DEFAULT_STATS_SECS);

        Self {
            host,
            port,
            ..Self::default()
        }
        .with_heartbeat(Duration::from_secs(heartbeat))
        .with_stats_interval(Duration::from_secs(stats))
    }

    /// Set the ping interval; the dead-connection timeout follows at 2x.
    /// A zero interval is ignored and the current one kept.
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!(current = ?self.heartbeat_interval, "Ignoring zero heartbeat interval");
            return self;
        }
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = interval * 2;
        self
    }

    /// A zero interval is ignored and the current one kept.
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!(current = ?self.stats_interval, "Ignoring zero stats interval");
            return self;
        }
        self.stats_interval = interval;
        self
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Interval setting in seconds; zero falls back to the default.
fn env_secs(key: &str, default: u64) -> u64 {
    match env_number(key, default) {
        0 => {
            warn!(key = %key, default = %default, "Interval must be at least one second");
            default
        }
        secs => secs,
    }
}

fn env_number<T: std::str::FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key = %key, value = %raw, default = %default, "Ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}
