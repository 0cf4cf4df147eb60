use std::env;
use std::time::Duration;

pub const DEFAULT_BROKER_URL: &str = "ws://127.0.0.1:8089/ws";
/// Five minutes; a fleet of idle dashboards must not dogpile the broker
/// after an outage.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Realtime client configuration.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Broker endpoint (`ws://` or `wss://`).
    pub broker_url: String,
    /// Delay before a scheduled reconnect attempt.
    pub reconnect_delay: Duration,
    /// Consecutive failed attempts tolerated before giving up.
    pub max_reconnect_attempts: u32,
    /// Keepalive ping cadence; silence for two intervals marks the link lost.
    pub heartbeat_interval: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl RealtimeConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults above for anything unset or unparseable.
    pub fn from_env() -> Self {
        let broker_url = env::var("TIFFIN_BROKER_URL")
            .map(|raw| normalize_broker_url(&raw))
            .unwrap_or_else(|_| DEFAULT_BROKER_URL.to_string());
        Self {
            broker_url,
            reconnect_delay: env_secs("TIFFIN_RECONNECT_DELAY_SECS", DEFAULT_RECONNECT_DELAY),
            max_reconnect_attempts: env::var("TIFFIN_MAX_RECONNECT_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            heartbeat_interval: env_secs("TIFFIN_HEARTBEAT_SECS", DEFAULT_HEARTBEAT_INTERVAL),
        }
    }
}

fn env_secs(var: &str, fallback: Duration) -> Duration {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

/// Normalize a broker address: infer a scheme when missing (plain `ws://` for
/// loopback, `wss://` otherwise) and prefer IPv4 loopback over `localhost` to
/// dodge IPv6 preference on macOS.
pub fn normalize_broker_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut url = if trimmed.contains("://") {
        trimmed.to_string()
    } else if trimmed.starts_with("localhost") || trimmed.starts_with("127.0.0.1") {
        format!("ws://{trimmed}")
    } else {
        format!("wss://{trimmed}")
    };
    if url.contains("localhost") {
        url = url.replace("localhost", "127.0.0.1");
    }
    url
}
