//! Configuration management for the dashboard engine

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Path suffix of the backend's STOMP WebSocket endpoint.
const STREAM_PATH: &str = "/ws-logs/websocket";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the observed backend; determines both the command
    /// endpoint and the derived stream endpoint
    pub backend_url: String,

    /// Delay between reconnect attempts
    pub reconnect_delay: Duration,

    /// HTTP timeout for chaos command requests
    pub http_timeout: Duration,

    /// Timeout for the STOMP connect handshake
    pub handshake_timeout: Duration,

    /// Interval between operator summary reports
    pub summary_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8080".to_string(),
            reconnect_delay: Duration::from_secs(5),
            http_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            summary_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(backend_url) = env::var("BACKEND_URL") {
            config.backend_url = backend_url;
        }

        if let Ok(delay) = env::var("RECONNECT_DELAY_MS") {
            if let Ok(ms) = delay.parse() {
                config.reconnect_delay = Duration::from_millis(ms);
            }
        }

        if let Ok(timeout) = env::var("HTTP_TIMEOUT_SECONDS") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.http_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(timeout) = env::var("HANDSHAKE_TIMEOUT_SECONDS") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.handshake_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(interval) = env::var("SUMMARY_INTERVAL_SECONDS") {
            if let Ok(seconds) = interval.parse::<u64>() {
                config.summary_interval = Duration::from_secs(seconds);
            }
        }

        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.backend_url.is_empty() {
            return Err("backend_url cannot be empty".to_string());
        }

        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            return Err("backend_url must start with http:// or https://".to_string());
        }

        if self.reconnect_delay.is_zero() {
            return Err("reconnect_delay must be greater than 0".to_string());
        }

        if self.http_timeout.is_zero() {
            return Err("http_timeout must be greater than 0".to_string());
        }

        if self.handshake_timeout.is_zero() {
            return Err("handshake_timeout must be greater than 0".to_string());
        }

        if self.summary_interval.is_zero() {
            return Err("summary_interval must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Stream endpoint derived from the backend URL: the scheme switches
    /// http -> ws and https -> wss, host and port carry over.
    pub fn websocket_url(&self) -> String {
        let trimmed = self.backend_url.trim_end_matches('/');

        let (scheme, remainder) = if let Some(remainder) = trimmed.strip_prefix("https://") {
            ("wss", remainder)
        } else if let Some(remainder) = trimmed.strip_prefix("http://") {
            ("ws", remainder)
        } else {
            ("ws", trimmed)
        };

        format!("{}://{}{}", scheme, remainder, STREAM_PATH)
    }

    /// Host portion of the backend URL, for the STOMP connect header.
    pub fn host(&self) -> String {
        let trimmed = self.backend_url.trim_end_matches('/');

        let without_scheme = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);

        without_scheme
            .split('/')
            .next()
            .unwrap_or(without_scheme)
            .to_string()
    }
}
