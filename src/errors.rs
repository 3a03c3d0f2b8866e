//! Error types for the dashboard engine

use std::fmt;
use tokio_tungstenite::tungstenite;

pub type Result<T> = std::result::Result<T, DashboardError>;

#[derive(Debug)]
pub enum DashboardError {
    /// HTTP request failed
    Http(reqwest::Error),

    /// JSON serialization/deserialization failed
    Json(serde_json::Error),

    /// WebSocket layer failed
    WebSocket(tungstenite::Error),

    /// Configuration error
    Config(String),

    /// STOMP frame could not be parsed
    Frame(String),

    /// Stream transport error
    Transport(String),

    /// Chaos command rejected or unreachable
    Command(String),

    /// Generic error with message
    Other(String),
}

impl fmt::Display for DashboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashboardError::Http(err) => write!(f, "HTTP error: {}", err),
            DashboardError::Json(err) => write!(f, "JSON error: {}", err),
            DashboardError::WebSocket(err) => write!(f, "WebSocket error: {}", err),
            DashboardError::Config(msg) => write!(f, "Configuration error: {}", msg),
            DashboardError::Frame(msg) => write!(f, "Frame error: {}", msg),
            DashboardError::Transport(msg) => write!(f, "Transport error: {}", msg),
            DashboardError::Command(msg) => write!(f, "Command error: {}", msg),
            DashboardError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DashboardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DashboardError::Http(err) => Some(err),
            DashboardError::Json(err) => Some(err),
            DashboardError::WebSocket(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DashboardError {
    fn from(err: reqwest::Error) -> Self {
        DashboardError::Http(err)
    }
}

impl From<serde_json::Error> for DashboardError {
    fn from(err: serde_json::Error) -> Self {
        DashboardError::Json(err)
    }
}

impl From<tungstenite::Error> for DashboardError {
    fn from(err: tungstenite::Error) -> Self {
        DashboardError::WebSocket(err)
    }
}
