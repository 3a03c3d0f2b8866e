//! Typed entities at the stream boundary and their display formatting

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const BYTES_PER_MB: f64 = 1_048_576.0;

/// Latest full metrics payload from the backend. Wholesale-replaced on each
/// inbound metrics message; no history is kept here.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    #[serde(rename = "TotalLogsToday", default)]
    pub total_logs_today: u64,

    #[serde(rename = "UsedMemory", default)]
    pub used_memory_bytes: u64,

    #[serde(rename = "ErrorLogs", default)]
    pub error_logs_by_service: HashMap<String, u64>,
}

impl MetricsSnapshot {
    /// Number of distinct services currently reporting errors.
    pub fn services_with_errors(&self) -> usize {
        self.error_logs_by_service.len()
    }
}

/// Integer-MB label for the memory stat card, e.g. "50 MB".
pub fn format_memory(bytes: u64) -> String {
    if bytes == 0 {
        "0 MB".to_string()
    } else {
        format!("{:.0} MB", bytes as f64 / BYTES_PER_MB)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    /// Levels the backend may emit that the dashboard does not special-case
    Other(String),
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Other(level) => write!(f, "{}", level),
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "ERROR" | "ERR" => LogLevel::Error,
            "WARN" | "WARNING" => LogLevel::Warn,
            "INFO" | "INFORMATION" => LogLevel::Info,
            _ => LogLevel::Other(s.to_string()),
        }
    }
}

impl From<String> for LogLevel {
    fn from(s: String) -> Self {
        LogLevel::from(s.as_str())
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.to_string()
    }
}

/// One ingested log record. Immutable once it enters the log ring buffer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    /// Backend-assigned identifier; a synthetic display key is filled in at
    /// ingestion when absent
    #[serde(default)]
    pub id: Option<String>,
    pub log_level: LogLevel,
    pub service_name: String,
    pub message: String,
    pub received_at: DateTime<Utc>,
}

/// Display key for events arriving without an id. Uniqueness is best-effort.
pub fn synthetic_display_key() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// One plotted point on the memory chart, derived from a metrics snapshot at
/// the moment of arrival.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ChartSample {
    pub time_label: String,
    pub value_mb: f64,
}

impl ChartSample {
    pub fn at(time: DateTime<Local>, used_memory_bytes: u64) -> Self {
        Self {
            time_label: time.format("%H:%M:%S").to_string(),
            value_mb: round2(used_memory_bytes as f64 / BYTES_PER_MB),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Transport-level connection state as shown to the operator.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    /// Status badge text.
    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "System Online",
            ConnectionStatus::Disconnected => "Disconnected",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
