//! Minimal STOMP 1.2 text-frame codec
//!
//! Covers the subset the dashboard speaks: CONNECT/CONNECTED, SUBSCRIBE,
//! MESSAGE, DISCONNECT, and broker ERROR frames. Header values in this
//! subset never carry escaped characters, so no escape handling is done.

use crate::errors::{DashboardError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value for a header name, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header_name, _)| header_name == name)
            .map(|(_, value)| value.as_str())
    }

    /// Client CONNECT frame. Heartbeats are declined on both sides.
    pub fn connect(host: &str) -> Self {
        Frame::new("CONNECT")
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", "0,0")
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new("SUBSCRIBE")
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn disconnect() -> Self {
        Frame::new("DISCONNECT")
    }

    /// Wire text for this frame, NUL-terminated.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.command);
        out.push('\n');

        for (name, value) in &self.headers {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from wire text. Leading end-of-line characters and the
    /// trailing NUL are tolerated; anything else malformed is an error.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim_start_matches(|c| c == '\n' || c == '\r');
        // Everything past the NUL terminator is padding
        let raw = match raw.find('\0') {
            Some(index) => &raw[..index],
            None => raw,
        };
        let normalized = raw.replace("\r\n", "\n");

        let Some((head, body)) = normalized.split_once("\n\n") else {
            return Err(DashboardError::Frame(
                "missing header terminator".to_string(),
            ));
        };

        let mut lines = head.lines();
        let command = match lines.next() {
            Some(command) if !command.is_empty() => command.to_string(),
            _ => return Err(DashboardError::Frame("missing command".to_string())),
        };

        let mut headers = Vec::new();
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                return Err(DashboardError::Frame(format!(
                    "malformed header line: {:?}",
                    line
                )));
            };
            headers.push((name.to_string(), value.to_string()));
        }

        Ok(Frame {
            command,
            headers,
            body: body.to_string(),
        })
    }
}
