//! Game Day Dashboard Engine
//!
//! Client-side streaming state engine for a real-time operational dashboard:
//! it maintains a STOMP-over-WebSocket subscription to a backend under test,
//! folds the inbound metrics and log traffic into bounded display-ready
//! views, and issues fire-and-forget chaos triggers to the backend's control
//! plane. Rendering is left to an external sink reading the state store.

pub mod chaos;
pub mod config;
pub mod errors;
pub mod ring;
pub mod state;
pub mod stomp;
pub mod stream;
pub mod telemetry;

pub use chaos::{ChaosDispatcher, ChaosKind};
pub use config::Config;
pub use errors::{DashboardError, Result};
pub use state::{CHART_CAPACITY, DashboardState, DashboardSummary, LOG_CAPACITY, SharedDashboard};
pub use stream::{StreamManager, StreamState, StreamTransport, WsTransport};
pub use telemetry::{ChartSample, ConnectionStatus, LogEvent, LogLevel, MetricsSnapshot};
