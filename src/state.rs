//! Dashboard state store: the single mutation authority behind the render sink

use crate::ring::RingBuffer;
use crate::telemetry::{
    ChartSample, ConnectionStatus, LogEvent, MetricsSnapshot, format_memory, synthetic_display_key,
};
use chrono::Local;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Log feed capacity, newest-first.
pub const LOG_CAPACITY: usize = 50;

/// Chart series capacity, chronological.
pub const CHART_CAPACITY: usize = 20;

/// Shared handle to the store: written by the stream manager's message
/// handlers, read by the render sink.
pub type SharedDashboard = Arc<RwLock<DashboardState>>;

/// Aggregated dashboard state for one session. Outlives individual
/// connection attempts: buffers are retained across reconnects.
#[derive(Debug)]
pub struct DashboardState {
    metrics: Option<MetricsSnapshot>,
    logs: RingBuffer<LogEvent>,
    chart: RingBuffer<ChartSample>,
    connection: ConnectionStatus,
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            metrics: None,
            logs: RingBuffer::new(LOG_CAPACITY),
            chart: RingBuffer::new(CHART_CAPACITY),
            connection: ConnectionStatus::Disconnected,
        }
    }

    pub fn shared() -> SharedDashboard {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Replace the current snapshot wholesale and derive exactly one chart
    /// sample stamped with the arrival time.
    pub fn apply_metrics(&mut self, snapshot: MetricsSnapshot) {
        self.chart
            .push_back(ChartSample::at(Local::now(), snapshot.used_memory_bytes));
        self.metrics = Some(snapshot);
    }

    /// Insert a log event at the newest-first end, filling in a synthetic
    /// display key when the backend sent none.
    pub fn apply_log(&mut self, mut event: LogEvent) {
        if event.id.is_none() {
            event.id = Some(synthetic_display_key());
        }
        self.logs.push_front(event);
    }

    pub fn set_connection(&mut self, status: ConnectionStatus) {
        self.connection = status;
    }

    pub fn metrics(&self) -> Option<&MetricsSnapshot> {
        self.metrics.as_ref()
    }

    pub fn logs(&self) -> &RingBuffer<LogEvent> {
        &self.logs
    }

    pub fn chart(&self) -> &RingBuffer<ChartSample> {
        &self.chart
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    /// Aggregate view consumed by the render sink and the summary reporter.
    pub fn summary(&self) -> DashboardSummary {
        DashboardSummary {
            connection: self.connection,
            total_logs_today: self.metrics.as_ref().map_or(0, |m| m.total_logs_today),
            used_memory_display: format_memory(
                self.metrics.as_ref().map_or(0, |m| m.used_memory_bytes),
            ),
            services_with_errors: self.metrics.as_ref().map_or(0, |m| m.services_with_errors()),
            buffered_events: self.logs.len(),
            chart_points: self.chart.len(),
            latest_value_mb: self.chart.back().map(|sample| sample.value_mb),
        }
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only aggregate of the store.
#[derive(Clone, Debug)]
pub struct DashboardSummary {
    pub connection: ConnectionStatus,
    pub total_logs_today: u64,
    pub used_memory_display: String,
    pub services_with_errors: usize,
    pub buffered_events: usize,
    pub chart_points: usize,
    pub latest_value_mb: Option<f64>,
}
