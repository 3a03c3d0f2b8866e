//! Fire-and-forget chaos trigger dispatch
//!
//! Failures here are observability events, not control flow: every error is
//! logged and absorbed so a broken control plane can never take down the
//! dashboard that is watching it break.

use crate::errors::{DashboardError, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Named fault scenario understood by the backend's chaos endpoint. The set
/// is open: the backend may grow scenarios the dashboard has never heard of,
/// so unknown slugs pass through as `Custom`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChaosKind {
    Success,
    Latency,
    DbFailure,
    SpikeMemory,
    Custom(String),
}

impl ChaosKind {
    /// URL path segment for this scenario.
    pub fn slug(&self) -> &str {
        match self {
            ChaosKind::Success => "success",
            ChaosKind::Latency => "latency",
            ChaosKind::DbFailure => "db-failure",
            ChaosKind::SpikeMemory => "spike-memory",
            ChaosKind::Custom(slug) => slug,
        }
    }
}

impl From<&str> for ChaosKind {
    fn from(s: &str) -> Self {
        match s {
            "success" => ChaosKind::Success,
            "latency" => ChaosKind::Latency,
            "db-failure" => ChaosKind::DbFailure,
            "spike-memory" => ChaosKind::SpikeMemory,
            other => ChaosKind::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for ChaosKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.slug())
    }
}

/// Issues chaos trigger requests against `POST {base}/api/chaos/{kind}`.
#[derive(Clone, Debug)]
pub struct ChaosDispatcher {
    client: Client,
    base_url: String,
}

impl ChaosDispatcher {
    pub fn new(base_url: String, http_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(http_timeout)
            .user_agent(format!("gameday_dashboard/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(DashboardError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Issue one trigger request and absorb any failure. Never raises and
    /// never touches stream or store state.
    pub async fn trigger(&self, kind: &ChaosKind) {
        match self.send(kind).await {
            Ok(()) => info!("Chaos trigger '{}' accepted", kind),
            Err(e) => warn!("Chaos trigger '{}' failed: {}", kind, e),
        }
    }

    /// Fire-and-forget variant: returns as soon as the request is initiated.
    pub fn trigger_detached(&self, kind: ChaosKind) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.trigger(&kind).await;
        });
    }

    /// Single attempt; any 2xx is success, everything else is an error. No
    /// retries, no idempotency key.
    async fn send(&self, kind: &ChaosKind) -> Result<()> {
        let url = format!("{}/api/chaos/{}", self.base_url, kind.slug());
        debug!("Dispatching chaos trigger to {}", url);

        let response = self.client.post(&url).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(())
        } else {
            Err(DashboardError::Command(format!(
                "endpoint returned {} for '{}'",
                status, kind
            )))
        }
    }
}
