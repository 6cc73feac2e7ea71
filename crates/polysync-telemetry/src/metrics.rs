//! Prometheus metrics.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `polysync_dispatch_total` | Counter | `outcome` | Scheduler task outcomes |
//! | `polysync_sync_total` | Counter | `outcome` | Synchronization calls |
//! | `polysync_rar_updates_total` | Counter | - | Grant points rewritten on a backend |
//! | `polysync_discovered_applications_total` | Counter | - | Applications newly catalogued |
//!
//! Recording goes through the `metrics` facade everywhere, so nothing is
//! recorded until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::TelemetryError;
use crate::TelemetryResult;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder.
    #[serde(default)]
    pub enabled: bool,

    /// Scrape endpoint address. Empty installs the recorder without a
    /// listener; [`render_metrics`] still works.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
        }
    }
}

impl MetricsConfig {
    /// The listener address, if one is configured.
    pub fn listen_addr(&self) -> TelemetryResult<Option<SocketAddr>> {
        let addr = self.addr.trim();
        if addr.is_empty() {
            return Ok(None);
        }
        addr.parse()
            .map(Some)
            .map_err(|e| TelemetryError::InvalidAddress(format!("{addr}: {e}")))
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Install the Prometheus recorder and describe the standard metrics.
///
/// With a listener address this must run inside a Tokio runtime; the
/// scrape endpoint is spawned onto it.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let handle = match config.listen_addr()? {
        Some(addr) => {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
            let (recorder, exporter) = PrometheusBuilder::new()
                .with_http_listener(addr)
                .build()
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
            runtime.spawn(async move {
                if let Err(e) = exporter.await {
                    tracing::error!(error = ?e, "metrics exporter stopped");
                }
            });
            info!(%addr, "metrics endpoint listening");
            handle
        }
        None => PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?,
    };

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();
    Ok(())
}

/// Render every metric in Prometheus text format.
///
/// Returns `None` until [`init_metrics`] has installed the recorder.
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(
        "polysync_dispatch_total",
        "Scheduler task outcomes by result"
    );
    describe_counter!(
        "polysync_sync_total",
        "Policy synchronizations between applications by result"
    );
    describe_counter!(
        "polysync_rar_updates_total",
        "Grant points rewritten on a backend"
    );
    describe_counter!(
        "polysync_discovered_applications_total",
        "Applications added to the catalog by discovery"
    );
}
