//! Configuration sections.

use std::time::Duration;

use polysync_core::IntegrationInfo;
use polysync_telemetry::{LogConfig, MetricsConfig};
use serde::{Deserialize, Serialize};

/// Discovery scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    /// Milliseconds between discovery ticks.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Cap on concurrently running discovery tasks.
    #[serde(default = "default_scheduler_in_flight")]
    pub max_in_flight: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            max_in_flight: default_scheduler_in_flight(),
        }
    }
}

impl SchedulerSection {
    /// Tick interval.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

fn default_delay_ms() -> u64 {
    60_000
}

fn default_scheduler_in_flight() -> usize {
    1000
}

/// Fan-out settings for provider calls that resolve many items at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FanOutSection {
    /// Cap on concurrent lookups per fan-out.
    #[serde(default = "default_fanout_in_flight")]
    pub max_in_flight: usize,
}

impl Default for FanOutSection {
    fn default() -> Self {
        Self {
            max_in_flight: default_fanout_in_flight(),
        }
    }
}

fn default_fanout_in_flight() -> usize {
    64
}

/// Logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Log output.
    #[serde(default)]
    pub logging: LogConfig,

    /// Prometheus exporter.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// One configured integration.
///
/// The key may be written as a JSON string or as an inline table:
///
/// ```toml
/// [[integrations]]
/// id = "opa-dev"
/// provider = "open_policy_agent"
/// key = { bundle_path = "/var/lib/polysync/bundles" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegrationSection {
    /// Catalog id.
    pub id: String,

    /// Provider name, matched case-insensitively.
    pub provider: String,

    /// Provider credential blob.
    #[serde(default)]
    pub key: serde_json::Value,
}

impl IntegrationSection {
    /// The integration as providers see it.
    pub fn to_info(&self) -> IntegrationInfo {
        let key = match &self.key {
            serde_json::Value::Null => "{}".to_string(),
            serde_json::Value::String(raw) => raw.clone(),
            other => other.to_string(),
        };
        IntegrationInfo::new(self.provider.trim(), key)
    }
}
