//! The root configuration type.

use std::collections::HashSet;

use polysync_telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, FanOutSection, IntegrationSection, SchedulerSection, TelemetrySection};

/// Complete agent configuration.
///
/// ```
/// use polysync_config::PolysyncConfig;
///
/// let config = PolysyncConfig::default();
/// assert_eq!(config.scheduler.delay_ms, 60_000);
/// assert!(config.integrations.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolysyncConfig {
    /// Discovery scheduler.
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Provider fan-out.
    #[serde(default)]
    pub fanout: FanOutSection,

    /// Logging and metrics.
    #[serde(default)]
    pub telemetry: TelemetrySection,

    /// Integrations to discover.
    #[serde(default)]
    pub integrations: Vec<IntegrationSection>,
}

impl PolysyncConfig {
    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.delay_ms == 0 {
            return Err(ConfigError::invalid_value(
                "scheduler.delay_ms",
                "must be greater than zero",
            ));
        }
        if self.scheduler.max_in_flight == 0 {
            return Err(ConfigError::invalid_value(
                "scheduler.max_in_flight",
                "must be greater than zero",
            ));
        }
        if self.fanout.max_in_flight == 0 {
            return Err(ConfigError::invalid_value(
                "fanout.max_in_flight",
                "must be greater than zero",
            ));
        }
        if self.telemetry.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "telemetry.logging.level",
                "must not be empty",
            ));
        }
        if self.telemetry.metrics.enabled {
            self.telemetry
                .metrics
                .listen_addr()
                .map_err(|e| ConfigError::invalid_value("telemetry.metrics.addr", e.to_string()))?;
        }

        let mut seen = HashSet::new();
        for (i, integration) in self.integrations.iter().enumerate() {
            if integration.id.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("integrations[{i}].id"),
                    "must not be empty",
                ));
            }
            if integration.provider.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("integrations[{i}].provider"),
                    "must not be empty",
                ));
            }
            if !seen.insert(integration.id.as_str()) {
                return Err(ConfigError::invalid_value(
                    format!("integrations[{i}].id"),
                    format!("duplicate id {}", integration.id),
                ));
            }
        }

        Ok(())
    }

    /// Preset for local runs: pretty debug logs and a short tick.
    pub fn development() -> Self {
        Self {
            scheduler: SchedulerSection {
                delay_ms: 5_000,
                ..SchedulerSection::default()
            },
            telemetry: TelemetrySection {
                logging: LogConfig::development(),
                ..TelemetrySection::default()
            },
            ..Self::default()
        }
    }

    /// Preset for deployments: JSON logs and metrics on.
    pub fn production() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.metrics.enabled = true;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integration(id: &str, provider: &str) -> IntegrationSection {
        IntegrationSection {
            id: id.to_string(),
            provider: provider.to_string(),
            key: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_presets_validate() {
        assert!(PolysyncConfig::default().validate().is_ok());
        assert!(PolysyncConfig::development().validate().is_ok());
        assert!(PolysyncConfig::production().validate().is_ok());
        assert_eq!(PolysyncConfig::development().telemetry.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_zero_delay_rejected() {
        let mut config = PolysyncConfig::default();
        config.scheduler.delay_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scheduler.delay_ms"));
    }

    #[test]
    fn test_zero_caps_rejected() {
        let mut config = PolysyncConfig::default();
        config.fanout.max_in_flight = 0;
        assert!(config.validate().is_err());

        let mut config = PolysyncConfig::default();
        config.scheduler.max_in_flight = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_integration_ids_rejected() {
        let mut config = PolysyncConfig::default();
        config.integrations = vec![integration("a", "noop"), integration("a", "noop")];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate id a"));
    }

    #[test]
    fn test_blank_provider_rejected() {
        let mut config = PolysyncConfig::default();
        config.integrations = vec![integration("a", " ")];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metrics_addr_checked_only_when_enabled() {
        let mut config = PolysyncConfig::default();
        config.telemetry.metrics.addr = "garbage".to_string();
        assert!(config.validate().is_ok());

        config.telemetry.metrics.enabled = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("telemetry.metrics.addr"));
    }
}
