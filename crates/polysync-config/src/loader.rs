//! Layered configuration loading.

use std::env;
use std::fs;
use std::path::Path;

use polysync_telemetry::LogFormat;

use crate::{ConfigError, PolysyncConfig};

/// Default prefix for environment overrides.
pub const DEFAULT_ENV_PREFIX: &str = "POLYSYNC";

/// Configuration loader.
///
/// Layers are applied in order, later ones overriding earlier ones:
/// 1. Built-in defaults
/// 2. A TOML or JSON file
/// 3. Environment variables named `PREFIX__SECTION__KEY`
///
/// ```no_run
/// use polysync_config::ConfigLoader;
///
/// # fn main() -> Result<(), polysync_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_dotenv()
///     .with_optional_file("polysync.toml")?
///     .with_env_prefix("POLYSYNC")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: PolysyncConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PolysyncConfig::default(),
            env_prefix: None,
        }
    }

    /// Start from the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = PolysyncConfig::development();
        self
    }

    /// Start from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = PolysyncConfig::production();
        self
    }

    /// Load a `.toml` or `.json` file.
    ///
    /// Sections present in the file replace the current ones; absent fields
    /// take their defaults.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;

        self.config = parse(&content, &format)?;
        Ok(self)
    }

    /// Load a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `toml` or `json` format.
    ///
    /// ```
    /// use polysync_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[scheduler]\ndelay_ms = 250", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.scheduler.delay_ms, 250);
    /// assert_eq!(config.scheduler.max_in_flight, 1000);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Enable environment overrides under `prefix`.
    ///
    /// With prefix `POLYSYNC`:
    /// - `POLYSYNC__SCHEDULER__DELAY_MS=30000`
    /// - `POLYSYNC__TELEMETRY__LOGGING__FORMAT=pretty`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load variables from a `.env` file into the process environment, if
    /// one exists.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        let _ = dotenvy::dotenv();
        self
    }

    /// Apply environment overrides and validate.
    pub fn load(mut self) -> Result<PolysyncConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_vars(&prefix, env::vars())?;
        }
        self.config.validate()?;
        Ok(self.config)
    }

    /// Return the configuration without overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> PolysyncConfig {
        self.config
    }

    fn apply_env_vars<I>(&mut self, prefix: &str, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{prefix}__");
        for (key, value) in vars {
            if let Some(path) = key.strip_prefix(&marker) {
                self.apply_env_var(&key, path, &value)?;
            }
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, path: &str, value: &str) -> Result<(), ConfigError> {
        let parts: Vec<&str> = path.split("__").collect();

        match parts.as_slice() {
            ["SCHEDULER", "DELAY_MS"] => {
                self.config.scheduler.delay_ms = parse_number(key, value)?;
            }
            ["SCHEDULER", "MAX_IN_FLIGHT"] => {
                self.config.scheduler.max_in_flight = parse_number(key, value)?;
            }
            ["FANOUT", "MAX_IN_FLIGHT"] => {
                self.config.fanout.max_in_flight = parse_number(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                self.config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                self.config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                self.config.telemetry.metrics.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["TELEMETRY", "METRICS", "ADDR"] => {
                self.config.telemetry.metrics.addr = value.to_string();
            }
            // Integrations are a list and come from files only.
            _ => {}
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<PolysyncConfig, ConfigError> {
    match format {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_load() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, PolysyncConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_vars(
                "POLYSYNC",
                vars(&[
                    ("POLYSYNC__SCHEDULER__DELAY_MS", "1500"),
                    ("POLYSYNC__FANOUT__MAX_IN_FLIGHT", "8"),
                    ("POLYSYNC__TELEMETRY__LOGGING__FORMAT", "Pretty"),
                    ("POLYSYNC__TELEMETRY__METRICS__ENABLED", "yes"),
                    ("POLYSYNC__UNKNOWN__KEY", "ignored"),
                    ("OTHER__SCHEDULER__DELAY_MS", "1"),
                ]),
            )
            .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.scheduler.delay_ms, 1500);
        assert_eq!(config.fanout.max_in_flight, 8);
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
        assert!(config.telemetry.metrics.enabled);
    }

    #[test]
    fn test_env_parse_errors() {
        let mut loader = ConfigLoader::new();
        let err = loader
            .apply_env_vars("POLYSYNC", vars(&[("POLYSYNC__SCHEDULER__DELAY_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { .. }));

        let err = loader
            .apply_env_vars(
                "POLYSYNC",
                vars(&[("POLYSYNC__TELEMETRY__METRICS__ENABLED", "maybe")]),
            )
            .unwrap_err();
        assert!(err.to_string().contains("expected boolean"));
    }

    #[test]
    fn test_with_string_json() {
        let config = ConfigLoader::new()
            .with_string(
                r#"{"integrations":[{"id":"n","provider":"noop"}]}"#,
                "JSON",
            )
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.integrations.len(), 1);
        assert_eq!(config.integrations[0].provider, "noop");
    }

    #[test]
    fn test_unsupported_format() {
        assert!(matches!(
            ConfigLoader::new().with_string("", "yaml"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(matches!(
            ConfigLoader::new().with_string("[server]\nport = 1", "toml"),
            Err(ConfigError::TomlError(_))
        ));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("sometimes"), None);
    }
}
