//! Typed configuration for the Polysync agent.
//!
//! Configuration is layered: defaults, then a TOML or JSON file, then
//! `POLYSYNC__SECTION__KEY` environment variables. Unknown fields anywhere
//! in a file are rejected.
//!
//! # Configuration File Format
//!
//! ```toml
//! [scheduler]
//! delay_ms = 60000
//! max_in_flight = 1000
//!
//! [fanout]
//! max_in_flight = 64
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics]
//! enabled = false
//! addr = "0.0.0.0:9090"
//!
//! [[integrations]]
//! id = "opa-dev"
//! provider = "open_policy_agent"
//! key = '{"bundle_path": "/var/lib/polysync/bundles"}'
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::PolysyncConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{FanOutSection, IntegrationSection, SchedulerSection, TelemetrySection};

pub use polysync_telemetry::{LogConfig, LogFormat, MetricsConfig};
