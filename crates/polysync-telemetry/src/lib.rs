//! # Polysync Telemetry
//!
//! Logging and metrics setup shared by every Polysync process.
//!
//! - [`init_logging`] installs a `tracing` subscriber printing JSON or
//!   pretty output.
//! - [`init_metrics`] installs the Prometheus recorder behind the `metrics`
//!   facade and describes the standard counters.
//!
//! ```rust,no_run
//! use polysync_telemetry::{init_logging, init_metrics, LogConfig, MetricsConfig};
//!
//! # fn main() -> Result<(), polysync_telemetry::TelemetryError> {
//! init_logging(&LogConfig::default())?;
//! init_metrics(&MetricsConfig::default())?;
//! tracing::info!("telemetry ready");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, LogFormat};
pub use metrics::{init_metrics, render_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
