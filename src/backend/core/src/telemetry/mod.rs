//! Telemetry: structured logging and Prometheus metrics.
//!
//! - **Logging**: `tracing` subscriber with JSON/pretty/compact output and per-module levels
//! - **Metrics**: `metrics` facade backed by the Prometheus recorder
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_core::telemetry::{TelemetryConfig, init_telemetry};
//!
//! let config = TelemetryConfig::default();
//! let handle = init_telemetry(&config).expect("Failed to initialize telemetry");
//! handle.shutdown();
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{
    init_metrics, DispatchMetrics, MetricsConfig, MetricsRegistry, OperationTimer,
    StatisticsMetrics,
};

use serde::Deserialize;

/// Unified telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to metrics and startup logs
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "cadence-sync".to_string()
}

fn default_environment() -> String {
    std::env::var("CADENCE_ENVIRONMENT").unwrap_or_else(|_| "development".to_string())
}

/// Initialize logging and metrics.
///
/// Call once at application startup.
///
/// # Errors
///
/// Returns an error if either component fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryHandle> {
    let metrics = init_metrics(&config.metrics, &config.service_name)?;

    init_logging(&config.logging, &config.environment)?;

    Ok(TelemetryHandle { metrics })
}

/// Handle for managing telemetry lifecycle.
#[derive(Debug)]
pub struct TelemetryHandle {
    /// Metrics handle for rendering the registry
    pub metrics: MetricsRegistry,
}

impl TelemetryHandle {
    /// Flush a final metrics snapshot to the log.
    pub fn shutdown(self) {
        if self.metrics.is_enabled() {
            ::tracing::debug!(metrics = %self.metrics.render(), "Final metrics snapshot");
        }
        ::tracing::info!("Telemetry shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "cadence-sync");
        assert!(config.metrics.enabled);
    }
}
