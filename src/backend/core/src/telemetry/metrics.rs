//! Prometheus metrics for event dispatch, handlers, the outbox and read models.
//!
//! This module provides:
//!
//! - Published-event counters by event type
//! - Handler duration histograms and failure counters by handler
//! - Outbox depth gauge
//! - Statistics reconciliation counters
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_core::telemetry::metrics::DispatchMetrics;
//! use std::time::Duration;
//!
//! DispatchMetrics::event_published("goal.created");
//! DispatchMetrics::handler_completed("goal_progress", "task.instance.completed", Duration::from_millis(3));
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets for handler durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Global labels to add to all metrics
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
}

/// Handle to the installed Prometheus recorder.
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry with no recorder installed. Metric calls become no-ops.
    pub fn disabled() -> Self {
        Self {
            prometheus_handle: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Initialize the metrics subsystem.
///
/// # Errors
///
/// Returns an error if the buckets are invalid or a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new().add_global_label("service", service_name);

    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    builder = builder.set_buckets(&config.duration_buckets)?;

    let handle = builder.install_recorder()?;

    register_metric_descriptions();

    tracing::info!(service_name = %service_name, "Metrics initialized");

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

/// Register all metric descriptions.
fn register_metric_descriptions() {
    // Dispatch
    describe_counter!("cadence_events_published_total", "Events published to the dispatcher");
    describe_gauge!("cadence_subscriptions", "Handler subscriptions currently registered");

    // Handlers
    describe_histogram!(
        "cadence_handler_duration_seconds",
        "Event handler execution time in seconds"
    );
    describe_counter!(
        "cadence_handler_failures_total",
        "Handler errors and panics isolated by the dispatcher"
    );

    // Outbox
    describe_gauge!("cadence_outbox_pending", "Outbox entries awaiting delivery");
    describe_counter!("cadence_outbox_relayed_total", "Outbox entries delivered by the relay");

    // Read models
    describe_counter!(
        "cadence_statistics_reconciliations_total",
        "Statistics accumulators replaced by a full recompute"
    );
    describe_counter!(
        "cadence_statistics_events_skipped_total",
        "Events ignored by statistics as duplicates or stale"
    );

    // Errors
    describe_counter!("cadence_errors_total", "Errors constructed, by code and category");
}

/// Dispatcher, handler and outbox metrics.
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Count one published event.
    pub fn event_published(event_type: &'static str) {
        counter!("cadence_events_published_total", "event_type" => event_type).increment(1);
    }

    /// Record a handler's execution time.
    pub fn handler_completed(handler: &str, event_type: &'static str, duration: Duration) {
        histogram!(
            "cadence_handler_duration_seconds",
            "handler" => handler.to_string(),
            "event_type" => event_type,
        )
        .record(duration.as_secs_f64());
    }

    /// Count one isolated handler failure.
    pub fn handler_failed(handler: &str, event_type: &'static str, panicked: bool) {
        counter!(
            "cadence_handler_failures_total",
            "handler" => handler.to_string(),
            "event_type" => event_type,
            "panicked" => if panicked { "true" } else { "false" },
        )
        .increment(1);
    }

    pub fn set_subscriptions(count: usize) {
        gauge!("cadence_subscriptions").set(count as f64);
    }

    pub fn set_outbox_pending(depth: usize) {
        gauge!("cadence_outbox_pending").set(depth as f64);
    }

    pub fn outbox_relayed(count: usize) {
        counter!("cadence_outbox_relayed_total").increment(count as u64);
    }
}

/// Statistics read-model metrics.
pub struct StatisticsMetrics;

impl StatisticsMetrics {
    pub fn reconciled(accounts: usize) {
        counter!("cadence_statistics_reconciliations_total").increment(accounts as u64);
    }

    /// `reason` is `duplicate`, `stale` or `tombstoned`.
    pub fn event_skipped(reason: &'static str) {
        counter!("cadence_statistics_events_skipped_total", "reason" => reason).increment(1);
    }
}

/// Utility for tracking operation timing with automatic metric recording.
pub struct OperationTimer {
    start: Instant,
    operation_name: &'static str,
}

impl OperationTimer {
    /// Start timing an operation.
    pub fn start(operation_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation_name,
        }
    }

    /// Get elapsed time without recording.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Finish and record to the `cadence_operation_duration_seconds` histogram.
    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();

        histogram!(
            "cadence_operation_duration_seconds",
            "operation" => self.operation_name,
        )
        .record(duration.as_secs_f64());

        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_defaults() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert!(!config.duration_buckets.is_empty());
    }

    #[test]
    fn test_disabled_registry_renders_nothing() {
        let config = MetricsConfig {
            enabled: false,
            ..Default::default()
        };
        let registry = init_metrics(&config, "test").unwrap();
        assert!(!registry.is_enabled());
        assert!(registry.render().is_empty());
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        DispatchMetrics::event_published("goal.created");
        DispatchMetrics::handler_failed("h", "goal.created", true);
        StatisticsMetrics::event_skipped("duplicate");
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::start("test_operation");
        std::thread::sleep(std::time::Duration::from_millis(10));
        let duration = timer.finish();
        assert!(duration.as_millis() >= 10);
    }
}
