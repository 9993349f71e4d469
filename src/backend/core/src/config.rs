//! Configuration management.
//!
//! Every section has defaults, so an empty environment yields a working
//! in-process configuration. Environment variables use the `CADENCE` prefix and
//! `__` as the nesting separator, e.g. `CADENCE__DISPATCHER__FAN_OUT=sequential`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::events::FanOut;
use crate::telemetry::TelemetryConfig;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service identity
    #[serde(default)]
    pub service: ServiceConfig,

    /// Logging and metrics
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Event dispatcher behavior
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Statistics read models
    #[serde(default)]
    pub statistics: StatisticsConfig,

    /// Transactional outbox
    #[serde(default)]
    pub outbox: OutboxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Instance name used in logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// How often the schedule module looks for due tasks
    #[serde(default = "default_schedule_tick", with = "humantime_serde")]
    pub schedule_tick: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            schedule_tick: default_schedule_tick(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// How the handlers of one event are driven
    #[serde(default)]
    pub fan_out: FanOut,

    /// Convert handler panics into handler failures
    #[serde(default = "default_catch_panics")]
    pub catch_panics: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            fan_out: FanOut::default(),
            catch_panics: default_catch_panics(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Number of recently applied event ids remembered per account
    #[serde(default = "default_dedupe_window")]
    pub dedupe_window: usize,

    /// Periodically replace accumulators with a full recompute
    #[serde(default = "default_reconcile_enabled")]
    pub reconcile_enabled: bool,

    /// Interval between reconciliation runs
    #[serde(default = "default_reconcile_interval", with = "humantime_serde")]
    pub reconcile_interval: Duration,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            dedupe_window: default_dedupe_window(),
            reconcile_enabled: default_reconcile_enabled(),
            reconcile_interval: default_reconcile_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// Route committed events through the outbox instead of publishing directly
    #[serde(default)]
    pub enabled: bool,

    /// Relay poll interval
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Maximum entries relayed per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval: default_poll_interval(),
            batch_size: default_batch_size(),
        }
    }
}

// Default value functions
fn default_instance_name() -> String { "cadence-sync".to_string() }
fn default_schedule_tick() -> Duration { Duration::from_secs(30) }
fn default_catch_panics() -> bool { true }
fn default_dedupe_window() -> usize { 1024 }
fn default_reconcile_enabled() -> bool { true }
fn default_reconcile_interval() -> Duration { Duration::from_secs(300) }
fn default_poll_interval() -> Duration { Duration::from_millis(500) }
fn default_batch_size() -> usize { 100 }

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CADENCE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides on top.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("CADENCE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would make a component misbehave.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.statistics.dedupe_window == 0 {
            return Err(crate::error::CadenceError::configuration(
                "statistics.dedupe_window must be at least 1",
            ));
        }
        if self.outbox.batch_size == 0 {
            return Err(crate::error::CadenceError::configuration(
                "outbox.batch_size must be at least 1",
            ));
        }
        if self.service.schedule_tick.is_zero()
            || self.statistics.reconcile_interval.is_zero()
            || self.outbox.poll_interval.is_zero()
        {
            return Err(crate::error::CadenceError::configuration(
                "worker intervals must be non-zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.dispatcher.fan_out, FanOut::Concurrent);
        assert!(config.dispatcher.catch_panics);
        assert_eq!(config.statistics.dedupe_window, 1024);
        assert!(!config.outbox.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[dispatcher]
fan_out = "sequential"

[statistics]
dedupe_window = 16
reconcile_interval = "2m"

[outbox]
enabled = true
poll_interval = "250ms"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.dispatcher.fan_out, FanOut::Sequential);
        assert_eq!(config.statistics.dedupe_window, 16);
        assert_eq!(config.statistics.reconcile_interval, Duration::from_secs(120));
        assert!(config.outbox.enabled);
        assert_eq!(config.outbox.poll_interval, Duration::from_millis(250));
        assert_eq!(config.outbox.batch_size, 100);
    }

    #[test]
    fn test_zero_window_is_invalid() {
        let mut config = Config::default();
        config.statistics.dedupe_window = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ConfigurationError);
    }
}
