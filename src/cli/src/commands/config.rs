//! Configuration inspection commands.
//!
//! Reads the same sources as `cadence-sync`: an optional file plus
//! `CADENCE__*` environment overrides.

use anyhow::Result;
use cadence_core::config::Config;
use clap::Subcommand;
use serde_json::json;
use std::path::PathBuf;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show {
        /// Configuration file (YAML, TOML or JSON)
        #[arg(short, long, env = "CADENCE_CONFIG")]
        file: Option<PathBuf>,
    },

    /// Validate configuration without starting anything
    Check {
        /// Configuration file (YAML, TOML or JSON)
        #[arg(short, long, env = "CADENCE_CONFIG")]
        file: Option<PathBuf>,
    },
}

fn load(file: Option<&PathBuf>) -> Result<Config> {
    match file {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
}

fn to_value(config: &Config) -> Result<serde_json::Value> {
    Ok(json!({
        "service": serde_json::to_value(&config.service)?,
        "dispatcher": serde_json::to_value(&config.dispatcher)?,
        "statistics": serde_json::to_value(&config.statistics)?,
        "outbox": serde_json::to_value(&config.outbox)?,
        "telemetry": {
            "serviceName": config.telemetry.service_name,
            "environment": config.telemetry.environment,
            "logLevel": config.telemetry.logging.level,
            "logFormat": format!("{:?}", config.telemetry.logging.format).to_lowercase(),
            "metricsEnabled": config.telemetry.metrics.enabled,
        },
    }))
}

pub fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Show { file } => {
            let config = load(file.as_ref())?;
            let value = to_value(&config)?;

            match format {
                OutputFormat::Table => {
                    output::print_header("Configuration");
                    if let Some(sections) = value.as_object() {
                        for (section, fields) in sections {
                            if let Some(fields) = fields.as_object() {
                                for (key, v) in fields {
                                    output::print_detail(&format!("{}.{}", section, key), &v.to_string());
                                }
                            }
                        }
                    }
                    Ok(())
                }
                _ => output::print_item(&value, format),
            }
        }

        ConfigCommands::Check { file } => {
            let config = load(file.as_ref())?;
            let delivery = if config.outbox.enabled { "outbox" } else { "direct" };
            output::print_success(&format!(
                "Configuration is valid (delivery: {}, fan-out: {:?})",
                delivery, config.dispatcher.fan_out
            ));
            Ok(())
        }
    }
}
