//! Cadence CLI - operator tooling for the event synchronization core.
//!
//! Lists the event registry, replays NDJSON event logs into statistics,
//! runs in-process scenarios, and inspects configuration.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config, events, replay, simulate};
use output::OutputFormat;

/// Cadence - event-driven module synchronization
#[derive(Parser)]
#[command(
    name = "cadence",
    version,
    about = "Cadence - event-driven module synchronization",
    long_about = "Operator CLI for inspecting the event registry, replaying event logs, and simulating cross-module flows.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Event registry operations
    #[command(subcommand)]
    Events(events::EventCommands),

    /// Fold an NDJSON event log into goal statistics
    Replay(replay::ReplayArgs),

    /// Run a goal/task/reminder scenario through an in-process runtime
    Simulate(simulate::SimulateArgs),

    /// Configuration inspection
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let format = cli.output;

    let result = match cli.command {
        Commands::Events(cmd) => events::execute(cmd, format),
        Commands::Replay(args) => replay::execute(args, format),
        Commands::Simulate(args) => simulate::execute(args, format).await,
        Commands::Config(cmd) => config::execute(cmd, format),
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
