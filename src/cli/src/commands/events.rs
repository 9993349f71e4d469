//! Event registry commands.

use anyhow::{bail, Result};
use cadence_core::events::EventKind;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum EventCommands {
    /// List registered event types
    List {
        /// Only show events owned by this module (goal, task, reminder, schedule, notification)
        #[arg(short, long)]
        module: Option<String>,
    },

    /// Show one event type
    Show {
        /// Event type, e.g. goal.key_result.progressed
        event_type: String,
    },
}

#[derive(Debug, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct EventRow {
    #[tabled(rename = "Event Type")]
    event_type: &'static str,
    #[tabled(rename = "Module")]
    module: &'static str,
    #[tabled(rename = "Description")]
    description: &'static str,
}

impl From<EventKind> for EventRow {
    fn from(kind: EventKind) -> Self {
        Self {
            event_type: kind.as_str(),
            module: kind.module().as_str(),
            description: kind.description(),
        }
    }
}

pub fn execute(cmd: EventCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        EventCommands::List { module } => {
            let rows: Vec<EventRow> = EventKind::ALL
                .iter()
                .filter(|kind| module.as_deref().map_or(true, |m| kind.module().as_str() == m))
                .map(|kind| EventRow::from(*kind))
                .collect();
            if rows.is_empty() {
                if let Some(module) = module {
                    bail!("no events registered for module '{}'", module);
                }
            }
            output::print_list(&rows, format)
        }

        EventCommands::Show { event_type } => {
            let kind: EventKind = event_type.parse()?;
            let row = EventRow::from(kind);
            match format {
                OutputFormat::Table => {
                    output::print_header(row.event_type);
                    output::print_detail("Module", row.module);
                    output::print_detail("Description", row.description);
                    Ok(())
                }
                _ => output::print_item(&row, format),
            }
        }
    }
}
