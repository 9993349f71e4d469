//! In-process scenario simulation.
//!
//! Builds a `SyncRuntime`, drives a goal, a bound task and a reminder through
//! their lifecycle on a simulated clock, and prints every event the dispatcher
//! delivered along with the resulting state.

use anyhow::Result;
use cadence_core::application::SyncRuntime;
use cadence_core::config::Config;
use cadence_core::domain::{AccountUuid, GoalBinding, Importance, ReminderTrigger};
use cadence_core::events::{handler_fn, EventEnvelope, EventKind, FanOut, HandlerError};
use chrono::{Duration, Utc};
use clap::Args;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tabled::Tabled;

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct SimulateArgs {
    /// Account the scenario runs under
    #[arg(short, long, default_value = "demo-account")]
    pub account: String,

    /// Route events through the outbox instead of publishing directly
    #[arg(long)]
    pub outbox: bool,

    /// Run handlers one at a time in registration order
    #[arg(long)]
    pub sequential: bool,

    /// Number of bound task instances to complete
    #[arg(long, default_value_t = 2)]
    pub completions: u32,

    /// Complete the goal before its deadline fires
    #[arg(long)]
    pub complete_goal: bool,
}

#[derive(Debug, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct EventRow {
    #[tabled(rename = "#")]
    seq: usize,
    #[tabled(rename = "Event Type")]
    event_type: &'static str,
    #[tabled(rename = "Stream")]
    stream_id: String,
    #[tabled(rename = "Version")]
    version: u64,
    #[tabled(rename = "Caused By")]
    caused_by: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport {
    events: Vec<EventRow>,
    key_result_value: f64,
    key_result_target: f64,
    goal_status: String,
    notifications: Vec<String>,
    statistics: cadence_core::statistics::GoalStatistics,
}

/// Deliver everything queued in the outbox, including events raised by handlers.
async fn settle(runtime: &SyncRuntime) -> Result<()> {
    while runtime.flush().await? > 0 {}
    Ok(())
}

fn rows(events: &[EventEnvelope]) -> Vec<EventRow> {
    events
        .iter()
        .enumerate()
        .map(|(i, envelope)| {
            let caused_by = envelope
                .metadata
                .causation_id
                .and_then(|cause| events.iter().position(|e| e.id() == cause))
                .map(|pos| format!("#{}", pos + 1))
                .unwrap_or_default();
            EventRow {
                seq: i + 1,
                event_type: envelope.event_type(),
                stream_id: envelope.stream_id().to_string(),
                version: envelope.version(),
                caused_by,
            }
        })
        .collect()
}

pub async fn execute(args: SimulateArgs, format: OutputFormat) -> Result<()> {
    let mut config = Config::default();
    config.outbox.enabled = args.outbox;
    if args.sequential {
        config.dispatcher.fan_out = FanOut::Sequential;
    }
    let runtime = SyncRuntime::build(&config)?;

    let recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = recorded.clone();
    runtime.dispatcher().subscribe_many(
        EventKind::ALL.iter().copied(),
        handler_fn("simulation_recorder", move |envelope: EventEnvelope| {
            let sink = sink.clone();
            async move {
                if let Ok(mut events) = sink.lock() {
                    events.push(envelope);
                }
                Ok::<_, HandlerError>(())
            }
        }),
    );

    let account = AccountUuid::new(args.account.as_str());
    let now = Utc::now();
    let deadline = now + Duration::hours(1);

    let goal = runtime
        .goals()
        .create_goal(account.clone(), "Read 10 books", Importance::High, now, deadline)
        .await?;
    let key_result = runtime.goals().add_key_result(goal.uuid, "Books", 10.0, 0.0).await?;
    settle(&runtime).await?;

    let binding = GoalBinding {
        goal_uuid: goal.uuid,
        key_result_uuid: key_result,
        increment_value: 1.0,
    };
    let template = runtime.tasks().create_template(account.clone(), "Finish a book", Some(binding)).await?;
    for i in 0..args.completions {
        let scheduled_for = now + Duration::minutes(i64::from(i));
        let instance = runtime.tasks().generate_instance(template.uuid, scheduled_for).await?;
        runtime.tasks().complete_instance(instance.uuid, scheduled_for).await?;
        settle(&runtime).await?;
    }

    let remind_at = now + Duration::minutes(10);
    runtime
        .reminders()
        .create_reminder(account.clone(), "Reading time", ReminderTrigger::Fixed { at: remind_at }, true)
        .await?;
    settle(&runtime).await?;
    runtime.schedules().run_due(remind_at + Duration::minutes(1)).await?;
    settle(&runtime).await?;

    if args.complete_goal {
        runtime.goals().complete_goal(goal.uuid).await?;
        settle(&runtime).await?;
    }
    runtime.schedules().run_due(deadline + Duration::minutes(1)).await?;
    settle(&runtime).await?;

    let goal = runtime.goals().get_goal(goal.uuid).await?;
    let (key_result_value, key_result_target) = goal
        .key_result(key_result)
        .map(|kr| (kr.current_value, kr.target_value))
        .unwrap_or_default();
    let notifications = runtime
        .notifications()
        .list_notifications(&account)
        .await?
        .into_iter()
        .map(|n| n.title)
        .collect();
    let events = recorded.lock().map(|events| rows(&events)).unwrap_or_default();

    let report = SimulationReport {
        events,
        key_result_value,
        key_result_target,
        goal_status: format!("{:?}", goal.status),
        notifications,
        statistics: runtime.statistics().get(&account),
    };
    runtime.shutdown().await?;

    match format {
        OutputFormat::Table => {
            output::print_list(&report.events, format)?;
            output::print_header("Result");
            output::print_detail("Delivery", &format!("{:?}", runtime.delivery_mode()));
            output::print_detail("Goal status", &report.goal_status);
            output::print_detail(
                "Key result",
                &format!("{} / {}", report.key_result_value, report.key_result_target),
            );
            output::print_detail("Notifications", &report.notifications.join(", "));
            output::print_detail(
                "Statistics",
                &format!(
                    "{} goals, {} active, {} completed",
                    report.statistics.total_goals, report.statistics.active_goals, report.statistics.completed_goals
                ),
            );
            output::print_info(&format!("{} events delivered", report.events.len()));
            Ok(())
        }
        _ => output::print_item(&report, format),
    }
}
