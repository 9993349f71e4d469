//! End-to-end tests for cross-module event synchronization.
//!
//! Every test builds its own runtime; nothing is shared between tests.

use cadence_core::application::SyncRuntime;
use cadence_core::config::Config;
use cadence_core::domain::{
    AccountUuid, GoalBinding, Importance, ReminderTrigger, ScheduleSource, ScheduleTaskStatus,
    TaskInstanceStatus,
};
use cadence_core::error::ErrorCode;
use cadence_core::events::{handler_fn, EventEnvelope, EventKind, HandlerError};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Test Utilities
// ============================================================================

fn account() -> AccountUuid {
    AccountUuid::new("acct-1")
}

fn runtime() -> SyncRuntime {
    SyncRuntime::build(&Config::default()).unwrap()
}

/// Record every envelope of `kinds` published on the runtime's dispatcher.
fn record(runtime: &SyncRuntime, kinds: &[EventKind]) -> Arc<Mutex<Vec<EventEnvelope>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    runtime.dispatcher().subscribe_many(
        kinds.iter().copied(),
        handler_fn("recorder", move |envelope| {
            let sink = sink.clone();
            async move {
                sink.lock().push(envelope);
                Ok::<_, HandlerError>(())
            }
        }),
    );
    seen
}

/// A goal with one key result (target 100), returning `(goal_uuid, key_result_uuid)`.
async fn goal_with_key_result(runtime: &SyncRuntime, start: DateTime<Utc>) -> (Uuid, Uuid) {
    let goal = runtime
        .goals()
        .create_goal(account(), "Run 100km", Importance::Medium, start, start + Duration::days(30))
        .await
        .unwrap();
    let key_result = runtime
        .goals()
        .add_key_result(goal.uuid, "Kilometres", 100.0, 0.0)
        .await
        .unwrap();
    (goal.uuid, key_result)
}

// ============================================================================
// Task -> Goal
// ============================================================================

#[tokio::test]
async fn test_task_completion_progresses_key_result() {
    let runtime = runtime();
    let now = Utc::now();
    let (goal_uuid, kr_uuid) = goal_with_key_result(&runtime, now).await;
    let progressed = record(&runtime, &[EventKind::KeyResultProgressed]);
    let completed = record(&runtime, &[EventKind::TaskInstanceCompleted]);

    let binding = GoalBinding {
        goal_uuid,
        key_result_uuid: kr_uuid,
        increment_value: 5.0,
    };
    let template = runtime.tasks().create_template(account(), "Morning run", Some(binding)).await.unwrap();
    let instance = runtime.tasks().generate_instance(template.uuid, now).await.unwrap();
    runtime.tasks().complete_instance(instance.uuid, now).await.unwrap();

    let goal = runtime.goals().get_goal(goal_uuid).await.unwrap();
    assert_eq!(goal.key_result(kr_uuid).unwrap().current_value, 5.0);

    let progressed = progressed.lock();
    assert_eq!(progressed.len(), 1);
    let cause = completed.lock()[0].id();
    assert_eq!(progressed[0].metadata.causation_id, Some(cause));
    assert_eq!(progressed[0].metadata.correlation_id, Some(cause.to_string()));

    assert_eq!(runtime.statistics().get(&account()).total_key_results, 1);
}

#[tokio::test]
async fn test_redelivered_completion_applies_once() {
    let runtime = runtime();
    let now = Utc::now();
    let (goal_uuid, kr_uuid) = goal_with_key_result(&runtime, now).await;
    let completed = record(&runtime, &[EventKind::TaskInstanceCompleted]);

    let binding = GoalBinding {
        goal_uuid,
        key_result_uuid: kr_uuid,
        increment_value: 5.0,
    };
    let template = runtime.tasks().create_template(account(), "Run", Some(binding)).await.unwrap();
    let instance = runtime.tasks().generate_instance(template.uuid, now).await.unwrap();
    runtime.tasks().complete_instance(instance.uuid, now).await.unwrap();

    let envelope = completed.lock()[0].clone();
    let report = runtime.dispatcher().publish(&envelope).await;
    assert!(report.is_success());

    let goal = runtime.goals().get_goal(goal_uuid).await.unwrap();
    assert_eq!(goal.key_result(kr_uuid).unwrap().current_value, 5.0);
}

#[tokio::test]
async fn test_failed_progress_leaves_task_completed() {
    let runtime = runtime();
    let now = Utc::now();
    let (goal_uuid, kr_uuid) = goal_with_key_result(&runtime, now).await;

    let binding = GoalBinding {
        goal_uuid,
        key_result_uuid: Uuid::new_v4(),
        increment_value: 5.0,
    };
    let template = runtime.tasks().create_template(account(), "Run", Some(binding)).await.unwrap();
    let instance = runtime.tasks().generate_instance(template.uuid, now).await.unwrap();

    let completed = runtime.tasks().complete_instance(instance.uuid, now).await.unwrap();
    assert_eq!(completed.status, TaskInstanceStatus::Completed);
    let stored = runtime.tasks().get_instance(instance.uuid).await.unwrap();
    assert_eq!(stored.status, TaskInstanceStatus::Completed);

    let goal = runtime.goals().get_goal(goal_uuid).await.unwrap();
    assert_eq!(goal.key_result(kr_uuid).unwrap().current_value, 0.0);
}

#[tokio::test]
async fn test_completion_uses_current_template_binding() {
    let runtime = runtime();
    let now = Utc::now();
    let (goal_uuid, kr_uuid) = goal_with_key_result(&runtime, now).await;

    let template = runtime.tasks().create_template(account(), "Run", None).await.unwrap();
    let instance = runtime.tasks().generate_instance(template.uuid, now).await.unwrap();
    let binding = GoalBinding {
        goal_uuid,
        key_result_uuid: kr_uuid,
        increment_value: 2.5,
    };
    assert!(runtime
        .tasks()
        .update_template(template.uuid, "Run", Some(binding))
        .await
        .unwrap());

    runtime.tasks().complete_instance(instance.uuid, now).await.unwrap();
    let goal = runtime.goals().get_goal(goal_uuid).await.unwrap();
    assert_eq!(goal.key_result(kr_uuid).unwrap().current_value, 2.5);
}

// ============================================================================
// Goal -> Schedule
// ============================================================================

#[tokio::test]
async fn test_goal_deadline_follows_goal_lifecycle() {
    let runtime = runtime();
    let now = Utc::now();
    let goal = runtime
        .goals()
        .create_goal(account(), "Launch", Importance::High, now, now + Duration::days(10))
        .await
        .unwrap();
    let source = ScheduleSource::goal_deadline(goal.uuid);

    let task = runtime.schedules().find_pending_for(&account(), source).await.unwrap().unwrap();
    assert_eq!(task.run_at, goal.end_time);

    let new_end = now + Duration::days(20);
    assert!(runtime.goals().change_schedule(goal.uuid, now, new_end).await.unwrap());
    let moved = runtime.schedules().get_task(task.uuid).await.unwrap();
    assert_eq!(moved.run_at, new_end);

    runtime.goals().complete_goal(goal.uuid).await.unwrap();
    let cancelled = runtime.schedules().get_task(task.uuid).await.unwrap();
    assert_eq!(cancelled.status, ScheduleTaskStatus::Cancelled);
    assert!(runtime.schedules().find_pending_for(&account(), source).await.unwrap().is_none());
    assert_eq!(runtime.schedules().list_tasks(&account()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_redelivered_goal_events_follow_current_goal_state() {
    let runtime = runtime();
    let goal_events = record(&runtime, &[EventKind::GoalCreated, EventKind::GoalScheduleTimeChanged]);
    let now = Utc::now();
    let goal = runtime
        .goals()
        .create_goal(account(), "Launch", Importance::High, now, now + Duration::days(10))
        .await
        .unwrap();
    let source = ScheduleSource::goal_deadline(goal.uuid);

    let new_end = now + Duration::days(20);
    runtime.goals().change_schedule(goal.uuid, now, new_end).await.unwrap();

    // A late goal.created does not pull the deadline back to the old end time
    let created = goal_events.lock()[0].clone();
    runtime.dispatcher().publish(&created).await;
    let task = runtime.schedules().find_pending_for(&account(), source).await.unwrap().unwrap();
    assert_eq!(task.run_at, new_end);

    // Once completed, no redelivered event revives the deadline
    runtime.goals().complete_goal(goal.uuid).await.unwrap();
    let replay: Vec<EventEnvelope> = goal_events.lock().clone();
    for envelope in &replay {
        let report = runtime.dispatcher().publish(envelope).await;
        assert!(report.is_success());
    }
    assert!(runtime.schedules().find_pending_for(&account(), source).await.unwrap().is_none());
    assert_eq!(runtime.schedules().tasks_for(&account(), source).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_redelivered_reminder_creation_respects_disabled_state() {
    let runtime = runtime();
    let created = record(&runtime, &[EventKind::ReminderTemplateCreated]);
    let at = Utc::now() + Duration::hours(2);
    let reminder = runtime
        .reminders()
        .create_reminder(account(), "Stretch", ReminderTrigger::Fixed { at }, true)
        .await
        .unwrap();
    let source = ScheduleSource::reminder(reminder.uuid);

    runtime.reminders().set_enabled(reminder.uuid, false).await.unwrap();
    let envelope = created.lock()[0].clone();
    runtime.dispatcher().publish(&envelope).await;

    assert!(runtime.schedules().find_pending_for(&account(), source).await.unwrap().is_none());
    assert_eq!(runtime.schedules().tasks_for(&account(), source).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_schedule_change_emits_nothing() {
    let runtime = runtime();
    let now = Utc::now();
    let goal = runtime
        .goals()
        .create_goal(account(), "Launch", Importance::High, now, now + Duration::days(10))
        .await
        .unwrap();
    let changed = record(&runtime, &[EventKind::GoalScheduleTimeChanged]);

    let err = runtime
        .goals()
        .change_schedule(goal.uuid, now, now - Duration::days(1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
    assert!(changed.lock().is_empty());

    let stored = runtime.goals().get_goal(goal.uuid).await.unwrap();
    assert_eq!(stored.end_time, goal.end_time);
    assert_eq!(stored.version, goal.version);
}

#[tokio::test]
async fn test_goal_deadline_firing_notifies() {
    let runtime = runtime();
    let now = Utc::now();
    let goal = runtime
        .goals()
        .create_goal(account(), "Launch", Importance::High, now, now + Duration::days(1))
        .await
        .unwrap();

    let fired = runtime.schedules().run_due(goal.end_time + Duration::minutes(1)).await.unwrap();
    assert_eq!(fired, 1);

    let notifications = runtime.notifications().list_notifications(&account()).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Goal due: Launch");
}

#[tokio::test]
async fn test_deleted_goal_cancels_deadline_and_statistics() {
    let runtime = runtime();
    let now = Utc::now();
    let goal = runtime
        .goals()
        .create_goal(account(), "Launch", Importance::Low, now, now + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(runtime.statistics().get(&account()).total_goals, 1);

    runtime.goals().delete_goal(goal.uuid).await.unwrap();

    assert_eq!(runtime.goals().get_goal(goal.uuid).await.unwrap_err().code(), ErrorCode::GoalNotFound);
    assert_eq!(runtime.statistics().get(&account()).total_goals, 0);
    let source = ScheduleSource::goal_deadline(goal.uuid);
    assert!(runtime.schedules().find_pending_for(&account(), source).await.unwrap().is_none());
}

// ============================================================================
// Reminder -> Schedule -> Reminder -> Notification
// ============================================================================

#[tokio::test]
async fn test_reminder_fires_through_schedule_into_notification() {
    let runtime = runtime();
    let at = Utc::now() + Duration::hours(1);
    let reminder = runtime
        .reminders()
        .create_reminder(account(), "Stretch", ReminderTrigger::Fixed { at }, true)
        .await
        .unwrap();
    let triggered = record(&runtime, &[EventKind::ReminderTriggered]);

    let source = ScheduleSource::reminder(reminder.uuid);
    let task = runtime.schedules().find_pending_for(&account(), source).await.unwrap().unwrap();
    assert_eq!(task.run_at, at);

    assert_eq!(runtime.schedules().run_due(at - Duration::minutes(1)).await.unwrap(), 0);
    assert_eq!(runtime.schedules().run_due(at + Duration::minutes(1)).await.unwrap(), 1);
    assert_eq!(runtime.schedules().run_due(at + Duration::minutes(2)).await.unwrap(), 0);

    let reminder = runtime.reminders().get_reminder(reminder.uuid).await.unwrap();
    assert_eq!(reminder.fire_count, 1);
    assert_eq!(reminder.last_fired_at, Some(at));

    let notifications = runtime.notifications().list_notifications(&account()).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Stretch");
    assert_eq!(notifications[0].source_event_id, triggered.lock()[0].id());

    // Redelivering the trigger does not duplicate the notification
    let envelope = triggered.lock()[0].clone();
    runtime.dispatcher().publish(&envelope).await;
    assert_eq!(runtime.notifications().list_notifications(&account()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_recurring_reminder_toggle_cancels_and_recreates() {
    let runtime = runtime();
    let anchor = Utc::now() + Duration::minutes(5);
    let reminder = runtime
        .reminders()
        .create_reminder(
            account(),
            "Water",
            ReminderTrigger::Interval {
                every_minutes: 60,
                anchor,
            },
            true,
        )
        .await
        .unwrap();
    let source = ScheduleSource::reminder(reminder.uuid);

    let first = runtime.schedules().find_pending_for(&account(), source).await.unwrap().unwrap();
    assert_eq!(first.every_minutes, Some(60));

    assert!(runtime.reminders().set_enabled(reminder.uuid, false).await.unwrap());
    assert!(runtime.schedules().find_pending_for(&account(), source).await.unwrap().is_none());

    assert!(runtime.reminders().set_enabled(reminder.uuid, true).await.unwrap());
    let second = runtime.schedules().find_pending_for(&account(), source).await.unwrap().unwrap();
    assert_ne!(second.uuid, first.uuid);
    assert_eq!(second.run_at, anchor);

    // Switching to a fixed trigger replaces the recurring task
    let fixed_at = anchor + Duration::days(1);
    runtime
        .reminders()
        .change_trigger(reminder.uuid, ReminderTrigger::Fixed { at: fixed_at })
        .await
        .unwrap();
    let third = runtime.schedules().find_pending_for(&account(), source).await.unwrap().unwrap();
    assert_eq!(third.every_minutes, None);
    assert_eq!(third.run_at, fixed_at);
    assert_eq!(
        runtime.schedules().get_task(second.uuid).await.unwrap().status,
        ScheduleTaskStatus::Cancelled
    );
}

// ============================================================================
// Commit Gating
// ============================================================================

#[tokio::test]
async fn test_failed_save_publishes_nothing() {
    let runtime = runtime();
    let created = record(&runtime, &[EventKind::GoalCreated]);
    runtime.repositories().goals.fail_next_save();

    let now = Utc::now();
    let err = runtime
        .goals()
        .create_goal(account(), "Launch", Importance::Low, now, now + Duration::days(1))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::RepositoryWriteFailed);
    assert!(created.lock().is_empty());
    assert_eq!(runtime.statistics().get(&account()).total_goals, 0);
    assert!(runtime.schedules().list_tasks(&account()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_outbox_mode_defers_delivery_until_relay() {
    let mut config = Config::default();
    config.outbox.enabled = true;
    let runtime = SyncRuntime::build(&config).unwrap();

    let now = Utc::now();
    let goal = runtime
        .goals()
        .create_goal(account(), "Launch", Importance::Low, now, now + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(runtime.statistics().get(&account()).total_goals, 0);

    // goal.created, then schedule.task.created appended by the schedule handler
    assert_eq!(runtime.flush().await.unwrap(), 2);
    assert_eq!(runtime.statistics().get(&account()).total_goals, 1);
    let source = ScheduleSource::goal_deadline(goal.uuid);
    assert!(runtime.schedules().find_pending_for(&account(), source).await.unwrap().is_some());
}
