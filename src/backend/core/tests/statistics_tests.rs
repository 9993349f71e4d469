//! Statistics read-model tests: replay through the wire codec, reordering and reconciliation.

use cadence_core::domain::{AccountUuid, Goal, Importance};
use cadence_core::events::{AggregateRoot, EventEnvelope, Projection};
use cadence_core::repository::{InMemoryRepository, Repository};
use cadence_core::statistics::{GoalStatistics, StatisticsReconciler, StatisticsStore};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

fn account() -> AccountUuid {
    AccountUuid::new("acct-1")
}

/// Events for three goals with strictly increasing timestamps, one second apart.
fn history() -> (Vec<Goal>, Vec<EventEnvelope>) {
    let start = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
    let end = start + Duration::days(30);

    let mut finished = Goal::create(account(), "Finish thesis", Importance::High, start, end).unwrap();
    finished.add_key_result("Chapters", 5.0, 4.0).unwrap();
    let chapters = finished.key_results[0].uuid;
    finished
        .adjust_key_result(chapters, 1.0, cadence_core::events::EventId::new())
        .unwrap();
    finished.complete().unwrap();

    let mut shelved = Goal::create(account(), "Learn cello", Importance::Low, start, end).unwrap();
    shelved.archive().unwrap();

    let mut ongoing = Goal::create(account(), "Run", Importance::Medium, start, end).unwrap();
    ongoing.add_key_result("Kilometres", 100.0, 10.0).unwrap();

    let mut events = Vec::new();
    for goal in [&mut finished, &mut shelved, &mut ongoing] {
        events.extend(goal.take_pending_events());
    }
    for (i, envelope) in events.iter_mut().enumerate() {
        let ts = start + Duration::seconds(i as i64);
        envelope.metadata = envelope.metadata.clone().with_timestamp(ts);
    }
    (vec![finished, shelved, ongoing], events)
}

fn assert_same_counters(a: &GoalStatistics, b: &GoalStatistics) {
    assert_eq!(a.total_goals, b.total_goals);
    assert_eq!(a.active_goals, b.active_goals);
    assert_eq!(a.completed_goals, b.completed_goals);
    assert_eq!(a.archived_goals, b.archived_goals);
    assert_eq!(a.goals_by_importance, b.goals_by_importance);
    assert_eq!(a.total_key_results, b.total_key_results);
    assert_eq!(a.completed_key_results, b.completed_key_results);
}

#[test]
fn test_ndjson_replay_matches_in_process_fold() {
    let (_, events) = history();

    let ndjson: String = events
        .iter()
        .map(|e| e.to_json_string().unwrap() + "\n")
        .collect();
    let decoded: Vec<EventEnvelope> = ndjson
        .lines()
        .map(|line| EventEnvelope::from_json_str(line).unwrap())
        .collect();

    let mut direct = GoalStatistics::create_empty(account());
    direct.apply_all(&events);
    let mut replayed = GoalStatistics::create_empty(account());
    replayed.apply_all(&decoded);

    assert_same_counters(&direct, &replayed);
    assert_eq!(direct.total_goals, 3);
    assert_eq!(direct.active_goals, 1);
    assert_eq!(direct.completed_goals, 1);
    assert_eq!(direct.archived_goals, 1);
    assert_eq!(direct.total_key_results, 2);
    assert_eq!(direct.completed_key_results, 1);
}

#[test]
fn test_reordered_delivery_converges() {
    let (_, events) = history();

    let mut forward = GoalStatistics::create_empty(account());
    forward.apply_all(&events);

    let mut reversed = GoalStatistics::create_empty(account());
    reversed.apply_all(events.iter().rev());

    let mut doubled = GoalStatistics::create_empty(account());
    doubled.apply_all(events.iter().chain(events.iter().rev()));

    assert_same_counters(&forward, &reversed);
    assert_same_counters(&forward, &doubled);
    assert_eq!(forward.last_event_at, reversed.last_event_at);
}

#[test]
fn test_same_millisecond_events_converge_in_any_order() {
    let (_, mut events) = history();
    let instant = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
    for envelope in events.iter_mut() {
        envelope.metadata = envelope.metadata.clone().with_timestamp(instant);
    }
    let decoded: Vec<EventEnvelope> = events
        .iter()
        .map(|e| EventEnvelope::from_json_str(&e.to_json_string().unwrap()).unwrap())
        .collect();

    let mut forward = GoalStatistics::create_empty(account());
    forward.apply_all(&decoded);
    let mut reversed = GoalStatistics::create_empty(account());
    reversed.apply_all(decoded.iter().rev());

    assert_same_counters(&forward, &reversed);
    assert_eq!(reversed.completed_goals, 1);
    assert_eq!(reversed.archived_goals, 1);
    assert_eq!(reversed.active_goals, 1);
    assert_eq!(reversed.completed_key_results, 1);
}

#[tokio::test]
async fn test_reconciler_agrees_with_fold() {
    let (goals, events) = history();
    let repo = Arc::new(InMemoryRepository::<Goal>::new());
    for goal in &goals {
        repo.save(goal).await.unwrap();
    }

    let store = StatisticsStore::new(1024);
    for envelope in &events {
        store.apply(envelope);
    }
    let folded = store.get(&account());

    let reconciler = StatisticsReconciler::new(repo, store.clone());
    assert_eq!(reconciler.reconcile().await.unwrap(), 0);
    assert_same_counters(&folded, &store.get(&account()));

    // Events already folded stay de-duplicated after a recompute
    for envelope in &events {
        store.apply(envelope);
    }
    assert_same_counters(&folded, &store.get(&account()));
}
