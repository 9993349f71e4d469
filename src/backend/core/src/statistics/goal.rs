//! Per-account goal statistics folded from goal events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use uuid::Uuid;

use crate::domain::{AccountUuid, Goal, GoalStatus, Importance, KeyResultSnapshot};
use crate::events::payloads::{
    GoalArchived, GoalCompleted, GoalCreated, GoalDeleted, KeyResultAdded, KeyResultProgressed,
};
use crate::events::{DomainEvent, EventEnvelope, EventId, Projection};

/// Default number of applied event ids remembered for de-duplication.
pub const DEFAULT_DEDUPE_WINDOW: usize = 1024;

// =============================================================================
// Applied Event Window
// =============================================================================

/// Bounded FIFO set of event ids already folded in.
#[derive(Debug, Clone, PartialEq)]
struct AppliedWindow {
    capacity: usize,
    order: VecDeque<EventId>,
    ids: HashSet<EventId>,
}

impl AppliedWindow {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    fn contains(&self, id: EventId) -> bool {
        self.ids.contains(&id)
    }

    fn insert(&mut self, id: EventId) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }
}

// =============================================================================
// Tracked Goal
// =============================================================================

/// Orders changes to one goal: event time, then the goal's stream version.
///
/// Millisecond timestamps can tie; the version breaks the tie in write order.
pub type Stamp = (DateTime<Utc>, u64);

#[derive(Debug, Clone, Copy, PartialEq)]
struct KeyResultMark {
    completed: bool,
    at: Stamp,
}

/// What the accumulator knows about one goal.
#[derive(Debug, Clone, Default, PartialEq)]
struct TrackedGoal {
    /// `goal.created` has been seen
    created: bool,
    importance: Option<Importance>,
    status: Option<GoalStatus>,
    /// Stamp of the event that set `status`
    status_at: Option<Stamp>,
    /// Tombstone; later events for the goal are ignored
    deleted: bool,
    key_results: HashMap<Uuid, KeyResultMark>,
}

impl TrackedGoal {
    fn counts(&self) -> bool {
        self.created && !self.deleted
    }

    /// Set the status unless a newer status change is already known.
    fn set_status(&mut self, status: GoalStatus, at: Stamp) -> bool {
        if self.status_at.is_some_and(|known| known > at) {
            return false;
        }
        self.status = Some(status);
        self.status_at = Some(at);
        true
    }

    fn mark_key_result(&mut self, key_result_uuid: Uuid, completed: bool, at: Stamp) -> bool {
        let mark = self
            .key_results
            .entry(key_result_uuid)
            .or_insert(KeyResultMark { completed, at });
        if mark.at > at {
            return false;
        }
        *mark = KeyResultMark { completed, at };
        true
    }

    fn add_key_result(&mut self, snapshot: &KeyResultSnapshot, at: Stamp) {
        self.key_results.entry(snapshot.key_result_uuid).or_insert(KeyResultMark {
            completed: snapshot.is_completed(),
            at,
        });
    }
}

// =============================================================================
// Goal Statistics
// =============================================================================

/// What folding one envelope did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    Applied,
    /// Already folded in (same event id)
    Duplicate,
    /// Older than the state already known for the goal
    Stale,
    /// The goal was deleted
    Tombstoned,
    /// Another account, or a kind statistics do not track
    Ignored,
}

impl FoldOutcome {
    /// Metric label for skipped events.
    pub fn skip_reason(&self) -> Option<&'static str> {
        match self {
            FoldOutcome::Duplicate => Some("duplicate"),
            FoldOutcome::Stale => Some("stale"),
            FoldOutcome::Tombstoned => Some("tombstoned"),
            FoldOutcome::Applied | FoldOutcome::Ignored => None,
        }
    }
}

/// Running goal counters for one account.
///
/// Folding is pure: the result depends only on the current state and the
/// envelope. Events are de-duplicated by event id within a bounded window, and
/// per-goal status is ordered by [`Stamp`], so reordered or replayed deliveries
/// converge on the same counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalStatistics {
    pub account_uuid: AccountUuid,
    pub total_goals: u64,
    pub active_goals: u64,
    pub completed_goals: u64,
    pub archived_goals: u64,
    pub goals_by_importance: BTreeMap<Importance, u64>,
    pub total_key_results: u64,
    pub completed_key_results: u64,
    pub last_event_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    goals: HashMap<Uuid, TrackedGoal>,
    #[serde(skip, default = "default_window")]
    applied: AppliedWindow,
}

fn default_window() -> AppliedWindow {
    AppliedWindow::new(DEFAULT_DEDUPE_WINDOW)
}

impl GoalStatistics {
    /// Zero-valued statistics for `account_uuid`.
    pub fn create_empty(account_uuid: AccountUuid) -> Self {
        Self::with_dedupe_window(account_uuid, DEFAULT_DEDUPE_WINDOW)
    }

    pub fn with_dedupe_window(account_uuid: AccountUuid, dedupe_window: usize) -> Self {
        Self {
            account_uuid,
            total_goals: 0,
            active_goals: 0,
            completed_goals: 0,
            archived_goals: 0,
            goals_by_importance: BTreeMap::new(),
            total_key_results: 0,
            completed_key_results: 0,
            last_event_at: None,
            goals: HashMap::new(),
            applied: AppliedWindow::new(dedupe_window),
        }
    }

    /// Rebuild from the authoritative goal store.
    ///
    /// `history` supplies the de-duplication window, tombstones and last event
    /// time, so events already folded into the previous state stay ignored.
    pub fn recompute(account_uuid: AccountUuid, goals: &[Goal], history: Option<&GoalStatistics>) -> Self {
        let mut stats = match history {
            Some(previous) => Self {
                applied: previous.applied.clone(),
                last_event_at: previous.last_event_at,
                ..Self::create_empty(account_uuid.clone())
            },
            None => Self::create_empty(account_uuid.clone()),
        };

        if let Some(previous) = history {
            for (uuid, tracked) in &previous.goals {
                if tracked.deleted {
                    stats.goals.insert(*uuid, tracked.clone());
                }
            }
        }

        for goal in goals.iter().filter(|g| g.account_uuid == account_uuid && !g.is_deleted()) {
            let status_at = match goal.status {
                GoalStatus::Active => goal.created_at,
                GoalStatus::Completed => goal.completed_at.unwrap_or(goal.created_at),
                GoalStatus::Archived => goal.archived_at.unwrap_or(goal.created_at),
            };
            // The stored version covers every event already reflected in the goal
            let version = goal.version;
            let tracked = TrackedGoal {
                created: true,
                importance: Some(goal.importance),
                status: Some(goal.status),
                status_at: Some((status_at, version)),
                deleted: false,
                key_results: goal
                    .key_results
                    .iter()
                    .map(|kr| {
                        let at = kr.records.last().map(|r| r.recorded_at).unwrap_or(goal.created_at);
                        let mark = KeyResultMark {
                            completed: kr.is_completed(),
                            at: (at, version),
                        };
                        (kr.uuid, mark)
                    })
                    .collect(),
            };
            stats.count(&tracked);
            stats.goals.insert(goal.uuid, tracked);
        }
        stats
    }

    /// Fold one event into a copy of `self`.
    pub fn on_event(&self, envelope: &EventEnvelope) -> Self {
        let mut next = self.clone();
        next.apply(envelope);
        next
    }

    /// Whether the event with this id has already been folded in.
    pub fn has_applied(&self, event_id: EventId) -> bool {
        self.applied.contains(event_id)
    }

    pub fn count_for(&self, importance: Importance) -> u64 {
        self.goals_by_importance.get(&importance).copied().unwrap_or(0)
    }

    // =========================================================================
    // Per-kind folds
    // =========================================================================

    pub fn on_goal_created(&mut self, event: &GoalCreated, at: Stamp) -> FoldOutcome {
        self.update_goal(event.goal_uuid, |goal| {
            goal.created = true;
            goal.importance = Some(event.importance);
            for snapshot in &event.key_results {
                goal.add_key_result(snapshot, at);
            }
            // A completion seen before creation keeps its newer status
            goal.set_status(GoalStatus::Active, at);
            true
        })
    }

    pub fn on_goal_completed(&mut self, event: &GoalCompleted, at: Stamp) -> FoldOutcome {
        self.update_goal(event.goal_uuid, |goal| goal.set_status(GoalStatus::Completed, at))
    }

    pub fn on_goal_archived(&mut self, event: &GoalArchived, at: Stamp) -> FoldOutcome {
        self.update_goal(event.goal_uuid, |goal| goal.set_status(GoalStatus::Archived, at))
    }

    pub fn on_goal_deleted(&mut self, event: &GoalDeleted) -> FoldOutcome {
        self.update_goal(event.goal_uuid, |goal| {
            goal.deleted = true;
            true
        })
    }

    pub fn on_key_result_added(&mut self, event: &KeyResultAdded, at: Stamp) -> FoldOutcome {
        self.update_goal(event.goal_uuid, |goal| {
            goal.add_key_result(&event.key_result, at);
            true
        })
    }

    pub fn on_key_result_progressed(&mut self, event: &KeyResultProgressed, at: Stamp) -> FoldOutcome {
        self.update_goal(event.goal_uuid, |goal| {
            goal.mark_key_result(event.key_result_uuid, event.new_value >= event.target_value, at)
        })
    }

    /// Retract the goal's contribution, mutate it, then count it again.
    ///
    /// `f` returns `false` when the event was older than what is already known.
    fn update_goal(&mut self, goal_uuid: Uuid, f: impl FnOnce(&mut TrackedGoal) -> bool) -> FoldOutcome {
        let mut goal = self.goals.remove(&goal_uuid).unwrap_or_default();
        if goal.deleted {
            self.goals.insert(goal_uuid, goal);
            return FoldOutcome::Tombstoned;
        }
        self.retract(&goal);
        let fresh = f(&mut goal);
        self.count(&goal);
        self.goals.insert(goal_uuid, goal);
        if fresh {
            FoldOutcome::Applied
        } else {
            FoldOutcome::Stale
        }
    }

    fn count(&mut self, goal: &TrackedGoal) {
        if !goal.counts() {
            return;
        }
        self.total_goals += 1;
        match goal.status.unwrap_or(GoalStatus::Active) {
            GoalStatus::Active => self.active_goals += 1,
            GoalStatus::Completed => self.completed_goals += 1,
            GoalStatus::Archived => self.archived_goals += 1,
        }
        if let Some(importance) = goal.importance {
            *self.goals_by_importance.entry(importance).or_insert(0) += 1;
        }
        self.total_key_results += goal.key_results.len() as u64;
        self.completed_key_results += goal.key_results.values().filter(|kr| kr.completed).count() as u64;
    }

    fn retract(&mut self, goal: &TrackedGoal) {
        if !goal.counts() {
            return;
        }
        self.total_goals -= 1;
        match goal.status.unwrap_or(GoalStatus::Active) {
            GoalStatus::Active => self.active_goals -= 1,
            GoalStatus::Completed => self.completed_goals -= 1,
            GoalStatus::Archived => self.archived_goals -= 1,
        }
        if let Some(importance) = goal.importance {
            if let Some(count) = self.goals_by_importance.get_mut(&importance) {
                *count -= 1;
                if *count == 0 {
                    self.goals_by_importance.remove(&importance);
                }
            }
        }
        self.total_key_results -= goal.key_results.len() as u64;
        self.completed_key_results -= goal.key_results.values().filter(|kr| kr.completed).count() as u64;
    }
}

impl GoalStatistics {
    /// Fold one envelope in place and report what happened.
    pub fn fold(&mut self, envelope: &EventEnvelope) -> FoldOutcome {
        if envelope.account_uuid() != &self.account_uuid {
            return FoldOutcome::Ignored;
        }
        if self.applied.contains(envelope.id()) {
            return FoldOutcome::Duplicate;
        }

        let at = (envelope.timestamp(), envelope.version());
        let outcome = match &envelope.event {
            DomainEvent::GoalCreated(e) => self.on_goal_created(e, at),
            DomainEvent::GoalCompleted(e) => self.on_goal_completed(e, at),
            DomainEvent::GoalArchived(e) => self.on_goal_archived(e, at),
            DomainEvent::GoalDeleted(e) => self.on_goal_deleted(e),
            DomainEvent::KeyResultAdded(e) => self.on_key_result_added(e, at),
            DomainEvent::KeyResultProgressed(e) => self.on_key_result_progressed(e, at),
            DomainEvent::GoalScheduleTimeChanged(_) => FoldOutcome::Applied,
            _ => return FoldOutcome::Ignored,
        };

        self.applied.insert(envelope.id());
        let timestamp = envelope.timestamp();
        if self.last_event_at.map_or(true, |last| timestamp > last) {
            self.last_event_at = Some(timestamp);
        }
        outcome
    }
}

impl Projection for GoalStatistics {
    fn apply(&mut self, envelope: &EventEnvelope) {
        self.fold(envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AggregateRoot;
    use chrono::Duration;

    fn account() -> AccountUuid {
        AccountUuid::new("acct-1")
    }

    fn created(goal_uuid: Uuid, importance: Importance) -> EventEnvelope {
        let now = Utc::now();
        EventEnvelope::new(
            GoalCreated {
                goal_uuid,
                account_uuid: account(),
                title: "Ship it".to_string(),
                importance,
                start_time: now,
                end_time: now + Duration::days(30),
                key_results: vec![],
                created_at: now,
            },
            1,
        )
    }

    fn completed(goal_uuid: Uuid) -> EventEnvelope {
        EventEnvelope::new(
            GoalCompleted {
                goal_uuid,
                account_uuid: account(),
                completed_at: Utc::now(),
            },
            2,
        )
    }

    fn at_offset(mut envelope: EventEnvelope, seconds: i64) -> EventEnvelope {
        let ts = envelope.timestamp() + Duration::seconds(seconds);
        envelope.metadata = envelope.metadata.with_timestamp(ts);
        envelope
    }

    #[test]
    fn test_created_then_completed() {
        let goal = Uuid::new_v4();
        let stats = GoalStatistics::create_empty(account());

        let stats = stats.on_event(&created(goal, Importance::Medium));
        assert_eq!(stats.total_goals, 1);
        assert_eq!(stats.active_goals, 1);
        assert_eq!(stats.count_for(Importance::Medium), 1);

        let stats = stats.on_event(&at_offset(completed(goal), 1));
        assert_eq!(stats.completed_goals, 1);
        assert_eq!(stats.active_goals, 0);
        assert_eq!(stats.total_goals, 1);
    }

    #[test]
    fn test_on_event_is_pure() {
        let goal = Uuid::new_v4();
        let start = GoalStatistics::create_empty(account());
        let event = created(goal, Importance::High);

        assert_eq!(start.on_event(&event), start.on_event(&event));
        assert_eq!(start.total_goals, 0);
    }

    #[test]
    fn test_replayed_completion_counts_once() {
        let goal = Uuid::new_v4();
        let done = at_offset(completed(goal), 1);
        let mut stats = GoalStatistics::create_empty(account());
        stats.apply_all([&created(goal, Importance::Low), &done, &done]);

        assert_eq!(stats.completed_goals, 1);
        assert_eq!(stats.total_goals, 1);
        assert!(stats.has_applied(done.id()));
        assert_eq!(stats.fold(&done), FoldOutcome::Duplicate);
    }

    #[test]
    fn test_stale_status_is_ignored() {
        let goal = Uuid::new_v4();
        let create = created(goal, Importance::Low);
        let done = at_offset(completed(goal), 10);
        let archived = at_offset(
            EventEnvelope::new(
                GoalArchived {
                    goal_uuid: goal,
                    account_uuid: account(),
                    previous_status: GoalStatus::Active,
                    archived_at: Utc::now(),
                },
                3,
            ),
            5,
        );

        let mut stats = GoalStatistics::create_empty(account());
        stats.apply_all([&create, &done]);
        assert_eq!(stats.fold(&archived), FoldOutcome::Stale);
        assert_eq!(stats.completed_goals, 1);
        assert_eq!(stats.archived_goals, 0);
    }

    #[test]
    fn test_tied_timestamps_ordered_by_version() {
        let goal = Uuid::new_v4();
        let create = created(goal, Importance::Low);
        let mut done = completed(goal);
        done.metadata = done.metadata.with_timestamp(create.timestamp());

        let mut in_order = GoalStatistics::create_empty(account());
        in_order.apply_all([&create, &done]);
        let mut reversed = GoalStatistics::create_empty(account());
        reversed.apply_all([&done, &create]);

        for stats in [&in_order, &reversed] {
            assert_eq!(stats.completed_goals, 1);
            assert_eq!(stats.active_goals, 0);
            assert_eq!(stats.total_goals, 1);
        }
    }

    #[test]
    fn test_completed_before_created_converges() {
        let goal = Uuid::new_v4();
        let create = created(goal, Importance::Low);
        let done = at_offset(completed(goal), 5);

        let mut stats = GoalStatistics::create_empty(account());
        stats.apply(&done);
        assert_eq!(stats.total_goals, 0);
        stats.apply(&create);

        assert_eq!(stats.total_goals, 1);
        assert_eq!(stats.completed_goals, 1);
        assert_eq!(stats.active_goals, 0);
    }

    #[test]
    fn test_deleted_goal_is_tombstoned() {
        let goal = Uuid::new_v4();
        let create = created(goal, Importance::Low);
        let deleted = at_offset(
            EventEnvelope::new(
                GoalDeleted {
                    goal_uuid: goal,
                    account_uuid: account(),
                    previous_status: GoalStatus::Active,
                    deleted_at: Utc::now(),
                },
                2,
            ),
            1,
        );

        let mut stats = GoalStatistics::create_empty(account());
        stats.apply_all([&create, &deleted]);
        assert_eq!(stats.total_goals, 0);
        assert!(stats.goals_by_importance.is_empty());

        assert_eq!(stats.fold(&at_offset(completed(goal), 2)), FoldOutcome::Tombstoned);
        assert_eq!(stats.completed_goals, 0);
        assert_eq!(stats.total_goals, 0);
    }

    #[test]
    fn test_other_accounts_are_ignored() {
        let stats = GoalStatistics::create_empty(AccountUuid::new("someone-else"));
        let stats = stats.on_event(&created(Uuid::new_v4(), Importance::Low));
        assert_eq!(stats.total_goals, 0);
    }

    #[test]
    fn test_dedupe_window_is_bounded() {
        let mut window = AppliedWindow::new(2);
        let (a, b, c) = (EventId::new(), EventId::new(), EventId::new());
        window.insert(a);
        window.insert(b);
        window.insert(c);
        assert!(!window.contains(a));
        assert!(window.contains(b));
        assert!(window.contains(c));
    }

    #[test]
    fn test_recompute_matches_fold() {
        let start = Utc::now();
        let mut goal = Goal::create(account(), "Read", Importance::High, start, start + Duration::days(7)).unwrap();
        goal.add_key_result("Books", 3.0, 3.0).unwrap();
        goal.complete().unwrap();
        let events = goal.take_pending_events();

        let mut folded = GoalStatistics::create_empty(account());
        folded.apply_all(&events);

        let recomputed = GoalStatistics::recompute(account(), std::slice::from_ref(&goal), None);
        assert_eq!(recomputed.total_goals, folded.total_goals);
        assert_eq!(recomputed.completed_goals, folded.completed_goals);
        assert_eq!(recomputed.total_key_results, 1);
        assert_eq!(recomputed.completed_key_results, folded.completed_key_results);
    }
}
