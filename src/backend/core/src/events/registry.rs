//! The event type registry.
//!
//! Every event kind is declared exactly once in the [`event_registry!`] invocation
//! below. The macro generates the closed [`EventKind`] enum used as the subscription
//! key, the [`DomainEvent`] tagged union that travels inside envelopes, and the
//! [`EventPayload`] impl binding each payload type to its kind.
//!
//! Registration is checked at build time: a duplicate variant or payload type fails
//! to compile (conflicting items / `From` impls), and a duplicate or mis-namespaced
//! event name trips the `const` assertion at the bottom of the expansion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::AccountUuid;
use crate::error::CadenceError;

use super::event::{EventPayload, Module, StreamId};
use super::payloads::*;

// =============================================================================
// Build-time checks
// =============================================================================

const fn str_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// `name` must start with `"{module}."` followed by at least one character.
const fn is_namespaced(name: &str, module: Module) -> bool {
    let name = name.as_bytes();
    let prefix = module.as_str().as_bytes();
    if name.len() <= prefix.len() + 1 {
        return false;
    }
    let mut i = 0;
    while i < prefix.len() {
        if name[i] != prefix[i] {
            return false;
        }
        i += 1;
    }
    name[prefix.len()] == b'.'
}

const fn names_are_unique(names: &[&str]) -> bool {
    let mut i = 0;
    while i < names.len() {
        let mut j = i + 1;
        while j < names.len() {
            if str_eq(names[i], names[j]) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

// =============================================================================
// Registry Macro
// =============================================================================

macro_rules! event_registry {
    ($(
        $variant:ident($payload:ident) => $name:literal, $module:ident, $key:ident, $description:literal;
    )+) => {
        /// Closed set of event kinds. Used as the dispatcher's subscription key.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum EventKind {
            $(
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl EventKind {
            /// Every registered kind, in declaration order.
            pub const ALL: &'static [EventKind] = &[$(EventKind::$variant),+];

            /// Namespaced `{module}.{entity}.{action}` name.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(EventKind::$variant => $name,)+
                }
            }

            /// Module that owns (emits) this kind.
            pub const fn module(&self) -> Module {
                match self {
                    $(EventKind::$variant => Module::$module,)+
                }
            }

            pub const fn description(&self) -> &'static str {
                match self {
                    $(EventKind::$variant => $description,)+
                }
            }
        }

        /// Every domain event, adjacently tagged on the wire as
        /// `{"eventType": "<name>", "payload": {...}}`.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "eventType", content = "payload")]
        pub enum DomainEvent {
            $(
                #[serde(rename = $name)]
                $variant($payload),
            )+
        }

        impl DomainEvent {
            pub const fn kind(&self) -> EventKind {
                match self {
                    $(DomainEvent::$variant(_) => EventKind::$variant,)+
                }
            }

            pub fn stream_id(&self) -> StreamId {
                match self {
                    $(DomainEvent::$variant(e) => EventPayload::stream_id(e),)+
                }
            }

            pub fn account_uuid(&self) -> &AccountUuid {
                match self {
                    $(DomainEvent::$variant(e) => EventPayload::account_uuid(e),)+
                }
            }
        }

        $(
            impl EventPayload for $payload {
                const KIND: EventKind = EventKind::$variant;

                fn stream_id(&self) -> StreamId {
                    StreamId::of(Module::$module, self.$key)
                }

                fn account_uuid(&self) -> &AccountUuid {
                    &self.account_uuid
                }

                #[allow(unreachable_patterns)]
                fn from_event(event: &DomainEvent) -> Option<&Self> {
                    match event {
                        DomainEvent::$variant(e) => Some(e),
                        _ => None,
                    }
                }
            }

            impl From<$payload> for DomainEvent {
                fn from(payload: $payload) -> Self {
                    DomainEvent::$variant(payload)
                }
            }
        )+

        const _: () = {
            assert!(
                names_are_unique(&[$($name),+]),
                "duplicate event type name in registry"
            );
            $(
                assert!(
                    is_namespaced($name, Module::$module),
                    concat!("event type `", $name, "` is not namespaced by its module")
                );
            )+
        };
    };
}

event_registry! {
    // ─── goal ───────────────────────────────────────────────────────────────
    GoalCreated(GoalCreated)
        => "goal.created", Goal, goal_uuid, "A goal was created";
    GoalScheduleTimeChanged(GoalScheduleTimeChanged)
        => "goal.schedule_time_changed", Goal, goal_uuid, "A goal's start or end time changed";
    GoalCompleted(GoalCompleted)
        => "goal.completed", Goal, goal_uuid, "A goal was completed";
    GoalArchived(GoalArchived)
        => "goal.archived", Goal, goal_uuid, "A goal was archived";
    GoalDeleted(GoalDeleted)
        => "goal.deleted", Goal, goal_uuid, "A goal was deleted";
    KeyResultAdded(KeyResultAdded)
        => "goal.key_result.added", Goal, goal_uuid, "A key result was added to a goal";
    KeyResultProgressed(KeyResultProgressed)
        => "goal.key_result.progressed", Goal, goal_uuid, "A key result's current value changed";

    // ─── task ───────────────────────────────────────────────────────────────
    TaskTemplateCreated(TaskTemplateCreated)
        => "task.template.created", Task, template_uuid, "A task template was created";
    TaskTemplateUpdated(TaskTemplateUpdated)
        => "task.template.updated", Task, template_uuid, "A task template's title or goal binding changed";
    TaskTemplateDeleted(TaskTemplateDeleted)
        => "task.template.deleted", Task, template_uuid, "A task template was deleted";
    TaskInstanceCreated(TaskInstanceCreated)
        => "task.instance.created", Task, instance_uuid, "A task instance was generated from a template";
    TaskInstanceCompleted(TaskInstanceCompleted)
        => "task.instance.completed", Task, instance_uuid, "A task instance was completed";
    TaskInstanceSkipped(TaskInstanceSkipped)
        => "task.instance.skipped", Task, instance_uuid, "A task instance was skipped";

    // ─── reminder ───────────────────────────────────────────────────────────
    ReminderTemplateCreated(ReminderTemplateCreated)
        => "reminder.template.created", Reminder, template_uuid, "A reminder template was created";
    ReminderTriggerChanged(ReminderTriggerChanged)
        => "reminder.template.trigger_changed", Reminder, template_uuid, "A reminder's trigger changed";
    ReminderToggled(ReminderToggled)
        => "reminder.template.toggled", Reminder, template_uuid, "A reminder was enabled or disabled";
    ReminderTemplateDeleted(ReminderTemplateDeleted)
        => "reminder.template.deleted", Reminder, template_uuid, "A reminder template was deleted";
    ReminderTriggered(ReminderTriggered)
        => "reminder.triggered", Reminder, template_uuid, "A reminder fired";

    // ─── schedule ───────────────────────────────────────────────────────────
    ScheduleTaskCreated(ScheduleTaskCreated)
        => "schedule.task.created", Schedule, schedule_task_uuid, "A schedule task was created";
    ScheduleTaskRescheduled(ScheduleTaskRescheduled)
        => "schedule.task.rescheduled", Schedule, schedule_task_uuid, "A schedule task's run time changed";
    ScheduleTaskCancelled(ScheduleTaskCancelled)
        => "schedule.task.cancelled", Schedule, schedule_task_uuid, "A schedule task was cancelled";
    ScheduleTaskFired(ScheduleTaskFired)
        => "schedule.task.fired", Schedule, schedule_task_uuid, "A schedule task came due and fired";

    // ─── notification ───────────────────────────────────────────────────────
    NotificationCreated(NotificationCreated)
        => "notification.created", Notification, notification_uuid, "A user notification was created";
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CadenceError::unknown_event_type(s))
    }
}

impl EventKind {
    /// Kinds owned by `module`.
    pub fn for_module(module: Module) -> impl Iterator<Item = EventKind> {
        EventKind::ALL
            .iter()
            .copied()
            .filter(move |kind| kind.module() == module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique_and_namespaced() {
        let names: HashSet<_> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), EventKind::ALL.len());

        for kind in EventKind::ALL {
            let prefix = format!("{}.", kind.module().as_str());
            assert!(kind.as_str().starts_with(&prefix), "{}", kind);
        }
    }

    #[test]
    fn test_from_str_round_trips() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_from_str_unknown() {
        let err = "goal.exploded".parse::<EventKind>().unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::UnknownEventType);
    }

    #[test]
    fn test_kind_serializes_as_name() {
        let json = serde_json::to_string(&EventKind::KeyResultProgressed).unwrap();
        assert_eq!(json, "\"goal.key_result.progressed\"");
    }

    #[test]
    fn test_every_module_owns_kinds() {
        for module in Module::ALL {
            assert!(EventKind::for_module(module).count() > 0, "{}", module);
        }
        assert_eq!(EventKind::for_module(Module::Notification).count(), 1);
    }

    #[test]
    fn test_build_time_checks() {
        assert!(names_are_unique(&["goal.a", "goal.b"]));
        assert!(!names_are_unique(&["goal.a", "task.b", "goal.a"]));
        assert!(is_namespaced("goal.created", Module::Goal));
        assert!(!is_namespaced("goalcreated", Module::Goal));
        assert!(!is_namespaced("task.created", Module::Goal));
        assert!(!is_namespaced("goal.", Module::Goal));
    }
}
