//! Event identity, metadata and the unified envelope.
//!
//! This module provides:
//! - `EventId` / `StreamId` identifiers
//! - `EventPayload`, implemented for every registered payload by the registry
//! - `EventMetadata` and `EventEnvelope`, the shape every event travels in

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::AccountUuid;
use crate::error::Result;

use super::registry::{DomainEvent, EventKind};

// =============================================================================
// Event IDs
// =============================================================================

/// Unique identifier for an event. Also the de-duplication key for consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning module of an event kind or aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Goal,
    Task,
    Reminder,
    Schedule,
    Notification,
}

impl Module {
    pub const ALL: [Module; 5] = [
        Module::Goal,
        Module::Task,
        Module::Reminder,
        Module::Schedule,
        Module::Notification,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Module::Goal => "goal",
            Module::Task => "task",
            Module::Reminder => "reminder",
            Module::Schedule => "schedule",
            Module::Notification => "notification",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identifier for a stream (one aggregate instance).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Stream of the aggregate `uuid` owned by `module`, e.g. `goal-<uuid>`.
    pub fn of(module: Module, uuid: Uuid) -> Self {
        Self(format!("{}-{}", module.as_str(), uuid))
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Event Payload Trait
// =============================================================================

/// A registered event payload.
///
/// Implemented by the registry for every payload type; each payload type maps to
/// exactly one [`EventKind`].
pub trait EventPayload:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + Into<DomainEvent> + 'static
{
    /// The kind this payload is registered under.
    const KIND: EventKind;

    /// Stream of the aggregate that produced the event.
    fn stream_id(&self) -> StreamId;

    /// Owning account.
    fn account_uuid(&self) -> &AccountUuid;

    /// Borrow the payload out of a `DomainEvent` of the matching kind.
    fn from_event(event: &DomainEvent) -> Option<&Self>;
}

// =============================================================================
// Event Metadata
// =============================================================================

/// Metadata associated with an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    /// Unique event identifier
    pub event_id: EventId,

    /// Stream/aggregate this event belongs to
    pub stream_id: StreamId,

    /// Aggregate version after this event was recorded
    pub version: u64,

    /// When the event was created. Set once.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Correlation ID shared by every event of one causal chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// The event that caused this event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<EventId>,

    /// User or component that triggered this event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,

    /// Free-form tracing context. Handlers never depend on it.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
}

impl EventMetadata {
    /// Create new metadata for an event.
    pub fn new(stream_id: StreamId, version: u64) -> Self {
        Self {
            event_id: EventId::new(),
            stream_id,
            version,
            timestamp: Utc::now(),
            correlation_id: None,
            causation_id: None,
            actor_id: None,
            context: serde_json::Value::Null,
        }
    }

    /// Set the correlation ID.
    pub fn with_correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set the causation ID.
    pub fn with_causation(mut self, id: EventId) -> Self {
        self.causation_id = Some(id);
        self
    }

    /// Set the actor ID.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor_id = Some(actor.into());
        self
    }

    /// Set additional context.
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    /// Override the creation time (replays, imports).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// =============================================================================
// Event Envelope
// =============================================================================

/// An event wrapped with its metadata. Immutable once released.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The event, tagged as `{"eventType": ..., "payload": ...}`
    pub event: DomainEvent,

    /// Event metadata
    pub metadata: EventMetadata,
}

impl EventEnvelope {
    /// Create a new envelope for an event.
    pub fn new(event: impl Into<DomainEvent>, version: u64) -> Self {
        let event = event.into();
        let metadata = EventMetadata::new(event.stream_id(), version);
        Self { event, metadata }
    }

    /// Create with custom metadata.
    pub fn with_metadata(event: impl Into<DomainEvent>, metadata: EventMetadata) -> Self {
        Self {
            event: event.into(),
            metadata,
        }
    }

    /// Mark this envelope as caused by `parent`, inheriting its correlation.
    pub fn caused_by(mut self, parent: &EventEnvelope) -> Self {
        self.metadata.causation_id = Some(parent.id());
        self.metadata.correlation_id = Some(
            parent
                .metadata
                .correlation_id
                .clone()
                .unwrap_or_else(|| parent.id().to_string()),
        );
        self
    }

    /// Get the event ID.
    pub fn id(&self) -> EventId {
        self.metadata.event_id
    }

    /// Get the event kind.
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    /// Get the namespaced event type name.
    pub fn event_type(&self) -> &'static str {
        self.event.kind().as_str()
    }

    /// Get the stream ID.
    pub fn stream_id(&self) -> &StreamId {
        &self.metadata.stream_id
    }

    /// Get the version.
    pub fn version(&self) -> u64 {
        self.metadata.version
    }

    /// Get the timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.metadata.timestamp
    }

    /// Get the owning account.
    pub fn account_uuid(&self) -> &AccountUuid {
        self.event.account_uuid()
    }

    /// Borrow the typed payload if this envelope carries a `P`.
    pub fn payload<P: EventPayload>(&self) -> Option<&P> {
        P::from_event(&self.event)
    }

    /// Serialize to a JSON value.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Serialize for an out-of-process channel (IPC, SSE, NDJSON).
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an envelope received from an out-of-process channel.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
