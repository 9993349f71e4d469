//! Event infrastructure shared by every module.
//!
//! - **`registry`**: The single declaration of every event kind (`EventKind`, `DomainEvent`).
//! - **`payloads`**: Plain-data payload structs, one per kind.
//! - **`event`**: Event ids, metadata and the `EventEnvelope` wire shape.
//! - **`aggregate`**: `AggregateRoot` with its pending event buffer, and the `Projection` fold trait.
//! - **`dispatcher`**: In-process publish/subscribe with failure isolation.
//! - **`outbox`**: Optional outbox and relay between commit and dispatch.

pub mod aggregate;
pub mod dispatcher;
pub mod event;
pub mod outbox;
pub mod payloads;
pub mod registry;

pub use aggregate::*;
pub use dispatcher::*;
pub use event::*;
pub use outbox::*;
pub use payloads::*;
pub use registry::{DomainEvent, EventKind};
