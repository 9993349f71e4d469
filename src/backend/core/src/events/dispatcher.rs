//! In-process event dispatcher.
//!
//! Handlers subscribe to one or more [`EventKind`]s. Publishing an envelope runs
//! every handler subscribed to its kind at the moment of the call; handler errors
//! and panics are isolated, logged, counted and returned in the [`PublishReport`],
//! never propagated to the publisher or to sibling handlers.
//!
//! The subscription table sits behind a `parking_lot::RwLock`. Publishing clones
//! the handler list for one kind and releases the lock before any handler runs,
//! so handlers may subscribe, unsubscribe or publish follow-up events freely.

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::error::{CadenceError, ErrorCode, Result};
use crate::telemetry::metrics::DispatchMetrics;

use super::event::{EventEnvelope, EventId};
use super::registry::EventKind;

// =============================================================================
// Handler Contract
// =============================================================================

/// Error returned by an event handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A domain operation inside the handler failed.
    #[error(transparent)]
    Domain(#[from] CadenceError),

    /// The handler panicked. Only produced by the dispatcher.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl HandlerError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

pub type HandlerResult = std::result::Result<(), HandlerError>;

/// A reaction to published events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable name used in logs, metrics and failure reports.
    fn name(&self) -> &str;

    /// Handle one event. Must tolerate being called more than once for the same event.
    async fn handle(&self, envelope: &EventEnvelope) -> HandlerResult;
}

struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(EventEnvelope) -> BoxFuture<'static, HandlerResult> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: &EventEnvelope) -> HandlerResult {
        (self.f)(envelope.clone()).await
    }
}

/// Build a handler from a closure. The closure receives an owned envelope.
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f: move |envelope: EventEnvelope| f(envelope).boxed(),
    })
}

// =============================================================================
// Reports
// =============================================================================

/// How the handlers of a single event are driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOut {
    /// All handlers are polled together; completion order is unspecified.
    #[default]
    Concurrent,
    /// Handlers run one after another in subscription order.
    Sequential,
}

/// A handler that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerFailure {
    pub handler: String,
    pub event_id: EventId,
    pub event_type: &'static str,
    pub error: String,
    pub panicked: bool,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed on {} ({}): {}",
            self.handler, self.event_type, self.event_id, self.error
        )
    }
}

/// Outcome of publishing one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishReport {
    pub event_id: EventId,
    pub event_type: &'static str,
    pub handlers_invoked: usize,
    pub failures: Vec<HandlerFailure>,
}

impl PublishReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of publishing a batch, one report per event in publish order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub reports: Vec<PublishReport>,
}

impl BatchReport {
    pub fn events_published(&self) -> usize {
        self.reports.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &HandlerFailure> {
        self.reports.iter().flat_map(|r| r.failures.iter())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn is_success(&self) -> bool {
        self.reports.iter().all(PublishReport::is_success)
    }
}

// =============================================================================
// Event Sink
// =============================================================================

/// Destination for committed event batches: the dispatcher itself, a weak
/// handle to it, or the outbox.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver `batch` in order.
    async fn deliver(&self, batch: Vec<EventEnvelope>) -> Result<BatchReport>;
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Opaque handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

/// Dispatcher behavior.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherOptions {
    pub fan_out: FanOut,
    pub catch_panics: bool,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            fan_out: FanOut::Concurrent,
            catch_panics: true,
        }
    }
}

impl From<&crate::config::DispatcherConfig> for DispatcherOptions {
    fn from(config: &crate::config::DispatcherConfig) -> Self {
        Self {
            fan_out: config.fan_out,
            catch_panics: config.catch_panics,
        }
    }
}

struct DispatcherInner {
    subscriptions: RwLock<HashMap<EventKind, Vec<Subscription>>>,
    next_id: AtomicU64,
    options: DispatcherOptions,
}

/// The in-process publish/subscribe hub. Cheap to clone.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("options", &self.inner.options)
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::with_options(DispatcherOptions::default())
    }

    pub fn with_options(options: DispatcherOptions) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                subscriptions: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                options,
            }),
        }
    }

    pub fn options(&self) -> DispatcherOptions {
        self.inner.options
    }

    /// A non-owning handle, for handlers that publish follow-up events.
    pub fn downgrade(&self) -> WeakDispatcher {
        WeakDispatcher {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe `handler` to `kind`.
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(handler = handler.name(), event_type = kind.as_str(), subscription = %id, "Handler subscribed");
        self.inner
            .subscriptions
            .write()
            .entry(kind)
            .or_default()
            .push(Subscription { id, handler });
        DispatchMetrics::set_subscriptions(self.subscription_count());
        id
    }

    /// Subscribe `handler` to every kind in `kinds` under one subscription id.
    pub fn subscribe_many(
        &self,
        kinds: impl IntoIterator<Item = EventKind>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut subscriptions = self.inner.subscriptions.write();
            for kind in kinds {
                debug!(handler = handler.name(), event_type = kind.as_str(), subscription = %id, "Handler subscribed");
                subscriptions.entry(kind).or_default().push(Subscription {
                    id,
                    handler: handler.clone(),
                });
            }
        }
        DispatchMetrics::set_subscriptions(self.subscription_count());
        id
    }

    /// Remove every registration made under `id`. Returns false if none existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut subscriptions = self.inner.subscriptions.write();
            let mut removed = false;
            for list in subscriptions.values_mut() {
                let before = list.len();
                list.retain(|s| s.id != id);
                removed |= list.len() != before;
            }
            subscriptions.retain(|_, list| !list.is_empty());
            removed
        };
        if removed {
            debug!(subscription = %id, "Handler unsubscribed");
            DispatchMetrics::set_subscriptions(self.subscription_count());
        }
        removed
    }

    /// Number of handlers subscribed to `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.inner
            .subscriptions
            .read()
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Total registrations across all kinds.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().values().map(Vec::len).sum()
    }

    fn snapshot(&self, kind: EventKind) -> Vec<Subscription> {
        self.inner
            .subscriptions
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Publish one event to every handler subscribed to its kind.
    #[instrument(
        name = "publish",
        skip(self, envelope),
        fields(event_type = envelope.event_type(), event_id = %envelope.id())
    )]
    pub async fn publish(&self, envelope: &EventEnvelope) -> PublishReport {
        let subscriptions = self.snapshot(envelope.kind());
        DispatchMetrics::event_published(envelope.event_type());

        if subscriptions.is_empty() {
            debug!("No handlers subscribed");
        }

        let failures: Vec<HandlerFailure> = match self.inner.options.fan_out {
            FanOut::Concurrent => join_all(
                subscriptions
                    .iter()
                    .map(|s| self.run_handler(&s.handler, envelope)),
            )
            .await
            .into_iter()
            .flatten()
            .collect(),
            FanOut::Sequential => {
                let mut failures = Vec::new();
                for subscription in &subscriptions {
                    if let Some(failure) = self.run_handler(&subscription.handler, envelope).await {
                        failures.push(failure);
                    }
                }
                failures
            }
        };

        PublishReport {
            event_id: envelope.id(),
            event_type: envelope.event_type(),
            handlers_invoked: subscriptions.len(),
            failures,
        }
    }

    /// Publish a batch, one event at a time, in order.
    pub async fn publish_all(&self, batch: &[EventEnvelope]) -> BatchReport {
        let mut reports = Vec::with_capacity(batch.len());
        for envelope in batch {
            reports.push(self.publish(envelope).await);
        }
        BatchReport { reports }
    }

    async fn run_handler(
        &self,
        handler: &Arc<dyn EventHandler>,
        envelope: &EventEnvelope,
    ) -> Option<HandlerFailure> {
        let start = Instant::now();
        let event_type = envelope.event_type();

        let result = if self.inner.options.catch_panics {
            match AssertUnwindSafe(handler.handle(envelope)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
            }
        } else {
            handler.handle(envelope).await
        };

        DispatchMetrics::handler_completed(handler.name(), event_type, start.elapsed());

        match result {
            Ok(()) => None,
            Err(err) => {
                let panicked = matches!(err, HandlerError::Panicked(_));
                error!(
                    handler = handler.name(),
                    event_type,
                    event_id = %envelope.id(),
                    panicked,
                    error = %err,
                    "Event handler failed"
                );
                DispatchMetrics::handler_failed(handler.name(), event_type, panicked);
                Some(HandlerFailure {
                    handler: handler.name().to_string(),
                    event_id: envelope.id(),
                    event_type,
                    error: err.to_string(),
                    panicked,
                })
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[async_trait]
impl EventSink for EventDispatcher {
    async fn deliver(&self, batch: Vec<EventEnvelope>) -> Result<BatchReport> {
        Ok(self.publish_all(&batch).await)
    }
}

/// Non-owning dispatcher handle. Delivery fails once the dispatcher is dropped.
#[derive(Clone)]
pub struct WeakDispatcher {
    inner: Weak<DispatcherInner>,
}

impl WeakDispatcher {
    pub fn upgrade(&self) -> Option<EventDispatcher> {
        self.inner.upgrade().map(|inner| EventDispatcher { inner })
    }
}

impl fmt::Debug for WeakDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDispatcher")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[async_trait]
impl EventSink for WeakDispatcher {
    async fn deliver(&self, batch: Vec<EventEnvelope>) -> Result<BatchReport> {
        let dispatcher = self.upgrade().ok_or_else(|| {
            CadenceError::new(ErrorCode::DispatcherUnavailable, "Event dispatcher has shut down")
        })?;
        Ok(dispatcher.publish_all(&batch).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountUuid;
    use crate::events::payloads::{GoalCompleted, GoalDeleted};
    use crate::domain::GoalStatus;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    fn completed() -> EventEnvelope {
        EventEnvelope::new(
            GoalCompleted {
                goal_uuid: Uuid::new_v4(),
                account_uuid: AccountUuid::new("acct"),
                completed_at: Utc::now(),
            },
            2,
        )
    }

    fn counting(name: &str, counter: Arc<AtomicUsize>) -> Arc<dyn EventHandler> {
        handler_fn(name, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, HandlerError>(())
            }
        })
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribed_handlers_only() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        dispatcher.subscribe(EventKind::GoalCompleted, counting("a", hits.clone()));
        dispatcher.subscribe(EventKind::GoalCompleted, counting("b", hits.clone()));
        dispatcher.subscribe(EventKind::GoalCreated, counting("c", hits.clone()));

        let report = dispatcher.publish(&completed()).await;
        assert_eq!(report.handlers_invoked, 2);
        assert!(report.is_success());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_publish_without_handlers() {
        let dispatcher = EventDispatcher::new();
        let report = dispatcher.publish(&completed()).await;
        assert_eq!(report.handlers_invoked, 0);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let id = dispatcher.subscribe_many(
            [EventKind::GoalCompleted, EventKind::GoalDeleted],
            counting("a", hits.clone()),
        );
        assert_eq!(dispatcher.handler_count(EventKind::GoalDeleted), 1);

        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        assert_eq!(dispatcher.handler_count(EventKind::GoalCompleted), 0);
        assert_eq!(dispatcher.subscription_count(), 0);

        dispatcher.publish(&completed()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_error_and_panic_are_isolated() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));

        dispatcher.subscribe(
            EventKind::GoalCompleted,
            handler_fn("failing", |_| async { Err::<(), _>(HandlerError::other("boom")) }),
        );
        dispatcher.subscribe(
            EventKind::GoalCompleted,
            handler_fn("panicking", |envelope: EventEnvelope| async move {
                if envelope.version() > 0 {
                    panic!("kaboom");
                }
                Ok::<_, HandlerError>(())
            }),
        );
        dispatcher.subscribe(EventKind::GoalCompleted, counting("healthy", hits.clone()));

        let report = dispatcher.publish(&completed()).await;
        assert_eq!(report.handlers_invoked, 3);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let panicked = report.failures.iter().find(|f| f.handler == "panicking").unwrap();
        assert!(panicked.panicked);
        assert!(panicked.error.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_sequential_preserves_subscription_order() {
        let dispatcher = EventDispatcher::with_options(DispatcherOptions {
            fan_out: FanOut::Sequential,
            catch_panics: true,
        });
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let order = order.clone();
            dispatcher.subscribe(
                EventKind::GoalCompleted,
                handler_fn(name, move |_| {
                    let order = order.clone();
                    async move {
                        order.lock().push(name);
                        Ok::<_, HandlerError>(())
                    }
                }),
            );
        }

        dispatcher.publish(&completed()).await;
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_publish_all_in_order() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let recorder = {
            let seen = seen.clone();
            handler_fn("recorder", move |envelope: EventEnvelope| {
                let seen = seen.clone();
                async move {
                    seen.lock().push(envelope.kind());
                    Ok::<_, HandlerError>(())
                }
            })
        };
        dispatcher.subscribe_many([EventKind::GoalCompleted, EventKind::GoalDeleted], recorder);

        let deleted = EventEnvelope::new(
            GoalDeleted {
                goal_uuid: Uuid::new_v4(),
                account_uuid: AccountUuid::new("acct"),
                previous_status: GoalStatus::Completed,
                deleted_at: Utc::now(),
            },
            3,
        );
        let report = dispatcher.publish_all(&[completed(), deleted]).await;

        assert_eq!(report.events_published(), 2);
        assert!(report.is_success());
        assert_eq!(*seen.lock(), vec![EventKind::GoalCompleted, EventKind::GoalDeleted]);
    }

    #[tokio::test]
    async fn test_subscribe_during_dispatch() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let late = counting("late", hits.clone());
        let registrar = {
            let dispatcher = dispatcher.downgrade();
            handler_fn("registrar", move |_| {
                let dispatcher = dispatcher.clone();
                let late = late.clone();
                async move {
                    if let Some(dispatcher) = dispatcher.upgrade() {
                        dispatcher.subscribe(EventKind::GoalCompleted, late);
                    }
                    Ok::<_, HandlerError>(())
                }
            })
        };
        dispatcher.subscribe(EventKind::GoalCompleted, registrar);

        let first = dispatcher.publish(&completed()).await;
        assert_eq!(first.handlers_invoked, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let second = dispatcher.publish(&completed()).await;
        assert_eq!(second.handlers_invoked, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_weak_dispatcher_after_drop() {
        let dispatcher = EventDispatcher::new();
        let weak = dispatcher.downgrade();
        assert!(weak.deliver(vec![completed()]).await.is_ok());

        drop(dispatcher);
        let err = weak.deliver(vec![completed()]).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DispatcherUnavailable);
    }
}
