//! Subscription types: configs, handles, and per-subscription errors.

use crate::types::{Envelope, EventType, OperationId, SubscriptionId};
use crossbeam_channel::Receiver;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Delivery queue capacity used when the config leaves `buffer_size` at 0.
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Error a handler may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked once per matching event, on the dispatcher thread.
///
/// Implementations must not call back into the manager (`unsubscribe`,
/// `close`): the dispatcher holds the registry lock while handlers run,
/// and doing so would self-deadlock. A returned error is pushed onto the
/// owning subscription's error queue and never stops delivery to other
/// subscriptions.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Envelope) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: Fn(&Envelope) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &Envelope) -> Result<(), HandlerError> {
        self(event)
    }
}

/// Configuration for a subscription.
#[derive(Clone)]
pub struct SubscriptionConfig {
    /// Which event tag to receive.
    pub event_type: EventType,

    /// Optional callback run per matching event. A subscription without
    /// a handler is valid, but the caller then owns draining the
    /// delivery queue; a subscription with neither is a caller bug that
    /// silently fills its buffer.
    pub handler: Option<Arc<dyn EventHandler>>,

    /// Delivery queue capacity. 0 means [`DEFAULT_BUFFER_SIZE`].
    pub buffer_size: usize,

    /// Conjunctive field-equality filter. Every key listed here must be
    /// present in the envelope with an equal value. Empty matches all.
    pub filter: Map<String, Value>,

    /// Operation scope. `None` falls back to the manager's current
    /// operation; subscribing fails if neither is set.
    pub operation: Option<OperationId>,
}

impl SubscriptionConfig {
    /// Config for one event type, matching everything, default buffer.
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            handler: None,
            buffer_size: 0,
            filter: Map::new(),
            operation: None,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Add one filter clause.
    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(field.into(), value.into());
        self
    }

    pub fn with_operation(mut self, operation: OperationId) -> Self {
        self.operation = Some(operation);
        self
    }
}

impl fmt::Debug for SubscriptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionConfig")
            .field("event_type", &self.event_type)
            .field("handler", &self.handler.as_ref().map(|_| "<handler>"))
            .field("buffer_size", &self.buffer_size)
            .field("filter", &self.filter)
            .field("operation", &self.operation)
            .finish()
    }
}

/// Errors delivered asynchronously on a subscription's error queue.
///
/// These never cross into another subscription's queue and never abort
/// the dispatcher.
#[derive(Clone, Debug, Error)]
pub enum SubscriptionError {
    /// The subscription's handler returned an error for one event.
    #[error("handler failed: {0}")]
    Handler(String),

    /// The delivery queue was full; `dropped` is the cumulative count of
    /// events this subscription has lost so far.
    #[error("delivery queue full, {dropped} event(s) dropped so far")]
    Overflow { dropped: u64 },

    /// An inbound message could not be parsed and was skipped.
    #[error("malformed message skipped: {0}")]
    Malformed(String),

    /// The transport reported a problem with this feed after setup.
    #[error("transport error: {0}")]
    Transport(String),
}

/// State shared between a handle and its registry entry.
pub(crate) struct Shared {
    pub(crate) id: SubscriptionId,
    pub(crate) event_type: EventType,
    pub(crate) operation: OperationId,
    /// Mutated only while holding the registry write lock.
    pub(crate) active: AtomicBool,
    /// Cumulative events lost to a full delivery queue.
    pub(crate) drops: AtomicU64,
}

impl Shared {
    pub(crate) fn new(id: SubscriptionId, event_type: EventType, operation: OperationId) -> Self {
        Self {
            id,
            event_type,
            operation,
            active: AtomicBool::new(true),
            drops: AtomicU64::new(0),
        }
    }
}

/// A consumer's live registration.
///
/// A caller that ignores the error queue silently loses events under
/// sustained overload; liveness of the whole feed is prioritized over
/// lossless delivery to one slow consumer.
pub struct SubscriptionHandle {
    pub(crate) shared: Arc<Shared>,
    pub(crate) events: Receiver<Arc<Envelope>>,
    pub(crate) errors: Receiver<SubscriptionError>,
    pub(crate) done: Receiver<()>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.shared.id
    }

    pub fn event_type(&self) -> &EventType {
        &self.shared.event_type
    }

    pub fn operation(&self) -> OperationId {
        self.shared.operation
    }

    /// Snapshot of the active flag. May flip to false at any moment
    /// under a concurrent unsubscribe or client close.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Cumulative count of events dropped because the delivery queue
    /// was full.
    pub fn dropped(&self) -> u64 {
        self.shared.drops.load(Ordering::Relaxed)
    }

    /// The delivery queue. Closes (disconnects) when the subscription
    /// is torn down.
    pub fn events(&self) -> &Receiver<Arc<Envelope>> {
        &self.events
    }

    /// The error queue.
    pub fn errors(&self) -> &Receiver<SubscriptionError> {
        &self.errors
    }

    /// Completion signal: disconnects exactly once, when the
    /// subscription is torn down. Never carries a value.
    pub fn done(&self) -> &Receiver<()> {
        &self.done
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<Arc<Envelope>, crossbeam_channel::RecvError> {
        self.events.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<Arc<Envelope>, crossbeam_channel::TryRecvError> {
        self.events.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<Arc<Envelope>, crossbeam_channel::RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    /// Block until the subscription is torn down.
    pub fn wait_closed(&self) {
        // Nothing is ever sent on `done`; recv returns only on disconnect.
        let _ = self.done.recv();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.shared.id)
            .field("event_type", &self.shared.event_type)
            .field("operation", &self.shared.operation)
            .field("active", &self.is_active())
            .finish()
    }
}
