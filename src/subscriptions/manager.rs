//! Subscription manager: the public entry point for the event feed.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use super::dispatcher::Dispatcher;
use super::types::{
    EventHandler, Shared, SubscriptionConfig, SubscriptionError, SubscriptionHandle,
    DEFAULT_BUFFER_SIZE,
};
use crate::error::{FeedError, Result};
use crate::transport::FeedTransport;
use crate::types::{Envelope, EventType, OperationId, RawMessage, SubscriptionId};

/// Capacity of every subscription's error queue. Independent of the
/// delivery buffer so overflow reports survive bursty overload.
const ERROR_QUEUE_CAPACITY: usize = 64;

/// Registry entry: the manager/dispatcher side of one subscription.
/// Dropping it closes the delivery and error queues and fires the
/// completion signal.
pub(crate) struct Registered {
    pub(crate) shared: Arc<Shared>,
    pub(crate) handler: Option<Arc<dyn EventHandler>>,
    pub(crate) filter: Map<String, Value>,
    pub(crate) events_tx: Sender<Arc<Envelope>>,
    pub(crate) errors_tx: Sender<SubscriptionError>,
    /// Never sent on; watchers observe the disconnect when this drops.
    _done_tx: Sender<()>,
}

impl Registered {
    pub(crate) fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Exact type, exact operation scope, then every filter clause.
    /// A missing filter key is a non-match; an envelope without an
    /// explicit scope matches any (its feed was opened scoped).
    pub(crate) fn matches(&self, envelope: &Envelope) -> bool {
        if envelope.event_type != self.shared.event_type {
            return false;
        }
        if let Some(op) = envelope.operation {
            if op != self.shared.operation {
                return false;
            }
        }
        self.filter
            .iter()
            .all(|(key, want)| envelope.fields.get(key) == Some(want))
    }
}

/// All live subscriptions, keyed by identity. The lock is the single
/// serialization point for membership and active flags.
pub(crate) type SharedRegistry = Arc<RwLock<HashMap<SubscriptionId, Registered>>>;

/// `Idle -> Running -> Stopped`, stopped terminal per manager.
enum DispatcherState {
    Idle,
    Running {
        shutdown: Sender<()>,
        thread: JoinHandle<()>,
    },
    Stopped,
}

/// Creates, registers, and tears down subscriptions over one transport
/// stream.
///
/// One `SubscriptionManager` owns one inbound stream and one registry;
/// no subscription outlives its manager's [`close`](Self::close). The
/// dispatcher thread starts lazily on the first subscribe.
pub struct SubscriptionManager {
    transport: Arc<dyn FeedTransport>,
    registry: SharedRegistry,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    /// Client-wide operation scope, used when a config leaves it unset.
    operation: RwLock<Option<OperationId>>,
    /// Handed to the dispatcher when it starts.
    inbound: Mutex<Option<Receiver<RawMessage>>>,
    dispatcher: Mutex<DispatcherState>,
}

impl SubscriptionManager {
    /// Create a manager around a transport and its inbound stream.
    pub fn new(transport: Arc<dyn FeedTransport>, inbound: Receiver<RawMessage>) -> Self {
        Self {
            transport,
            registry: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            operation: RwLock::new(None),
            inbound: Mutex::new(Some(inbound)),
            dispatcher: Mutex::new(DispatcherState::Idle),
        }
    }

    /// Create a manager with a client-wide operation scope already set.
    pub fn with_operation(
        transport: Arc<dyn FeedTransport>,
        inbound: Receiver<RawMessage>,
        operation: OperationId,
    ) -> Self {
        let manager = Self::new(transport, inbound);
        *manager.operation.write() = Some(operation);
        manager
    }

    /// Set the client-wide operation scope for future subscribes.
    pub fn set_operation(&self, operation: OperationId) {
        *self.operation.write() = Some(operation);
    }

    /// The client-wide operation scope, if set.
    pub fn current_operation(&self) -> Option<OperationId> {
        *self.operation.read()
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Create and register a subscription.
    ///
    /// Validates the config, opens the scoped feed on the transport
    /// (failure aborts with nothing registered), registers the
    /// subscription, and starts the dispatcher if this is the first one.
    /// The returned handle is active until [`unsubscribe`](Self::unsubscribe)
    /// or [`close`](Self::close).
    pub fn subscribe(&self, config: SubscriptionConfig) -> Result<SubscriptionHandle> {
        if let EventType::Other(tag) = &config.event_type {
            if tag.is_empty() {
                return Err(FeedError::InvalidConfig("empty event type tag".into()));
            }
        }
        let operation = config
            .operation
            .or_else(|| self.current_operation())
            .ok_or(FeedError::NoOperation)?;
        if matches!(*self.dispatcher.lock(), DispatcherState::Stopped) {
            return Err(FeedError::Closed);
        }

        self.transport.open(&config.event_type, operation)?;

        let buffer = if config.buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            config.buffer_size
        };
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (events_tx, events_rx) = bounded(buffer);
        let (errors_tx, errors_rx) = bounded(ERROR_QUEUE_CAPACITY);
        let (done_tx, done_rx) = bounded(0);

        let shared = Arc::new(Shared::new(id, config.event_type.clone(), operation));
        let entry = Registered {
            shared: Arc::clone(&shared),
            handler: config.handler,
            filter: config.filter,
            events_tx,
            errors_tx,
            _done_tx: done_tx,
        };

        self.registry.write().insert(id, entry);

        if let Err(e) = self.ensure_dispatcher() {
            // Unwind: nothing may stay registered if the read loop
            // could not start.
            self.registry.write().remove(&id);
            if let Err(close_err) = self.transport.close(&config.event_type, operation) {
                warn!(%id, error = %close_err, "transport close failed during unwind");
            }
            return Err(e);
        }

        debug!(%id, event_type = %shared.event_type, %operation, "subscribed");
        Ok(SubscriptionHandle {
            shared,
            events: events_rx,
            errors: errors_rx,
            done: done_rx,
        })
    }

    /// Deactivate and remove one subscription.
    ///
    /// Errors if the handle is already inactive or unknown. Safe to call
    /// while the dispatcher is delivering to the same subscription: the
    /// registry lock serializes the two, and the active flag flips,
    /// both queues close, and the completion signal fires before this
    /// returns.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        let id = handle.id();
        let (event_type, operation) = {
            let mut subs = self.registry.write();
            if !handle.is_active() {
                return Err(FeedError::AlreadyClosed(id));
            }
            let Some(entry) = subs.remove(&id) else {
                return Err(FeedError::SubscriptionNotFound(id));
            };
            entry.shared.active.store(false, Ordering::Release);
            (entry.shared.event_type.clone(), entry.shared.operation)
            // entry drops here, closing the queues under the lock
        };

        if let Err(e) = self.transport.close(&event_type, operation) {
            warn!(%id, error = %e, "transport close failed");
        }
        debug!(%id, "unsubscribed");
        Ok(())
    }

    /// Stop the dispatcher and deactivate every remaining subscription.
    ///
    /// Idempotent, and callable even if nothing was ever subscribed.
    /// After this, the manager is terminal: further subscribes fail.
    pub fn close(&self) -> Result<()> {
        // Stop the read loop first so nothing dispatches while the
        // registry drains.
        let previous = {
            let mut state = self.dispatcher.lock();
            std::mem::replace(&mut *state, DispatcherState::Stopped)
        };
        if let DispatcherState::Running { shutdown, thread } = previous {
            drop(shutdown);
            if thread.join().is_err() {
                warn!("dispatcher thread panicked");
            }
        }

        let mut feeds = Vec::new();
        {
            let mut subs = self.registry.write();
            for (_, entry) in subs.drain() {
                entry.shared.active.store(false, Ordering::Release);
                feeds.push((entry.shared.event_type.clone(), entry.shared.operation));
                // entry drops here: queues close, completion fires
            }
        }
        for (event_type, operation) in feeds {
            if let Err(e) = self.transport.close(&event_type, operation) {
                warn!(event_type = %event_type, %operation, error = %e, "transport close failed");
            }
        }

        debug!("subscription manager closed");
        Ok(())
    }

    /// Report a transport failure on an already-open feed.
    ///
    /// The transport's reconnect plumbing calls this when a feed breaks
    /// after setup. The failure lands on the error queue of every
    /// subscription scoped to that feed; other subscriptions never see
    /// it.
    pub fn report_transport_error(
        &self,
        event_type: &EventType,
        operation: OperationId,
        message: &str,
    ) {
        let subs = self.registry.read();
        for entry in subs.values() {
            if entry.is_active()
                && entry.shared.event_type == *event_type
                && entry.shared.operation == operation
            {
                let _ = entry
                    .errors_tx
                    .try_send(SubscriptionError::Transport(message.to_string()));
            }
        }
    }

    /// Start the dispatcher thread if it is not running yet. Errors if
    /// the manager closed in the meantime so the caller can unwind its
    /// registration.
    fn ensure_dispatcher(&self) -> Result<()> {
        let mut state = self.dispatcher.lock();
        match *state {
            DispatcherState::Running { .. } => return Ok(()),
            DispatcherState::Stopped => return Err(FeedError::Closed),
            DispatcherState::Idle => {}
        }
        let Some(inbound) = self.inbound.lock().take() else {
            return Err(FeedError::Closed);
        };

        let (shutdown_tx, shutdown_rx) = bounded(0);
        let dispatcher = Dispatcher::new(Arc::clone(&self.registry), inbound, shutdown_rx);
        let thread = thread::Builder::new()
            .name("opfeed-dispatcher".into())
            .spawn(move || dispatcher.run())
            .map_err(|e| FeedError::Internal(format!("failed to spawn dispatcher: {e}")))?;

        *state = DispatcherState::Running {
            shutdown: shutdown_tx,
            thread,
        };
        debug!("dispatcher started");
        Ok(())
    }
}
