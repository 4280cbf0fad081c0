//! The dispatcher: sole reader of the inbound stream, fans envelopes out
//! to matching subscriptions without ever blocking on a consumer.

use crossbeam_channel::{select, Receiver, TrySendError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::manager::{Registered, SharedRegistry};
use super::types::SubscriptionError;
use crate::error::FeedError;
use crate::types::{Envelope, RawMessage};

/// Runs on its own thread. Reading the inbound stream from exactly one
/// place is what gives the per-subscription ordering guarantee.
pub(crate) struct Dispatcher {
    registry: SharedRegistry,
    inbound: Receiver<RawMessage>,
    shutdown: Receiver<()>,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: SharedRegistry,
        inbound: Receiver<RawMessage>,
        shutdown: Receiver<()>,
    ) -> Self {
        Self {
            registry,
            inbound,
            shutdown,
        }
    }

    /// Read loop. Exits on the shutdown signal or when the transport end
    /// of the inbound stream is dropped.
    pub(crate) fn run(self) {
        debug!("dispatcher running");
        loop {
            select! {
                recv(self.inbound) -> msg => match msg {
                    Ok(raw) => self.dispatch(&raw),
                    Err(_) => {
                        debug!("inbound stream closed");
                        break;
                    }
                },
                recv(self.shutdown) -> _ => break,
            }
        }
        debug!("dispatcher stopped");
    }

    fn dispatch(&self, raw: &RawMessage) {
        let envelope = match Envelope::parse(raw) {
            Ok(env) => Arc::new(env),
            Err(err) => {
                let msg = match err {
                    FeedError::Malformed(m) => m,
                    other => other.to_string(),
                };
                warn!(error = %msg, "skipping malformed inbound message");
                self.broadcast_error(&SubscriptionError::Malformed(msg));
                return;
            }
        };

        let subs = self.registry.read();
        for sub in subs.values() {
            if sub.is_active() && sub.matches(&envelope) {
                Self::deliver(sub, &envelope);
            }
        }
    }

    /// Handler first, then a non-blocking enqueue. A full delivery queue
    /// drops the event for this subscription only and reports it on the
    /// error queue.
    fn deliver(sub: &Registered, envelope: &Arc<Envelope>) {
        if let Some(handler) = &sub.handler {
            if let Err(e) = handler.handle(envelope) {
                Self::report(sub, SubscriptionError::Handler(e.to_string()));
            }
        }

        match sub.events_tx.try_send(Arc::clone(envelope)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = sub.shared.drops.fetch_add(1, Ordering::Relaxed) + 1;
                Self::report(sub, SubscriptionError::Overflow { dropped });
            }
            // Consumer dropped its handle; teardown reaps the entry.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Non-blocking error push. If the error queue is full too, the
    /// report is suppressed; drops stay counted on the handle.
    fn report(sub: &Registered, error: SubscriptionError) {
        if sub.errors_tx.try_send(error).is_err() {
            trace!(id = %sub.shared.id, "error queue full, report suppressed");
        }
    }

    /// A malformed message belongs to no subscription; let every active
    /// one know so a misbehaving feed does not fail silently.
    fn broadcast_error(&self, error: &SubscriptionError) {
        let subs = self.registry.read();
        for sub in subs.values() {
            if sub.is_active() {
                Self::report(sub, error.clone());
            }
        }
    }
}
