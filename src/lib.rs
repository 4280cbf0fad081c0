//! # opfeed
//!
//! Client-side subscription engine for a server-pushed operations event
//! stream. Turns one ordered inbound feed into many independent,
//! filtered, backpressure-safe consumer feeds.
//!
//! ## Core concepts
//!
//! - **Envelope**: one parsed server event (tag + field map)
//! - **Subscription**: a consumer's registration with bounded delivery
//!   and error queues
//! - **Dispatcher**: the single sequential reader matching and fanning
//!   out envelopes
//! - **Operation scope**: the workspace partitioning events on the
//!   shared transport
//!
//! Delivery is lossy under overload by contract: the dispatcher never
//! blocks for a slow consumer, and drops are reported on that consumer's
//! error queue only.
//!
//! ## Example
//!
//! ```ignore
//! use opfeed::{
//!     EventType, NullTransport, OperationId, SubscriptionConfig, SubscriptionManager,
//! };
//!
//! let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
//! let manager = SubscriptionManager::with_operation(
//!     std::sync::Arc::new(NullTransport),
//!     inbound_rx,
//!     OperationId(1),
//! );
//!
//! let tasks = manager.subscribe(
//!     SubscriptionConfig::new(EventType::TaskOutput).with_filter("callback_id", 7),
//! )?;
//!
//! while let Ok(event) = tasks.recv() {
//!     println!("{:?}", event.field("output"));
//! }
//!
//! manager.close()?;
//! ```

pub mod error;
pub mod subscriptions;
pub mod transport;
pub mod types;

// Re-exports
pub use error::{FeedError, Result};
pub use subscriptions::{
    EventHandler, HandlerError, SubscriptionConfig, SubscriptionError, SubscriptionHandle,
    SubscriptionManager, DEFAULT_BUFFER_SIZE,
};
pub use transport::{FeedTransport, NullTransport};
pub use types::{Envelope, EventType, OperationId, RawMessage, SubscriptionId};
