//! Subscription engine: many filtered consumer feeds over one stream.
//!
//! One dispatcher thread reads the transport's inbound messages in order
//! and fans each one out to every matching subscription through bounded
//! per-consumer queues. Sends are never blocking: a slow consumer loses
//! its own events (reported on its error queue) and can never stall the
//! dispatcher or another consumer.
//!
//! # Example
//!
//! ```ignore
//! let (tx, rx) = crossbeam_channel::unbounded();
//! let manager = SubscriptionManager::with_operation(
//!     Arc::new(NullTransport),
//!     rx,
//!     OperationId(1),
//! );
//!
//! let handle = manager.subscribe(
//!     SubscriptionConfig::new(EventType::TaskOutput)
//!         .with_filter("callback_id", 7),
//! )?;
//!
//! loop {
//!     match handle.recv() {
//!         Ok(event) => println!("output: {:?}", event.field("output")),
//!         Err(_) => break, // unsubscribed or client closed
//!     }
//! }
//! ```

mod dispatcher;
mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    EventHandler, HandlerError, SubscriptionConfig, SubscriptionError, SubscriptionHandle,
    DEFAULT_BUFFER_SIZE,
};
