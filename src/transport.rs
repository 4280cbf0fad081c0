//! Seam to the underlying authenticated transport.
//!
//! The transport owns the connection, authentication, and reconnect policy.
//! This crate only needs two things from it: a way to open/close a logical
//! feed on the wire (scoped by event type and operation), and the sequential
//! stream of raw inbound messages, which is handed to the manager as a plain
//! `crossbeam_channel::Receiver<RawMessage>`.

use crate::error::Result;
use crate::types::{EventType, OperationId};

/// Opens and closes logical feeds on the wire.
///
/// `open` is called once per successful subscribe, `close` once per
/// unsubscribe (best effort). A transport that multiplexes several
/// subscriptions over one wire feed may deduplicate internally.
pub trait FeedTransport: Send + Sync {
    /// Ask the server to start pushing events of this type for this
    /// operation.
    fn open(&self, event_type: &EventType, operation: OperationId) -> Result<()>;

    /// Ask the server to stop.
    fn close(&self, event_type: &EventType, operation: OperationId) -> Result<()>;
}

/// Transport that accepts every open/close without touching a wire.
///
/// Useful for in-process fan-out and for tests that feed the inbound
/// channel directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTransport;

impl FeedTransport for NullTransport {
    fn open(&self, _event_type: &EventType, _operation: OperationId) -> Result<()> {
        Ok(())
    }

    fn close(&self, _event_type: &EventType, _operation: OperationId) -> Result<()> {
        Ok(())
    }
}
