//! Fan-out to every live connection.
//!
//! Delivery is best effort: a connection that is not ready is skipped, and
//! nothing is queued or retried on its behalf.

use dashmap::DashMap;

use super::connection::{ConnectionHandle, ConnectionId};
use super::message::{Frame, ServerMessage};
use crate::error::ProtocolResult;

/// Tally of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub skipped: usize,
}

/// Concurrent set of send handles.
#[derive(Debug, Default)]
pub struct Broadcaster {
    connections: DashMap<ConnectionId, ConnectionHandle>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(&self, handle: ConnectionHandle) {
        self.connections.insert(handle.id(), handle);
    }

    pub(crate) fn detach(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.remove(&id).map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn broadcast(&self, message: &ServerMessage) -> ProtocolResult<BroadcastReport> {
        let frame = message.to_frame()?;
        Ok(self.broadcast_frame(&frame))
    }

    pub fn broadcast_frame(&self, frame: &Frame) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for entry in self.connections.iter() {
            if entry.value().send(frame) {
                report.delivered += 1;
            } else {
                report.skipped += 1;
            }
        }
        report
    }

    /// Deliver to a single connection. False if it is gone or not ready.
    pub fn send_to(&self, id: ConnectionId, message: &ServerMessage) -> ProtocolResult<bool> {
        let frame = message.to_frame()?;
        Ok(self
            .connections
            .get(&id)
            .is_some_and(|handle| handle.send(&frame)))
    }
}
