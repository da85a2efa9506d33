//! Live connection bookkeeping.
//!
//! Register and deregister are serialized behind one lock, and the status
//! broadcast is sent before that lock is released. Every client therefore sees
//! `statusUpdated` counts in the order the membership actually changed.

use parking_lot::Mutex;
use tracing::{debug, error, info};

use super::broadcast::{BroadcastReport, Broadcaster};
use super::connection::{ConnectionHandle, ConnectionId, Outbound};
use super::message::{ConnectionStatus, ServerMessage};

#[derive(Debug, Default)]
struct Membership {
    next_id: u64,
    count: usize,
}

/// Point-in-time view of the aggregate connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub status: ConnectionStatus,
    pub client_count: usize,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    membership: Mutex<Membership>,
    broadcaster: Broadcaster,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Add a connection and announce the new count to everyone, the newcomer
    /// included.
    pub fn register(&self, outbound: Outbound) -> ConnectionId {
        let mut membership = self.membership.lock();
        let id = ConnectionId(membership.next_id);
        membership.next_id += 1;
        membership.count += 1;

        self.broadcaster.attach(ConnectionHandle::new(id, outbound));
        info!(connection = %id, clients = membership.count, "client connected");
        self.announce(membership.count);
        id
    }

    /// Remove a connection and announce the new count to whoever remains.
    /// Unknown ids are ignored.
    pub fn deregister(&self, id: ConnectionId) {
        let mut membership = self.membership.lock();
        let Some(handle) = self.broadcaster.detach(id) else {
            debug!(connection = %id, "deregister for unknown connection");
            return;
        };
        handle.mark_closing();
        membership.count -= 1;

        info!(connection = %id, clients = membership.count, "client disconnected");
        self.announce(membership.count);
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let count = self.membership.lock().count;
        RegistrySnapshot {
            status: ConnectionStatus::from_count(count),
            client_count: count,
        }
    }

    pub fn client_count(&self) -> usize {
        self.snapshot().client_count
    }

    pub fn status(&self) -> ConnectionStatus {
        self.snapshot().status
    }

    fn announce(&self, count: usize) -> BroadcastReport {
        match self.broadcaster.broadcast(&ServerMessage::status(count)) {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "failed to broadcast status");
                BroadcastReport::default()
            }
        }
    }
}
