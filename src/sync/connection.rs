use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::message::Frame;

/// Process-unique, sequential, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound half of a connection's writer channel.
pub type Outbound = mpsc::UnboundedSender<Frame>;

/// Send handle for one live connection.
///
/// Frames are queued on the writer task's channel and never awaited. A handle
/// stops being ready once it is marked closing or once its writer has gone.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: Outbound,
    open: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, outbound: Outbound) -> Self {
        Self {
            id,
            outbound,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_ready(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    pub fn mark_closing(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Queue a frame. Returns false when the connection was not ready.
    pub fn send(&self, frame: &Frame) -> bool {
        self.is_ready() && self.outbound.send(Frame::clone(frame)).is_ok()
    }
}
