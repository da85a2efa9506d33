pub mod broadcast;
pub mod connection;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod remote;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use connection::{ConnectionHandle, ConnectionId};
pub use message::{ClientMessage, ConnectionStatus, ServerMessage};
pub use protocol::{Dispatch, SyncProtocol};
pub use registry::{ConnectionRegistry, RegistrySnapshot};

// Real-time sync: the per-message protocol, the registry of live connections
// and the fan-out that keeps them converged on the shared anchor set.
