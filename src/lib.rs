//! # Grid Sync - Real-time Anchor Synchronization
//!
//! Keeps any number of WebSocket clients eventually consistent with a shared,
//! in-memory set of named 3D anchors.
//!
//! ## Features
//!
//! - **Reconciliation**: clients report what they hold and get back only what
//!   is newer, or the whole set when their stamps make no sense
//! - **Fan-out**: accepted updates are pushed to every live connection
//! - **Presence**: connect and disconnect announce the client count to everyone
//! - **Plain HTTP**: list, set and clear anchors without a socket
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grid_sync::{server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     server::start(config).await
//! }
//! ```

pub mod anchor;
pub mod config;
pub mod error;
pub mod server;
pub mod sync;
pub mod telemetry;

// Re-export main types for library consumers
pub use anchor::{Anchor, AnchorClaim, AnchorStore, UpsertOutcome};
pub use config::ServerConfig;
pub use error::{ProtocolError, ProtocolResult};
pub use sync::{ClientMessage, ConnectionRegistry, ConnectionStatus, ServerMessage, SyncProtocol};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
