//! Errors raised while decoding or encoding sync traffic.
//!
//! None of these are fatal: the connection that produced them stays open and
//! the offending message (or entry) is dropped after being logged.

use thiserror::Error;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The frame is not the expected JSON envelope.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The envelope carried a tag this server does not handle.
    #[error("unknown message type: {0:?}")]
    UnknownType(Option<String>),

    /// `anchorData` was present but not a sequence, or missing where one is required.
    #[error("anchorData for {kind} is not an array")]
    InvalidAnchorData { kind: &'static str },

    /// A single batch entry failed validation; the rest of the batch proceeds.
    #[error("entry {index} rejected: {reason}")]
    InvalidEntry { index: usize, reason: String },

    /// An outbound payload could not be serialized.
    #[error("failed to encode {kind}: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Errors that discard a whole message rather than one entry of it.
    pub fn drops_message(&self) -> bool {
        !matches!(self, ProtocolError::InvalidEntry { .. })
    }
}
