//! Wire messages exchanged over the persistent connection.
//!
//! Every frame is a JSON object tagged by `"type"`. Inbound frames are decoded
//! leniently: the envelope is parsed first, then each `anchorData` entry is
//! validated on its own so one bad record never sinks the rest of a batch.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::anchor::{Anchor, AnchorClaim};
use crate::error::{ProtocolError, ProtocolResult};

pub const FETCH_UPDATES: &str = "fetchUpdates";
pub const FETCH_FIRST_UPDATE: &str = "fetchFirstUpdate";
pub const UPDATE_ANCHOR: &str = "updateAnchor";

pub const NO_UPDATES_MESSAGE: &str = "No updates available from server.";

/// A request sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Send me whatever is newer than what I hold.
    #[serde(rename = "fetchUpdates")]
    FetchUpdates {
        #[serde(rename = "anchorData")]
        anchor_data: Vec<AnchorClaim>,
    },
    /// Bootstrap: seed the server with anything it lacks, then send me everything.
    #[serde(rename = "fetchFirstUpdate")]
    FetchFirstUpdate {
        #[serde(rename = "anchorData")]
        anchor_data: Vec<Anchor>,
    },
    /// Make these anchors authoritative and tell everyone.
    #[serde(rename = "updateAnchor")]
    UpdateAnchor {
        #[serde(rename = "anchorData")]
        anchor_data: Vec<Anchor>,
    },
}

/// A decoded client message plus any entries that were dropped on the way.
#[derive(Debug)]
pub struct Decoded {
    pub message: ClientMessage,
    pub rejected: Vec<ProtocolError>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(rename = "anchorData", default)]
    anchor_data: Option<Value>,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::FetchUpdates { .. } => FETCH_UPDATES,
            ClientMessage::FetchFirstUpdate { .. } => FETCH_FIRST_UPDATE,
            ClientMessage::UpdateAnchor { .. } => UPDATE_ANCHOR,
        }
    }

    pub fn decode(text: &str) -> ProtocolResult<Decoded> {
        let envelope: Envelope = serde_json::from_str(text)?;

        let (message, rejected) = match envelope.kind.as_deref() {
            Some(FETCH_UPDATES) => {
                let entries = entries(FETCH_UPDATES, envelope.anchor_data, false)?;
                let (anchor_data, rejected) = collect(entries, parse_claim);
                (ClientMessage::FetchUpdates { anchor_data }, rejected)
            }
            Some(FETCH_FIRST_UPDATE) => {
                let entries = entries(FETCH_FIRST_UPDATE, envelope.anchor_data, false)?;
                let (anchor_data, rejected) = collect(entries, parse_anchor);
                (ClientMessage::FetchFirstUpdate { anchor_data }, rejected)
            }
            Some(UPDATE_ANCHOR) => {
                let entries = entries(UPDATE_ANCHOR, envelope.anchor_data, true)?;
                let (anchor_data, rejected) = collect(entries, parse_anchor);
                (ClientMessage::UpdateAnchor { anchor_data }, rejected)
            }
            _ => return Err(ProtocolError::UnknownType(envelope.kind.clone())),
        };
        Ok(Decoded { message, rejected })
    }

    pub fn encode(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(|source| ProtocolError::Encode {
            kind: self.kind(),
            source,
        })
    }
}

fn entries(kind: &'static str, data: Option<Value>, required: bool) -> ProtocolResult<Vec<Value>> {
    match data {
        Some(Value::Array(items)) => Ok(items),
        None | Some(Value::Null) if !required => Ok(Vec::new()),
        _ => Err(ProtocolError::InvalidAnchorData { kind }),
    }
}

fn collect<T>(
    entries: Vec<Value>,
    parse: fn(Value) -> Result<T, String>,
) -> (Vec<T>, Vec<ProtocolError>) {
    let mut accepted = Vec::with_capacity(entries.len());
    let mut rejected = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        match parse(entry) {
            Ok(item) => accepted.push(item),
            Err(reason) => rejected.push(ProtocolError::InvalidEntry { index, reason }),
        }
    }
    (accepted, rejected)
}

fn parse_claim(entry: Value) -> Result<AnchorClaim, String> {
    serde_json::from_value(entry).map_err(|e| e.to_string())
}

fn parse_anchor(entry: Value) -> Result<Anchor, String> {
    let has_id = entry
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());
    if !has_id {
        return Err("anchor id is undefined or missing".to_string());
    }
    serde_json::from_value(entry).map_err(|e| e.to_string())
}

/// Aggregate connection state shown to clients and on the status page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Connected,
    #[serde(rename = "Not Connected")]
    NotConnected,
}

impl ConnectionStatus {
    pub fn from_count(count: usize) -> Self {
        if count > 0 {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::NotConnected
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::NotConnected => "Not Connected",
        }
    }

    /// Colour used by the status page.
    pub fn color(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "darkgreen",
            ConnectionStatus::NotConnected => "lightcoral",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "updateAnchor")]
    UpdateAnchor {
        #[serde(rename = "anchorData")]
        anchor_data: Vec<Anchor>,
    },
    #[serde(rename = "noUpdates")]
    NoUpdates { message: String },
    #[serde(rename = "statusUpdated")]
    StatusUpdated {
        status: ConnectionStatus,
        #[serde(rename = "clientCount")]
        client_count: usize,
    },
}

/// Serialized text ready to hand to any number of connections.
pub type Frame = Arc<str>;

impl ServerMessage {
    pub fn anchors(anchor_data: Vec<Anchor>) -> Self {
        ServerMessage::UpdateAnchor { anchor_data }
    }

    pub fn no_updates() -> Self {
        ServerMessage::NoUpdates {
            message: NO_UPDATES_MESSAGE.to_string(),
        }
    }

    pub fn status(client_count: usize) -> Self {
        ServerMessage::StatusUpdated {
            status: ConnectionStatus::from_count(client_count),
            client_count,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::UpdateAnchor { .. } => UPDATE_ANCHOR,
            ServerMessage::NoUpdates { .. } => "noUpdates",
            ServerMessage::StatusUpdated { .. } => "statusUpdated",
        }
    }

    pub fn to_frame(&self) -> ProtocolResult<Frame> {
        serde_json::to_string(self)
            .map(Frame::from)
            .map_err(|source| ProtocolError::Encode {
                kind: self.kind(),
                source,
            })
    }
}
