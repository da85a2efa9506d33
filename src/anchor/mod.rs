pub mod clock;
pub mod store;

use serde::{Deserialize, Serialize};

pub use clock::StampClock;
pub use store::AnchorStore;

/// A named point in 3D space.
///
/// `last_updated` is stamped by the server on every compare-then-write. Records
/// that arrive through the raw paths keep whatever the client submitted, which
/// may be nothing at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    #[serde(
        rename = "lastUpdated",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<i64>,
}

impl Anchor {
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
            altitude,
            last_updated: None,
        }
    }

    pub fn with_last_updated(mut self, stamp: i64) -> Self {
        self.last_updated = Some(stamp);
        self
    }

    /// True when every coordinate matches. Timestamps are ignored.
    pub fn same_position(&self, other: &Anchor) -> bool {
        self.latitude == other.latitude
            && self.longitude == other.longitude
            && self.altitude == other.altitude
    }

    /// Strictly newer than `since`. A record without a stamp is never newer,
    /// and nothing is newer than an unknown client stamp.
    pub fn is_newer_than(&self, since: Option<i64>) -> bool {
        match (self.last_updated, since) {
            (Some(ours), Some(theirs)) => ours > theirs,
            _ => false,
        }
    }
}

/// What a client reports holding during `fetchUpdates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorClaim {
    pub id: String,
    #[serde(
        rename = "lastUpdated",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<i64>,
}

impl AnchorClaim {
    pub fn new(id: impl Into<String>, last_updated: Option<i64>) -> Self {
        Self {
            id: id.into(),
            last_updated,
        }
    }
}

impl From<&Anchor> for AnchorClaim {
    fn from(anchor: &Anchor) -> Self {
        Self::new(anchor.id.clone(), anchor.last_updated)
    }
}

/// Result of a single store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "added",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Unchanged => "unchanged",
        }
    }
}
