//! The authoritative in-memory anchor set.
//!
//! Every operation takes the lock exactly once, so a read-then-write such as
//! [`AnchorStore::upsert_if_newer`] can never interleave with another writer.
//! Two write policies coexist on purpose:
//!
//! - **stamped** ([`AnchorStore::upsert_if_newer`], [`AnchorStore::upsert`]):
//!   the server assigns `lastUpdated` and leaves it alone when nothing moved.
//! - **raw** ([`AnchorStore::upsert_raw`], [`AnchorStore::replace_if_moved`],
//!   [`AnchorStore::insert_if_absent`]): the client's record is kept verbatim,
//!   including whatever stamp it carried.

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::warn;

use super::{Anchor, AnchorClaim, StampClock, UpsertOutcome};

#[derive(Debug, Default)]
pub struct AnchorStore {
    anchors: RwLock<IndexMap<String, Anchor>>,
    clock: StampClock,
}

impl AnchorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored anchor, in first-insertion order.
    pub fn list(&self) -> Vec<Anchor> {
        self.anchors.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.anchors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.read().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Anchor> {
        self.anchors.read().get(id).cloned()
    }

    /// Insert or move an anchor, stamping it with a fresh `lastUpdated`.
    ///
    /// Identical coordinates leave the stored record (and its stamp) untouched.
    pub fn upsert_if_newer(&self, candidate: Anchor) -> UpsertOutcome {
        let mut anchors = self.anchors.write();
        match anchors.get_mut(&candidate.id) {
            Some(existing) if existing.same_position(&candidate) => UpsertOutcome::Unchanged,
            Some(existing) => {
                *existing = Anchor {
                    last_updated: Some(self.clock.next()),
                    ..candidate
                };
                UpsertOutcome::Updated
            }
            None => {
                let stamped = Anchor {
                    last_updated: Some(self.clock.next()),
                    ..candidate
                };
                anchors.insert(stamped.id.clone(), stamped);
                UpsertOutcome::Inserted
            }
        }
    }

    /// Batch form of [`upsert_if_newer`](Self::upsert_if_newer). Each entry is
    /// applied independently; readers may observe a partially applied batch.
    pub fn upsert<I>(&self, batch: I) -> Vec<UpsertOutcome>
    where
        I: IntoIterator<Item = Anchor>,
    {
        batch
            .into_iter()
            .map(|anchor| self.upsert_if_newer(anchor))
            .collect()
    }

    /// Unconditional verbatim overwrite.
    pub fn upsert_raw(&self, candidate: Anchor) -> UpsertOutcome {
        self.observe(&candidate);
        let mut anchors = self.anchors.write();
        match anchors.insert(candidate.id.clone(), candidate) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        }
    }

    /// Verbatim write unless the stored record already sits at the same
    /// coordinates.
    pub fn replace_if_moved(&self, candidate: Anchor) -> UpsertOutcome {
        let mut anchors = self.anchors.write();
        match anchors.get_mut(&candidate.id) {
            Some(existing) if existing.same_position(&candidate) => UpsertOutcome::Unchanged,
            Some(existing) => {
                self.observe(&candidate);
                *existing = candidate;
                UpsertOutcome::Updated
            }
            None => {
                self.observe(&candidate);
                anchors.insert(candidate.id.clone(), candidate);
                UpsertOutcome::Inserted
            }
        }
    }

    /// Verbatim insert that never touches an existing record.
    pub fn insert_if_absent(&self, candidate: Anchor) -> bool {
        let mut anchors = self.anchors.write();
        if anchors.contains_key(&candidate.id) {
            return false;
        }
        self.observe(&candidate);
        anchors.insert(candidate.id.clone(), candidate);
        true
    }

    /// The stored anchor for `id`, only if it is strictly newer than `since`.
    pub fn get_newer_than(&self, id: &str, since: Option<i64>) -> Option<Anchor> {
        self.anchors
            .read()
            .get(id)
            .filter(|anchor| anchor.is_newer_than(since))
            .cloned()
    }

    /// Every stored anchor that beats the matching client claim, read under a
    /// single lock. Claims for unknown ids are skipped.
    pub fn updates_for(&self, claims: &[AnchorClaim]) -> Vec<Anchor> {
        let anchors = self.anchors.read();
        claims
            .iter()
            .filter_map(|claim| {
                anchors
                    .get(&claim.id)
                    .filter(|anchor| anchor.is_newer_than(claim.last_updated))
                    .cloned()
            })
            .collect()
    }

    pub fn clear(&self) {
        self.anchors.write().clear();
    }

    fn observe(&self, candidate: &Anchor) {
        if let Some(stamp) = candidate.last_updated {
            if !self.clock.observe(stamp) {
                warn!(anchor = %candidate.id, stamp, "stamp too far ahead, not advancing clock");
            }
        }
    }
}
