//! Per-message sync state machine.
//!
//! Each inbound frame is handled on its own: decode, consult or mutate the
//! [`AnchorStore`], then either answer the sender or fan out to everyone. No
//! state is kept between messages beyond the connection id used in logs.
//!
//! Store fan-out snapshots the store and broadcasts it under one lock, so the
//! last `updateAnchor` every client receives reflects every applied write.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::connection::ConnectionId;
use super::message::{ClientMessage, Decoded, ServerMessage};
use super::registry::ConnectionRegistry;
use crate::anchor::{Anchor, AnchorClaim, AnchorStore, UpsertOutcome};
use crate::error::ProtocolError;

/// What the handler decided to do with a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Answer only the connection that asked.
    Reply(ServerMessage),
    /// Snapshot the store at delivery time and send it to every connected
    /// client, the sender included.
    BroadcastAnchors,
    /// Nothing goes out.
    Ignore,
}

#[derive(Clone)]
pub struct SyncProtocol {
    store: Arc<AnchorStore>,
    registry: Arc<ConnectionRegistry>,
    fanout: Arc<Mutex<()>>,
}

impl SyncProtocol {
    pub fn new(store: Arc<AnchorStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            store,
            registry,
            fanout: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &Arc<AnchorStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Handle one raw frame from `from` and deliver whatever it produces.
    pub fn process(&self, from: ConnectionId, text: &str) {
        let dispatch = self.handle_text(from, text);
        self.deliver(from, dispatch);
    }

    /// Decode and handle a raw frame. Decoding problems are logged and yield
    /// [`Dispatch::Ignore`]; the connection is never affected.
    pub fn handle_text(&self, from: ConnectionId, text: &str) -> Dispatch {
        debug!(connection = %from, bytes = text.len(), "message received");
        match ClientMessage::decode(text) {
            Ok(Decoded { message, rejected }) => {
                for err in &rejected {
                    warn!(connection = %from, kind = message.kind(), error = %err, "skipping anchor entry");
                }
                self.handle(from, message)
            }
            Err(err) => {
                log_dropped(from, &err);
                Dispatch::Ignore
            }
        }
    }

    pub fn handle(&self, from: ConnectionId, message: ClientMessage) -> Dispatch {
        match message {
            ClientMessage::FetchUpdates { anchor_data } => self.fetch_updates(from, &anchor_data),
            ClientMessage::FetchFirstUpdate { anchor_data } => {
                self.fetch_first_update(from, anchor_data)
            }
            ClientMessage::UpdateAnchor { anchor_data } => self.update_anchors(from, anchor_data),
        }
    }

    fn fetch_updates(&self, from: ConnectionId, claims: &[AnchorClaim]) -> Dispatch {
        info!(connection = %from, claims = claims.len(), "client fetching updates");

        let updates = if claims.is_empty() {
            Vec::new()
        } else {
            self.store.updates_for(claims)
        };

        if !updates.is_empty() {
            return Dispatch::Reply(ServerMessage::anchors(updates));
        }

        // Nothing newer (or nothing claimed): hand over the whole set so a
        // client with inconsistent stamps still converges.
        let all = self.store.list();
        if all.is_empty() {
            Dispatch::Reply(ServerMessage::no_updates())
        } else {
            Dispatch::Reply(ServerMessage::anchors(all))
        }
    }

    fn fetch_first_update(&self, from: ConnectionId, anchors: Vec<Anchor>) -> Dispatch {
        info!(connection = %from, anchors = anchors.len(), "client requested first update");

        let mut added = 0usize;
        for anchor in anchors {
            let id = anchor.id.clone();
            if self.store.insert_if_absent(anchor) {
                added += 1;
                debug!(connection = %from, anchor = %id, "added anchor from bootstrap");
            }
        }
        if added > 0 {
            info!(connection = %from, added, "new anchors added from client bootstrap");
        }

        Dispatch::Reply(ServerMessage::anchors(self.store.list()))
    }

    fn update_anchors(&self, from: ConnectionId, anchors: Vec<Anchor>) -> Dispatch {
        info!(connection = %from, anchors = anchors.len(), "client updating anchors");

        for anchor in anchors {
            let id = anchor.id.clone();
            match self.store.replace_if_moved(anchor) {
                UpsertOutcome::Inserted => debug!(connection = %from, anchor = %id, "added anchor"),
                UpsertOutcome::Updated => debug!(connection = %from, anchor = %id, "updated anchor"),
                UpsertOutcome::Unchanged => {
                    debug!(connection = %from, anchor = %id, "no update needed")
                }
            }
        }

        Dispatch::BroadcastAnchors
    }

    fn deliver(&self, from: ConnectionId, dispatch: Dispatch) {
        let broadcaster = self.registry.broadcaster();
        match dispatch {
            Dispatch::Reply(message) => match broadcaster.send_to(from, &message) {
                Ok(true) => {}
                Ok(false) => debug!(connection = %from, "reply dropped, connection not ready"),
                Err(err) => error!(connection = %from, error = %err, "failed to send reply"),
            },
            Dispatch::BroadcastAnchors => {
                let _fanout = self.fanout.lock();
                let message = ServerMessage::anchors(self.store.list());
                match broadcaster.broadcast(&message) {
                    Ok(report) => debug!(
                        connection = %from,
                        delivered = report.delivered,
                        skipped = report.skipped,
                        "anchors broadcast"
                    ),
                    Err(err) => error!(connection = %from, error = %err, "failed to broadcast"),
                }
            }
            Dispatch::Ignore => {}
        }
    }
}

fn log_dropped(from: ConnectionId, err: &ProtocolError) {
    match err {
        ProtocolError::UnknownType(_) => {
            warn!(connection = %from, error = %err, "ignoring message")
        }
        err if err.drops_message() => {
            error!(connection = %from, error = %err, "failed to decode message")
        }
        err => warn!(connection = %from, error = %err, "skipping anchor entry"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::message::{ConnectionStatus, Frame};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Harness {
        protocol: SyncProtocol,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                protocol: SyncProtocol::new(
                    Arc::new(AnchorStore::new()),
                    Arc::new(ConnectionRegistry::new()),
                ),
            }
        }

        fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Frame>) {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let id = self.protocol.registry().register(tx);
            drain(&mut rx);
            (id, rx)
        }

        fn send(&self, from: ConnectionId, value: serde_json::Value) -> Dispatch {
            self.protocol.handle_text(from, &value.to_string())
        }

        fn store(&self) -> &AnchorStore {
            self.protocol.store()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    fn anchor_ids(dispatch: &Dispatch) -> Vec<String> {
        match dispatch {
            Dispatch::Reply(ServerMessage::UpdateAnchor { anchor_data }) => {
                let mut ids: Vec<_> = anchor_data.iter().map(|a| a.id.clone()).collect();
                ids.sort();
                ids
            }
            other => panic!("expected anchors, got {other:?}"),
        }
    }

    #[test]
    fn fetch_updates_on_empty_store_replies_no_updates() {
        let h = Harness::new();
        let (id, _rx) = h.connect();
        let dispatch = h.send(id, json!({"type": "fetchUpdates", "anchorData": []}));
        assert_eq!(dispatch, Dispatch::Reply(ServerMessage::no_updates()));
    }

    #[test]
    fn fetch_updates_with_no_claims_returns_everything() {
        let h = Harness::new();
        let (id, _rx) = h.connect();
        h.store().upsert(vec![
            Anchor::new("a", 1.0, 1.0, 1.0),
            Anchor::new("b", 2.0, 2.0, 2.0),
        ]);
        let dispatch = h.send(id, json!({"type": "fetchUpdates"}));
        assert_eq!(anchor_ids(&dispatch), ["a", "b"]);
    }

    #[test]
    fn fetch_updates_returns_only_stale_entries() {
        let h = Harness::new();
        let (id, _rx) = h.connect();
        h.store().upsert_raw(Anchor::new("x", 1.0, 1.0, 1.0).with_last_updated(100));
        h.store().upsert_raw(Anchor::new("y", 1.0, 1.0, 1.0).with_last_updated(100));

        let dispatch = h.send(
            id,
            json!({"type": "fetchUpdates", "anchorData": [
                {"id": "x", "lastUpdated": 50},
                {"id": "y", "lastUpdated": 150},
                {"id": "unknown", "lastUpdated": 1}
            ]}),
        );
        assert_eq!(anchor_ids(&dispatch), ["x"]);
    }

    #[test]
    fn fetch_updates_for_current_sole_anchor_falls_back_to_full_store() {
        let h = Harness::new();
        let (id, _rx) = h.connect();
        h.store().upsert_raw(Anchor::new("x", 1.0, 1.0, 1.0).with_last_updated(100));

        let dispatch = h.send(
            id,
            json!({"type": "fetchUpdates", "anchorData": [{"id": "x", "lastUpdated": 150}]}),
        );
        assert_eq!(anchor_ids(&dispatch), ["x"]);
    }

    #[test]
    fn fetch_updates_for_unknown_claims_on_empty_store() {
        let h = Harness::new();
        let (id, _rx) = h.connect();
        let dispatch = h.send(
            id,
            json!({"type": "fetchUpdates", "anchorData": [{"id": "x", "lastUpdated": 150}]}),
        );
        assert_eq!(dispatch, Dispatch::Reply(ServerMessage::no_updates()));
    }

    #[test]
    fn bootstrap_then_fetch_returns_both_anchors() {
        let h = Harness::new();
        let (id, _rx) = h.connect();
        let dispatch = h.send(
            id,
            json!({"type": "fetchFirstUpdate", "anchorData": [
                {"id": "A", "latitude": 1, "longitude": 2, "altitude": 3},
                {"id": "B", "latitude": 4, "longitude": 5, "altitude": 6}
            ]}),
        );
        assert_eq!(anchor_ids(&dispatch), ["A", "B"]);

        let dispatch = h.send(id, json!({"type": "fetchUpdates", "anchorData": []}));
        assert_eq!(anchor_ids(&dispatch), ["A", "B"]);
    }

    #[test]
    fn bootstrap_never_overwrites_and_never_broadcasts() {
        let h = Harness::new();
        let (id, mut own_rx) = h.connect();
        let (_other, mut other_rx) = h.connect();
        drain(&mut own_rx);
        h.store().upsert_raw(Anchor::new("a", 1.0, 1.0, 1.0).with_last_updated(10));

        h.protocol.process(
            id,
            &json!({"type": "fetchFirstUpdate", "anchorData": [
                {"id": "a", "latitude": 99, "longitude": 99, "altitude": 99, "lastUpdated": 999}
            ]})
            .to_string(),
        );

        assert_eq!(
            h.store().get("a"),
            Some(Anchor::new("a", 1.0, 1.0, 1.0).with_last_updated(10))
        );
        assert_eq!(drain(&mut own_rx).len(), 1);
        assert!(drain(&mut other_rx).is_empty());
    }

    #[test]
    fn bootstrap_with_nothing_replies_current_store_even_if_empty() {
        let h = Harness::new();
        let (id, _rx) = h.connect();
        let dispatch = h.send(id, json!({"type": "fetchFirstUpdate", "anchorData": []}));
        assert_eq!(dispatch, Dispatch::Reply(ServerMessage::anchors(Vec::new())));
    }

    #[test]
    fn update_anchor_moves_record_and_broadcasts_to_everyone() {
        let h = Harness::new();
        let (sender, mut sender_rx) = h.connect();
        let (_other, mut other_rx) = h.connect();
        drain(&mut sender_rx);
        h.store().upsert_raw(Anchor::new("a1", 1.0, 2.0, 3.0));

        h.protocol.process(
            sender,
            &json!({"type": "updateAnchor", "anchorData": [
                {"id": "a1", "latitude": 9, "longitude": 2, "altitude": 3}
            ]})
            .to_string(),
        );

        assert_eq!(h.store().get("a1").unwrap().latitude, 9.0);
        let expected = ServerMessage::anchors(vec![Anchor::new("a1", 9.0, 2.0, 3.0)]);
        assert_eq!(drain(&mut sender_rx), vec![expected.clone()]);
        assert_eq!(drain(&mut other_rx), vec![expected]);
    }

    #[test]
    fn update_anchor_skips_entries_without_id() {
        let h = Harness::new();
        let (id, _rx) = h.connect();
        let dispatch = h.send(
            id,
            json!({"type": "updateAnchor", "anchorData": [
                {"latitude": 1, "longitude": 1, "altitude": 1},
                {"id": "ok", "latitude": 1, "longitude": 1, "altitude": 1}
            ]}),
        );
        assert_eq!(dispatch, Dispatch::BroadcastAnchors);
        assert_eq!(h.store().len(), 1);
        assert!(h.store().get("ok").is_some());
    }

    #[test]
    fn empty_update_still_broadcasts_full_store() {
        let h = Harness::new();
        let (sender, mut sender_rx) = h.connect();
        let (_other, mut other_rx) = h.connect();
        drain(&mut sender_rx);
        h.store().upsert_raw(Anchor::new("kept", 1.0, 2.0, 3.0));

        h.protocol
            .process(sender, &json!({"type": "updateAnchor", "anchorData": []}).to_string());

        let expected = ServerMessage::anchors(vec![Anchor::new("kept", 1.0, 2.0, 3.0)]);
        assert_eq!(drain(&mut sender_rx), vec![expected.clone()]);
        assert_eq!(drain(&mut other_rx), vec![expected]);
    }

    #[test]
    fn racing_updates_leave_watchers_with_the_full_store() {
        use std::sync::Barrier;

        for _ in 0..200 {
            let h = Harness::new();
            let (left, _left_rx) = h.connect();
            let (right, _right_rx) = h.connect();
            let (_watcher, mut watcher_rx) = h.connect();
            let barrier = Arc::new(Barrier::new(2));

            let writers: Vec<_> = [(left, "left"), (right, "right")]
                .into_iter()
                .map(|(from, anchor)| {
                    let protocol = h.protocol.clone();
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        let frame = json!({"type": "updateAnchor", "anchorData": [
                            {"id": anchor, "latitude": 1, "longitude": 1, "altitude": 1}
                        ]});
                        barrier.wait();
                        protocol.process(from, &frame.to_string());
                    })
                })
                .collect();
            for writer in writers {
                writer.join().unwrap();
            }

            let last = drain(&mut watcher_rx)
                .into_iter()
                .filter(|m| matches!(m, ServerMessage::UpdateAnchor { .. }))
                .last()
                .unwrap();
            let mut ids: Vec<_> = match last {
                ServerMessage::UpdateAnchor { anchor_data } => {
                    anchor_data.into_iter().map(|a| a.id).collect()
                }
                _ => unreachable!(),
            };
            ids.sort();
            assert_eq!(ids, ["left", "right"]);
        }
    }

    #[test]
    fn update_anchor_keeps_stamp_when_nothing_moved() {
        let h = Harness::new();
        let (id, _rx) = h.connect();
        let update = json!({"type": "updateAnchor", "anchorData": [
            {"id": "a", "latitude": 1, "longitude": 1, "altitude": 1, "lastUpdated": 5}
        ]});
        h.send(id, update);
        h.send(
            id,
            json!({"type": "updateAnchor", "anchorData": [
                {"id": "a", "latitude": 1, "longitude": 1, "altitude": 1, "lastUpdated": 6}
            ]}),
        );
        assert_eq!(h.store().get("a").unwrap().last_updated, Some(5));
    }

    #[test]
    fn update_anchor_without_array_is_dropped() {
        let h = Harness::new();
        let (id, _rx) = h.connect();
        let dispatch = h.send(id, json!({"type": "updateAnchor", "anchorData": {"id": "a"}}));
        assert_eq!(dispatch, Dispatch::Ignore);
    }

    #[test]
    fn unknown_and_malformed_messages_are_ignored() {
        let h = Harness::new();
        let (id, mut rx) = h.connect();

        assert_eq!(h.send(id, json!({"type": "teleport"})), Dispatch::Ignore);
        h.protocol.process(id, "{{{ not json");
        assert!(drain(&mut rx).is_empty());

        h.protocol
            .process(id, &json!({"type": "fetchUpdates", "anchorData": []}).to_string());
        assert_eq!(drain(&mut rx), vec![ServerMessage::no_updates()]);
    }

    #[test]
    fn status_flows_through_registry() {
        let h = Harness::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = h.protocol.registry().register(tx);
        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::StatusUpdated {
                status: ConnectionStatus::Connected,
                client_count: 1
            }]
        );
        h.protocol.registry().deregister(id);
        assert_eq!(h.protocol.registry().status(), ConnectionStatus::NotConnected);
    }
}
