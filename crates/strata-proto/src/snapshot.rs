//! Chandy-Lamport distributed snapshot engine.
//!
//! Shared by the database and both cache tiers. Each participant embeds a
//! [`SnapshotState`] and feeds it tokens and in-flight data messages; the
//! engine tells the node when to flood tokens to its peers and hands back a
//! completed [`SnapshotCut`] once markers have arrived on every channel.
//!
//! Peer sets are owned by the caller: the database's peers are its L1s, an
//! L1's peers are the database plus its L2 children, and an L2's only peer
//! is its L1 (clients do not participate).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strata_types::{Key, NodeId, Seqno, Value};

// ============================================================================
// Snapshot Cut
// ============================================================================

/// The completed local cut of one snapshot round: captured state plus
/// everything recorded on still-open channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCut {
    pub snapshot_id: u64,
    pub store: BTreeMap<Key, Value>,
    pub seqno: BTreeMap<Key, Seqno>,
    pub transit_data: BTreeMap<Key, Value>,
    pub transit_seqno: BTreeMap<Key, Seqno>,
}

// ============================================================================
// Snapshot State
// ============================================================================

/// Per-participant snapshot recording state.
#[derive(Debug, Clone, Default)]
pub struct SnapshotState {
    /// True while a round is in progress at this node.
    captured: bool,

    /// Identifier of the current (or last) round.
    snapshot_id: u64,

    captured_store: BTreeMap<Key, Value>,
    captured_seqno: BTreeMap<Key, Seqno>,
    transit_data: BTreeMap<Key, Value>,
    transit_seqno: BTreeMap<Key, Seqno>,

    /// Peers whose marker has arrived; their channels are closed.
    tokens_from: BTreeSet<NodeId>,
}

/// What the node must do after feeding a token to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAction {
    /// True when this token made the node capture: flood tokens to peers.
    pub flood: bool,

    /// Present when this token closed the last channel.
    pub completed: Option<SnapshotCut>,
}

impl SnapshotState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a round is in progress.
    pub fn in_progress(&self) -> bool {
        self.captured
    }

    /// The current snapshot round id.
    pub fn snapshot_id(&self) -> u64 {
        self.snapshot_id
    }

    /// Opens a round at the initiator (the database): bumps the round id and
    /// captures local state. The caller floods tokens to all peers.
    ///
    /// A previous round still open (a participant crashed before its marker
    /// came back) is discarded: its partial result was never going to be
    /// usable.
    pub fn begin(&mut self, store: &BTreeMap<Key, Value>, seqno: &BTreeMap<Key, Seqno>) -> u64 {
        self.reset();
        self.snapshot_id += 1;
        self.capture(store, seqno);
        self.snapshot_id
    }

    /// Feeds a received token to the engine.
    ///
    /// Adopts the round id, closes the sender's channel, captures local
    /// state on the first token of the round, and completes the round once
    /// every peer's channel is closed. A token from a newer round discards
    /// whatever was left of the previous one.
    pub fn on_token(
        &mut self,
        from: NodeId,
        snapshot_id: u64,
        store: &BTreeMap<Key, Value>,
        seqno: &BTreeMap<Key, Seqno>,
        peers: &[NodeId],
    ) -> TokenAction {
        if self.captured && snapshot_id != self.snapshot_id {
            self.reset();
        }
        self.snapshot_id = snapshot_id;
        self.tokens_from.insert(from);

        let flood = if self.captured {
            false
        } else {
            self.capture(store, seqno);
            true
        };

        let completed = if peers.iter().all(|p| self.tokens_from.contains(p)) {
            Some(self.finish())
        } else {
            None
        };

        TokenAction { flood, completed }
    }

    /// Records a data message arriving on a channel that is still open.
    ///
    /// No-op unless a round is in progress and the sender's marker has not
    /// arrived yet.
    pub fn record_transit(
        &mut self,
        from: NodeId,
        key: Key,
        value: Value,
        seqno: Option<Seqno>,
    ) {
        if !self.captured || self.tokens_from.contains(&from) {
            return;
        }
        self.transit_data.insert(key, value);
        if let Some(s) = seqno {
            self.transit_seqno.insert(key, s);
        }
    }

    /// Clears all recording state, e.g. on a cache cold restart.
    pub fn reset(&mut self) {
        let id = self.snapshot_id;
        *self = Self::default();
        self.snapshot_id = id;
    }

    fn capture(&mut self, store: &BTreeMap<Key, Value>, seqno: &BTreeMap<Key, Seqno>) {
        self.captured = true;
        self.captured_store = store.clone();
        self.captured_seqno = seqno.clone();
    }

    fn finish(&mut self) -> SnapshotCut {
        let cut = SnapshotCut {
            snapshot_id: self.snapshot_id,
            store: std::mem::take(&mut self.captured_store),
            seqno: std::mem::take(&mut self.captured_seqno),
            transit_data: std::mem::take(&mut self.transit_data),
            transit_seqno: std::mem::take(&mut self.transit_seqno),
        };
        self.captured = false;
        self.tokens_from.clear();
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64) -> NodeId {
        NodeId::new(id)
    }

    fn store_of(pairs: &[(u64, u64)]) -> (BTreeMap<Key, Value>, BTreeMap<Key, Seqno>) {
        let store = pairs
            .iter()
            .map(|&(k, v)| (Key::new(k), Value::new(v)))
            .collect();
        let seqno = pairs.iter().map(|&(k, _)| (Key::new(k), Seqno::ZERO)).collect();
        (store, seqno)
    }

    #[test]
    fn initiator_captures_and_bumps_round() {
        let (store, seqno) = store_of(&[(1, 10)]);
        let mut snap = SnapshotState::new();

        assert_eq!(snap.begin(&store, &seqno), 1);
        assert!(snap.in_progress());

        // Round completes, then a second begin bumps again.
        let action = snap.on_token(node(2), 1, &store, &seqno, &[node(2)]);
        assert!(action.completed.is_some());
        assert_eq!(snap.begin(&store, &seqno), 2);
    }

    #[test]
    fn first_token_triggers_capture_and_flood() {
        let (store, seqno) = store_of(&[(1, 10), (2, 20)]);
        let mut snap = SnapshotState::new();

        let action = snap.on_token(node(9), 4, &store, &seqno, &[node(9), node(8)]);
        assert!(action.flood);
        assert!(action.completed.is_none());
        assert_eq!(snap.snapshot_id(), 4);

        // Second token from the remaining peer completes without re-flooding.
        let action = snap.on_token(node(8), 4, &store, &seqno, &[node(9), node(8)]);
        assert!(!action.flood);
        let cut = action.completed.expect("round should complete");
        assert_eq!(cut.snapshot_id, 4);
        assert_eq!(cut.store.get(&Key::new(1)), Some(&Value::new(10)));
        assert!(!snap.in_progress());
    }

    #[test]
    fn transit_recorded_only_on_open_channels() {
        let (store, seqno) = store_of(&[(1, 10)]);
        let mut snap = SnapshotState::new();
        let peers = [node(7), node(8)];

        // Not in a round: nothing recorded.
        snap.record_transit(node(7), Key::new(5), Value::new(50), Some(Seqno::new(1)));

        snap.on_token(node(7), 1, &store, &seqno, &peers);

        // Channel from 7 is closed, channel from 8 still open.
        snap.record_transit(node(7), Key::new(5), Value::new(50), Some(Seqno::new(1)));
        snap.record_transit(node(8), Key::new(6), Value::new(60), Some(Seqno::new(2)));

        let cut = snap
            .on_token(node(8), 1, &store, &seqno, &peers)
            .completed
            .expect("round should complete");
        assert_eq!(cut.transit_data.len(), 1);
        assert_eq!(cut.transit_data.get(&Key::new(6)), Some(&Value::new(60)));
        assert_eq!(cut.transit_seqno.get(&Key::new(6)), Some(&Seqno::new(2)));
    }

    #[test]
    fn newer_round_discards_a_wedged_one() {
        let (store, seqno) = store_of(&[(1, 10)]);
        let mut snap = SnapshotState::new();
        let peers = [node(7), node(8)];

        // Round 1 never completes: peer 8's marker is lost.
        snap.on_token(node(7), 1, &store, &seqno, &peers);
        snap.record_transit(node(8), Key::new(9), Value::new(90), None);
        assert!(snap.in_progress());

        // Round 2 starts clean and completes.
        let action = snap.on_token(node(7), 2, &store, &seqno, &peers);
        assert!(action.flood, "fresh round captures again");
        let cut = snap
            .on_token(node(8), 2, &store, &seqno, &peers)
            .completed
            .expect("round 2 completes");
        assert_eq!(cut.snapshot_id, 2);
        assert!(cut.transit_data.is_empty(), "round 1 leftovers discarded");
    }

    #[test]
    fn reset_clears_recording_but_keeps_round_id() {
        let (store, seqno) = store_of(&[(1, 10)]);
        let mut snap = SnapshotState::new();
        snap.on_token(node(7), 3, &store, &seqno, &[node(7), node(8)]);
        assert!(snap.in_progress());

        snap.reset();
        assert!(!snap.in_progress());
        assert_eq!(snap.snapshot_id(), 3);
    }
}
