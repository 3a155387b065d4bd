//! Node surface: events in, output out.
//!
//! Every node in the hierarchy is a pure, deterministic state machine: it
//! consumes a [`NodeEvent`] and returns a [`NodeOutput`] describing the
//! messages to send, the timers to arm or disarm, and the domain
//! observations to log. The surrounding runtime (the simulation harness)
//! owns clocks, randomness, and delivery; nodes own nothing but their state.

use serde::{Deserialize, Serialize};
use strata_types::{Key, NodeId, QueryId, RequestKind, Seqno, Value};

use crate::message::{CwOutcome, Payload, Vote};
use crate::snapshot::SnapshotCut;

// ============================================================================
// Events
// ============================================================================

/// An input to a node's state machine.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// A message delivered from another node.
    Message { from: NodeId, payload: Payload },

    /// A previously armed timer fired.
    Timeout(TimeoutKind),

    /// The workload driver hands a client an operation to issue.
    Operation(ClientOp),

    /// The node crash-stops; only caches crash.
    Crash,

    /// The node comes back up after the recovery delay (cold restart).
    Recover,
}

/// Timer classes a node can arm.
///
/// Timers are keyed by `(owner, kind)`, so a request timer and a vote timer
/// for the same query coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    /// Per-request deadline at a client or a forwarding cache.
    Request(QueryId),

    /// Vote-collection window: the database waiting for L1 votes, or an L1
    /// waiting for its L2 children.
    CritWrite(QueryId),
}

/// An operation a client issues into the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOp {
    pub kind: RequestKind,
    pub key: Key,
    /// The value to write; `None` for reads.
    pub value: Option<Value>,
}

// ============================================================================
// Output
// ============================================================================

/// A message addressed to another node.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: NodeId,
    pub payload: Payload,
}

/// Timer instruction emitted by a node.
#[derive(Debug, Clone, Copy)]
pub enum TimerCmd {
    /// Arm a one-shot timer; re-arming an armed kind replaces it.
    Schedule { kind: TimeoutKind, delay_ms: u64 },

    /// Disarm a timer; idempotent.
    Cancel { kind: TimeoutKind },
}

/// Output produced by a node handling one event.
///
/// The runtime is responsible for sending the messages (through whatever
/// transport it owns), applying the timer commands, and recording the
/// observations.
#[derive(Debug, Default)]
pub struct NodeOutput {
    /// Messages to send.
    pub messages: Vec<Outbound>,

    /// Timers to arm or disarm.
    pub timers: Vec<TimerCmd>,

    /// Domain events for the shared trace.
    pub observations: Vec<Observation>,
}

impl NodeOutput {
    /// Creates an empty output.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Queues a message.
    pub fn send(&mut self, to: NodeId, payload: Payload) {
        self.messages.push(Outbound { to, payload });
    }

    /// Queues the same payload to every listed node.
    pub fn multicast(&mut self, group: &[NodeId], payload: &Payload) {
        for &to in group {
            self.messages.push(Outbound {
                to,
                payload: payload.clone(),
            });
        }
    }

    /// Arms a one-shot timer.
    pub fn schedule(&mut self, kind: TimeoutKind, delay_ms: u64) {
        self.timers.push(TimerCmd::Schedule { kind, delay_ms });
    }

    /// Disarms a timer.
    pub fn cancel(&mut self, kind: TimeoutKind) {
        self.timers.push(TimerCmd::Cancel { kind });
    }

    /// Records a domain observation.
    pub fn observe(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    /// Returns true if nothing was produced.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.timers.is_empty() && self.observations.is_empty()
    }

    /// Merges another output into this one.
    pub fn merge(&mut self, other: NodeOutput) {
        self.messages.extend(other.messages);
        self.timers.extend(other.timers);
        self.observations.extend(other.observations);
    }
}

// ============================================================================
// Observations
// ============================================================================

/// A domain event recorded into the shared trace.
///
/// The consistency checkers replay these (plus the runtime's send/deliver
/// records) to verify the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Observation {
    /// A cache stored a newer `(value, seqno)` for a key.
    Applied {
        qid: QueryId,
        key: Key,
        value: Value,
        seqno: Seqno,
    },

    /// A cache discarded an update older than what it holds.
    StaleDropped {
        qid: QueryId,
        key: Key,
        incoming: Seqno,
        cached: Seqno,
    },

    /// The database committed a write (plain or critical).
    Committed {
        qid: QueryId,
        key: Key,
        value: Value,
        seqno: Seqno,
        critical: bool,
    },

    /// The database refused a plain operation on a frozen key.
    OpRejected {
        qid: QueryId,
        key: Key,
        kind: RequestKind,
    },

    /// The database opened a critical-write session.
    CwBegun { qid: QueryId, key: Key, value: Value },

    /// A cache cast its vote in a critical-write round.
    CwVoted { qid: QueryId, vote: Vote },

    /// The database closed a critical-write session.
    CwResolved {
        qid: QueryId,
        key: Key,
        outcome: CwOutcome,
        seqno: Option<Seqno>,
    },

    /// A cache applied a committed critical write.
    CwApplied {
        qid: QueryId,
        key: Key,
        value: Value,
        seqno: Seqno,
    },

    /// A client received a successful response.
    ClientObserved {
        qid: QueryId,
        kind: RequestKind,
        key: Key,
        value: Option<Value>,
        seqno: Seqno,
        critical: bool,
    },

    /// A client received a failure response (frozen key or upstream abort).
    ClientFailed {
        qid: QueryId,
        kind: RequestKind,
        key: Key,
    },

    /// A client gave up on a request.
    ClientTimedOut {
        qid: QueryId,
        kind: RequestKind,
        key: Key,
    },

    /// A snapshot participant completed its round.
    SnapshotCut(SnapshotCut),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Token;

    #[test]
    fn output_collects_messages_and_timers() {
        let mut out = NodeOutput::empty();
        assert!(out.is_empty());

        out.send(NodeId::new(2), Payload::Token(Token { snapshot_id: 1 }));
        out.schedule(
            TimeoutKind::Request(QueryId::from_origin_and_local(NodeId::new(1), 0)),
            100,
        );

        assert_eq!(out.messages.len(), 1);
        assert_eq!(out.timers.len(), 1);
        assert!(!out.is_empty());
    }

    #[test]
    fn multicast_excludes_nobody() {
        let mut out = NodeOutput::empty();
        let group = [NodeId::new(1), NodeId::new(2), NodeId::new(3)];
        out.multicast(&group, &Payload::StartSnapshot);
        assert_eq!(out.messages.len(), 3);
        let targets: Vec<NodeId> = out.messages.iter().map(|m| m.to).collect();
        assert_eq!(targets, group);
    }

    #[test]
    fn merge_concatenates() {
        let mut a = NodeOutput::empty();
        a.send(NodeId::new(1), Payload::StartSnapshot);

        let mut b = NodeOutput::empty();
        b.send(NodeId::new(2), Payload::StartSnapshot);
        b.observe(Observation::ClientFailed {
            qid: QueryId::from_origin_and_local(NodeId::new(9), 1),
            kind: RequestKind::Read,
            key: Key::new(0),
        });

        a.merge(b);
        assert_eq!(a.messages.len(), 2);
        assert_eq!(a.observations.len(), 1);
    }

    #[test]
    fn timer_kinds_are_distinct_per_query() {
        let qid = QueryId::from_origin_and_local(NodeId::new(1), 7);
        assert_ne!(TimeoutKind::Request(qid), TimeoutKind::CritWrite(qid));
    }
}
