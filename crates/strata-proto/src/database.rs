//! The authoritative database node.
//!
//! Holds the ground-truth store, owns every key's sequence number, and
//! coordinates critical writes with a two-phase agreement round across all
//! L1 caches. The database never crashes.
//!
//! Coordinator state machine per critical-write session:
//!
//! ```text
//! open ──CriticalUpdate to all L1s──► waiting
//! waiting + OK from every L1  ──► commit: seqno+1, apply, Commit to all L1s
//! waiting + NO from any L1    ──► abort: Abort to all L1s
//! waiting + vote timer fires  ──► abort: Abort to all L1s
//! ```
//!
//! Every terminal transition clears the session maps; late votes are dropped
//! by the session guard.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use strata_types::{Key, NodeId, QueryId, RequestKind, Seqno, Timing, Value};

use crate::hops::Hops;
use crate::message::{
    CriticalUpdate, CriticalUpdateResponse, CriticalWriteResponse, CwOutcome, Payload, Read,
    Response, Token, Vote, Write,
};
use crate::node::{NodeEvent, NodeOutput, Observation, TimeoutKind};
use crate::snapshot::SnapshotState;

/// The database node state machine.
#[derive(Debug)]
pub struct Database {
    id: NodeId,
    timing: Timing,

    /// Ground truth. Assumed to hold every key any client requests.
    store: BTreeMap<Key, Value>,

    /// Per-key sequence numbers; this node is the only writer.
    seqno: BTreeMap<Key, Seqno>,

    /// The L1 tier.
    children: Vec<NodeId>,

    /// Open critical-write sessions, by query.
    critical_session_key: HashMap<QueryId, Key>,

    /// Proposed value per key under a critical write.
    critical_key_value: HashMap<Key, Value>,

    /// L1 votes collected per session.
    acks: HashMap<QueryId, BTreeSet<NodeId>>,

    /// Reply path per session, replayed into the outcome multicast.
    session_hops: HashMap<QueryId, Hops>,

    snapshot: SnapshotState,
}

impl Database {
    /// Creates a database over an initial data set. Every key starts at
    /// seqno 0.
    pub fn new(id: NodeId, initial: BTreeMap<Key, Value>, timing: Timing) -> Self {
        let seqno = initial.keys().map(|&k| (k, Seqno::ZERO)).collect();
        Self {
            id,
            timing,
            store: initial,
            seqno,
            children: Vec::new(),
            critical_session_key: HashMap::new(),
            critical_key_value: HashMap::new(),
            acks: HashMap::new(),
            session_hops: HashMap::new(),
            snapshot: SnapshotState::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Current value of a key, for harness assertions.
    pub fn value_of(&self, key: Key) -> Option<Value> {
        self.store.get(&key).copied()
    }

    /// Current sequence number of a key.
    pub fn seqno_of(&self, key: Key) -> Seqno {
        self.seqno.get(&key).copied().unwrap_or(Seqno::ZERO)
    }

    /// Number of open critical-write sessions; zero at quiescence.
    pub fn open_sessions(&self) -> usize {
        self.critical_session_key.len()
    }

    /// Handles one event.
    pub fn handle(&mut self, event: NodeEvent) -> NodeOutput {
        match event {
            NodeEvent::Message { from, payload } => self.on_message(from, payload),
            NodeEvent::Timeout(TimeoutKind::CritWrite(qid)) => self.on_vote_timeout(qid),
            // The database owns no request timers and never crashes.
            NodeEvent::Timeout(TimeoutKind::Request(_))
            | NodeEvent::Operation(_)
            | NodeEvent::Crash
            | NodeEvent::Recover => NodeOutput::empty(),
        }
    }

    fn on_message(&mut self, from: NodeId, payload: Payload) -> NodeOutput {
        match payload {
            Payload::Join(join) => {
                self.children = join.children;
                NodeOutput::empty()
            }
            Payload::Read(read) => self.on_read(from, read),
            Payload::Write(write) => self.on_write(from, write),
            Payload::CriticalUpdateResponse(vote) => self.on_vote(from, vote),
            Payload::StartSnapshot => self.on_start_snapshot(),
            Payload::Token(token) => self.on_token(from, token),
            // Responses and critical updates never travel upward to the root.
            Payload::Response(_)
            | Payload::CriticalUpdate(_)
            | Payload::CriticalWriteResponse(_) => NodeOutput::empty(),
        }
    }

    // ========================================================================
    // Read Handler
    // ========================================================================

    /// Serves a read (plain or critical). A key frozen by an open
    /// critical-write session answers with `value: None`.
    fn on_read(&mut self, from: NodeId, read: Read) -> NodeOutput {
        let mut out = NodeOutput::empty();
        let kind = read.kind();
        let mut hops = read.hops;
        let _ = hops.pop();

        let seqno = self.seqno_of(read.key);
        let value = if self.critical_key_value.contains_key(&read.key) {
            None
        } else {
            self.store.get(&read.key).copied()
        };

        out.send(
            from,
            Payload::Response(Response {
                qid: read.qid,
                key: read.key,
                value,
                seqno,
                kind,
                critical: read.critical,
                hops,
            }),
        );
        out
    }

    // ========================================================================
    // Write Handler
    // ========================================================================

    fn on_write(&mut self, from: NodeId, write: Write) -> NodeOutput {
        if write.critical {
            return self.on_critical_write(from, write);
        }

        let mut out = NodeOutput::empty();
        let mut hops = write.hops;
        let _ = hops.pop();

        // A frozen key rejects plain writes outright.
        if self.critical_key_value.contains_key(&write.key) {
            out.observe(Observation::OpRejected {
                qid: write.qid,
                key: write.key,
                kind: RequestKind::Write,
            });
            out.send(
                from,
                Payload::Response(Response {
                    qid: write.qid,
                    key: write.key,
                    value: None,
                    seqno: self.seqno_of(write.key),
                    kind: RequestKind::Write,
                    critical: false,
                    hops,
                }),
            );
            return out;
        }

        let new_seqno = self.seqno_of(write.key).next();
        self.store.insert(write.key, write.value);
        self.seqno.insert(write.key, new_seqno);

        out.observe(Observation::Committed {
            qid: write.qid,
            key: write.key,
            value: write.value,
            seqno: new_seqno,
            critical: false,
        });

        // The write response doubles as the invalidation broadcast: every L1
        // applies it, and the one on the recorded path routes it onward to
        // the originator.
        out.multicast(
            &self.children,
            &Payload::Response(Response {
                qid: write.qid,
                key: write.key,
                value: Some(write.value),
                seqno: new_seqno,
                kind: RequestKind::Write,
                critical: false,
                hops,
            }),
        );
        out
    }

    fn on_critical_write(&mut self, from: NodeId, write: Write) -> NodeOutput {
        let mut out = NodeOutput::empty();
        let mut hops = write.hops;
        let _ = hops.pop();

        // At most one in-flight critical write per key: a second session on
        // the same key aborts immediately along the requester's path.
        if self.critical_key_value.contains_key(&write.key) {
            out.observe(Observation::OpRejected {
                qid: write.qid,
                key: write.key,
                kind: RequestKind::CritWrite,
            });
            out.send(
                from,
                Payload::CriticalWriteResponse(CriticalWriteResponse {
                    qid: write.qid,
                    outcome: CwOutcome::Abort,
                    new_seqno: None,
                    hops,
                }),
            );
            return out;
        }

        self.critical_session_key.insert(write.qid, write.key);
        self.critical_key_value.insert(write.key, write.value);
        self.session_hops.insert(write.qid, hops.clone());

        out.observe(Observation::CwBegun {
            qid: write.qid,
            key: write.key,
            value: write.value,
        });
        out.multicast(
            &self.children,
            &Payload::CriticalUpdate(CriticalUpdate {
                qid: write.qid,
                key: write.key,
                value: write.value,
                hops,
            }),
        );
        out.schedule(
            TimeoutKind::CritWrite(write.qid),
            self.timing.crit_write_timeout_ms,
        );
        out
    }

    // ========================================================================
    // Vote Collection
    // ========================================================================

    fn on_vote(&mut self, from: NodeId, vote: CriticalUpdateResponse) -> NodeOutput {
        // Session already closed: a late vote, drop it.
        if !self.critical_session_key.contains_key(&vote.qid) {
            return NodeOutput::empty();
        }

        match vote.vote {
            Vote::Ok => {
                let acks = self.acks.entry(vote.qid).or_default();
                acks.insert(from);
                if self.children.iter().all(|c| acks.contains(c)) {
                    self.commit(vote.qid)
                } else {
                    NodeOutput::empty()
                }
            }
            Vote::No => self.abort(vote.qid, true),
        }
    }

    fn on_vote_timeout(&mut self, qid: QueryId) -> NodeOutput {
        // The session may have closed just before the timer fired.
        if !self.critical_session_key.contains_key(&qid) {
            return NodeOutput::empty();
        }
        self.abort(qid, false)
    }

    fn commit(&mut self, qid: QueryId) -> NodeOutput {
        let mut out = NodeOutput::empty();
        out.cancel(TimeoutKind::CritWrite(qid));

        let (key, value, hops) = self.close_session(qid);
        let new_seqno = self.seqno_of(key).next();
        self.store.insert(key, value);
        self.seqno.insert(key, new_seqno);

        out.observe(Observation::Committed {
            qid,
            key,
            value,
            seqno: new_seqno,
            critical: true,
        });
        out.observe(Observation::CwResolved {
            qid,
            key,
            outcome: CwOutcome::Commit,
            seqno: Some(new_seqno),
        });
        out.multicast(
            &self.children,
            &Payload::CriticalWriteResponse(CriticalWriteResponse {
                qid,
                outcome: CwOutcome::Commit,
                new_seqno: Some(new_seqno),
                hops,
            }),
        );
        out
    }

    fn abort(&mut self, qid: QueryId, cancel_timer: bool) -> NodeOutput {
        let mut out = NodeOutput::empty();
        if cancel_timer {
            out.cancel(TimeoutKind::CritWrite(qid));
        }

        let (key, _value, hops) = self.close_session(qid);

        out.observe(Observation::CwResolved {
            qid,
            key,
            outcome: CwOutcome::Abort,
            seqno: None,
        });
        out.multicast(
            &self.children,
            &Payload::CriticalWriteResponse(CriticalWriteResponse {
                qid,
                outcome: CwOutcome::Abort,
                new_seqno: None,
                hops,
            }),
        );
        out
    }

    /// Removes every trace of a session and returns its key, proposed value,
    /// and reply path.
    fn close_session(&mut self, qid: QueryId) -> (Key, Value, Hops) {
        let key = self
            .critical_session_key
            .remove(&qid)
            .expect("session checked open by caller");
        let value = self
            .critical_key_value
            .remove(&key)
            .expect("open session always has a proposed value");
        let hops = self.session_hops.remove(&qid).unwrap_or_default();
        self.acks.remove(&qid);
        (key, value, hops)
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    fn on_start_snapshot(&mut self) -> NodeOutput {
        let mut out = NodeOutput::empty();
        let snapshot_id = self.snapshot.begin(&self.store, &self.seqno);
        out.multicast(&self.children, &Payload::Token(Token { snapshot_id }));
        out
    }

    fn on_token(&mut self, from: NodeId, token: Token) -> NodeOutput {
        let mut out = NodeOutput::empty();
        let action = self.snapshot.on_token(
            from,
            token.snapshot_id,
            &self.store,
            &self.seqno,
            &self.children,
        );
        if action.flood {
            out.multicast(
                &self.children,
                &Payload::Token(Token {
                    snapshot_id: token.snapshot_id,
                }),
            );
        }
        if let Some(cut) = action.completed {
            out.observe(Observation::SnapshotCut(cut));
        }
        out
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Join;

    fn db_with(entries: &[(u64, u64)], l1s: &[u64]) -> Database {
        let initial = entries
            .iter()
            .map(|&(k, v)| (Key::new(k), Value::new(v)))
            .collect();
        let mut db = Database::new(NodeId::new(100), initial, Timing::default());
        db.handle(NodeEvent::Message {
            from: NodeId::new(0),
            payload: Payload::Join(Join {
                parent: None,
                children: l1s.iter().copied().map(NodeId::new).collect(),
            }),
        });
        db
    }

    fn qid(n: u32) -> QueryId {
        QueryId::from_origin_and_local(NodeId::new(1), n)
    }

    fn read_req(q: QueryId, key: u64, critical: bool) -> Payload {
        Payload::Read(Read {
            qid: q,
            key: Key::new(key),
            critical,
            hops: Hops::from(vec![NodeId::new(1), NodeId::new(20), NodeId::new(10)]),
        })
    }

    fn write_req(q: QueryId, key: u64, value: u64, critical: bool) -> Payload {
        Payload::Write(Write {
            qid: q,
            key: Key::new(key),
            value: Value::new(value),
            critical,
            hops: Hops::from(vec![NodeId::new(1), NodeId::new(20), NodeId::new(10)]),
        })
    }

    fn response_of(out: &NodeOutput) -> &Response {
        match &out.messages[0].payload {
            Payload::Response(r) => r,
            other => panic!("expected response, got {}", other.label()),
        }
    }

    #[test]
    fn read_returns_value_and_seqno() {
        let mut db = db_with(&[(1, 10), (2, 20)], &[10, 11]);
        let out = db.handle(NodeEvent::Message {
            from: NodeId::new(10),
            payload: read_req(qid(0), 1, false),
        });

        assert_eq!(out.messages.len(), 1);
        assert_eq!(out.messages[0].to, NodeId::new(10));
        let resp = response_of(&out);
        assert_eq!(resp.value, Some(Value::new(10)));
        assert_eq!(resp.seqno, Seqno::ZERO);
        // The database peeled the requesting L1 off the path.
        assert_eq!(resp.hops.as_slice(), &[NodeId::new(1), NodeId::new(20)]);
    }

    #[test]
    fn plain_write_bumps_seqno_and_broadcasts() {
        let mut db = db_with(&[(1, 10)], &[10, 11]);
        let out = db.handle(NodeEvent::Message {
            from: NodeId::new(10),
            payload: write_req(qid(0), 1, 99, false),
        });

        assert_eq!(db.value_of(Key::new(1)), Some(Value::new(99)));
        assert_eq!(db.seqno_of(Key::new(1)), Seqno::new(1));

        // One copy per L1.
        assert_eq!(out.messages.len(), 2);
        for outbound in &out.messages {
            let resp = match &outbound.payload {
                Payload::Response(r) => r,
                other => panic!("expected response, got {}", other.label()),
            };
            assert_eq!(resp.value, Some(Value::new(99)));
            assert_eq!(resp.seqno, Seqno::new(1));
        }
    }

    #[test]
    fn critical_write_opens_session_and_freezes_key() {
        let mut db = db_with(&[(2, 20)], &[10, 11]);
        let out = db.handle(NodeEvent::Message {
            from: NodeId::new(10),
            payload: write_req(qid(0), 2, 77, true),
        });

        assert_eq!(db.open_sessions(), 1);
        // Value untouched until the round commits.
        assert_eq!(db.value_of(Key::new(2)), Some(Value::new(20)));
        assert_eq!(out.messages.len(), 2);
        assert!(matches!(out.messages[0].payload, Payload::CriticalUpdate(_)));
        assert!(out
            .timers
            .iter()
            .any(|t| matches!(t, crate::node::TimerCmd::Schedule { .. })));

        // Plain reads of the frozen key fail while the session is open.
        let out = db.handle(NodeEvent::Message {
            from: NodeId::new(11),
            payload: read_req(qid(1), 2, false),
        });
        assert!(response_of(&out).value.is_none());

        // Plain writes are rejected too.
        let out = db.handle(NodeEvent::Message {
            from: NodeId::new(11),
            payload: write_req(qid(2), 2, 1, false),
        });
        assert!(response_of(&out).value.is_none());
        assert_eq!(db.value_of(Key::new(2)), Some(Value::new(20)));
    }

    #[test]
    fn all_votes_ok_commits() {
        let mut db = db_with(&[(2, 20)], &[10, 11]);
        db.handle(NodeEvent::Message {
            from: NodeId::new(10),
            payload: write_req(qid(0), 2, 77, true),
        });

        let out = db.handle(NodeEvent::Message {
            from: NodeId::new(10),
            payload: Payload::CriticalUpdateResponse(CriticalUpdateResponse {
                qid: qid(0),
                vote: Vote::Ok,
            }),
        });
        assert!(out.messages.is_empty(), "one vote is not a quorum");

        let out = db.handle(NodeEvent::Message {
            from: NodeId::new(11),
            payload: Payload::CriticalUpdateResponse(CriticalUpdateResponse {
                qid: qid(0),
                vote: Vote::Ok,
            }),
        });

        assert_eq!(db.value_of(Key::new(2)), Some(Value::new(77)));
        assert_eq!(db.seqno_of(Key::new(2)), Seqno::new(1));
        assert_eq!(db.open_sessions(), 0);
        assert_eq!(out.messages.len(), 2);
        for outbound in &out.messages {
            match &outbound.payload {
                Payload::CriticalWriteResponse(cwr) => {
                    assert_eq!(cwr.outcome, CwOutcome::Commit);
                    assert_eq!(cwr.new_seqno, Some(Seqno::new(1)));
                }
                other => panic!("expected outcome, got {}", other.label()),
            }
        }
    }

    #[test]
    fn single_no_vote_aborts() {
        let mut db = db_with(&[(2, 20)], &[10, 11]);
        db.handle(NodeEvent::Message {
            from: NodeId::new(10),
            payload: write_req(qid(0), 2, 77, true),
        });

        let out = db.handle(NodeEvent::Message {
            from: NodeId::new(11),
            payload: Payload::CriticalUpdateResponse(CriticalUpdateResponse {
                qid: qid(0),
                vote: Vote::No,
            }),
        });

        assert_eq!(db.value_of(Key::new(2)), Some(Value::new(20)));
        assert_eq!(db.seqno_of(Key::new(2)), Seqno::ZERO);
        assert_eq!(db.open_sessions(), 0);
        for outbound in &out.messages {
            match &outbound.payload {
                Payload::CriticalWriteResponse(cwr) => {
                    assert_eq!(cwr.outcome, CwOutcome::Abort);
                    assert_eq!(cwr.new_seqno, None);
                }
                other => panic!("expected outcome, got {}", other.label()),
            }
        }

        // The key thaws: plain writes succeed again.
        let out = db.handle(NodeEvent::Message {
            from: NodeId::new(10),
            payload: write_req(qid(1), 2, 5, false),
        });
        assert!(!out.messages.is_empty());
        assert_eq!(db.value_of(Key::new(2)), Some(Value::new(5)));
    }

    #[test]
    fn vote_timeout_aborts_and_clears_session() {
        let mut db = db_with(&[(2, 20)], &[10, 11]);
        db.handle(NodeEvent::Message {
            from: NodeId::new(10),
            payload: write_req(qid(0), 2, 77, true),
        });

        let out = db.handle(NodeEvent::Timeout(TimeoutKind::CritWrite(qid(0))));
        assert_eq!(db.open_sessions(), 0);
        assert!(matches!(
            out.messages[0].payload,
            Payload::CriticalWriteResponse(CriticalWriteResponse {
                outcome: CwOutcome::Abort,
                ..
            })
        ));

        // A straggler vote after the abort is dropped.
        let out = db.handle(NodeEvent::Message {
            from: NodeId::new(10),
            payload: Payload::CriticalUpdateResponse(CriticalUpdateResponse {
                qid: qid(0),
                vote: Vote::Ok,
            }),
        });
        assert!(out.is_empty());
    }

    #[test]
    fn second_critical_write_on_same_key_aborts_immediately() {
        let mut db = db_with(&[(2, 20)], &[10, 11]);
        db.handle(NodeEvent::Message {
            from: NodeId::new(10),
            payload: write_req(qid(0), 2, 77, true),
        });

        let out = db.handle(NodeEvent::Message {
            from: NodeId::new(11),
            payload: write_req(qid(1), 2, 88, true),
        });

        assert_eq!(db.open_sessions(), 1);
        assert_eq!(out.messages.len(), 1);
        assert_eq!(out.messages[0].to, NodeId::new(11));
        assert!(matches!(
            out.messages[0].payload,
            Payload::CriticalWriteResponse(CriticalWriteResponse {
                outcome: CwOutcome::Abort,
                ..
            })
        ));
    }

    #[test]
    fn snapshot_floods_tokens_and_completes() {
        let mut db = db_with(&[(1, 10)], &[10, 11]);
        let out = db.handle(NodeEvent::Message {
            from: db.id(),
            payload: Payload::StartSnapshot,
        });
        assert_eq!(out.messages.len(), 2);
        assert!(matches!(
            out.messages[0].payload,
            Payload::Token(Token { snapshot_id: 1 })
        ));

        let out = db.handle(NodeEvent::Message {
            from: NodeId::new(10),
            payload: Payload::Token(Token { snapshot_id: 1 }),
        });
        assert!(out.observations.is_empty());

        let out = db.handle(NodeEvent::Message {
            from: NodeId::new(11),
            payload: Payload::Token(Token { snapshot_id: 1 }),
        });
        assert!(matches!(
            out.observations.as_slice(),
            [Observation::SnapshotCut(cut)] if cut.snapshot_id == 1
        ));
    }
}
