//! The cache node, parameterized over its tier.
//!
//! L1 and L2 run the same state machine with different neighbours: an L1
//! sits between the database and a group of L2s, an L2 between an L1 and a
//! group of clients. Differences are confined to fan-out decisions (only a
//! cache tier re-broadcasts updates; clients always get targeted messages)
//! and to the critical-write round, where an L1 aggregates its children's
//! votes while an L2 votes directly.
//!
//! A cache may crash-stop at any point. While crashed it consumes every
//! event silently except recovery, which performs a cold restart: store,
//! sequence numbers, pending requests, locks, sessions, and snapshot
//! recording are all discarded.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use strata_types::{Key, NodeId, QueryId, RequestKind, Seqno, Timing, Value};

use crate::hops::Hops;
use crate::message::{
    CriticalUpdate, CriticalUpdateResponse, CriticalWriteResponse, CwOutcome, Payload, Read,
    Response, Token, Vote, Write,
};
use crate::node::{NodeEvent, NodeOutput, Observation, TimeoutKind};
use crate::snapshot::SnapshotState;

// ============================================================================
// Tier & Bookkeeping
// ============================================================================

/// Which level of the hierarchy this cache sits at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// Fronts the database; children are L2 caches.
    L1,
    /// Fronts the clients; children are clients.
    L2,
}

/// A request forwarded upward, awaiting its response.
#[derive(Debug, Clone)]
struct PendingRequest {
    key: Key,
    kind: RequestKind,
    critical: bool,
    /// The route stack as the request arrived, used to answer the
    /// originator directly if the upstream times out.
    reply_hops: Hops,
}

/// A critical-write round observed at this cache.
#[derive(Debug, Clone)]
struct CwSession {
    key: Key,
    value: Value,
    /// L1 only: OK votes collected from children.
    votes: BTreeSet<NodeId>,
    /// L1 only: set once this cache has answered the database, so late
    /// child votes and the vote timer stop mattering.
    replied: bool,
}

// ============================================================================
// Cache Node
// ============================================================================

/// An L1 or L2 cache node state machine.
#[derive(Debug)]
pub struct CacheNode {
    id: NodeId,
    tier: CacheTier,
    timing: Timing,

    parent: NodeId,
    children: Vec<NodeId>,

    store: BTreeMap<Key, Value>,
    seqno: BTreeMap<Key, Seqno>,
    pending: HashMap<QueryId, PendingRequest>,
    locked: BTreeSet<Key>,
    cw_sessions: HashMap<QueryId, CwSession>,

    crashed: bool,
    snapshot: SnapshotState,
}

impl CacheNode {
    pub fn new(id: NodeId, tier: CacheTier, timing: Timing) -> Self {
        Self {
            id,
            tier,
            timing,
            parent: NodeId::default(),
            children: Vec::new(),
            store: BTreeMap::new(),
            seqno: BTreeMap::new(),
            pending: HashMap::new(),
            locked: BTreeSet::new(),
            cw_sessions: HashMap::new(),
            crashed: false,
            snapshot: SnapshotState::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tier(&self) -> CacheTier {
        self.tier
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed
    }

    /// Cached value of a key, for harness assertions.
    pub fn value_of(&self, key: Key) -> Option<Value> {
        self.store.get(&key).copied()
    }

    /// Cached sequence number of a key.
    pub fn seqno_of(&self, key: Key) -> Seqno {
        self.seqno.get(&key).copied().unwrap_or(Seqno::ZERO)
    }

    /// In-flight forwarded requests; zero at quiescence.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Keys frozen by an observed critical write; zero at quiescence.
    pub fn locked_len(&self) -> usize {
        self.locked.len()
    }

    /// Open critical-write sessions; zero at quiescence.
    pub fn open_sessions(&self) -> usize {
        self.cw_sessions.len()
    }

    /// Handles one event.
    pub fn handle(&mut self, event: NodeEvent) -> NodeOutput {
        if self.crashed {
            // A crashed cache is deaf to everything but recovery.
            return match event {
                NodeEvent::Recover => self.on_recover(),
                _ => NodeOutput::empty(),
            };
        }

        match event {
            NodeEvent::Message { from, payload } => self.on_message(from, payload),
            NodeEvent::Timeout(TimeoutKind::Request(qid)) => self.on_request_timeout(qid),
            NodeEvent::Timeout(TimeoutKind::CritWrite(qid)) => self.on_vote_timeout(qid),
            NodeEvent::Crash => {
                self.crashed = true;
                NodeOutput::empty()
            }
            NodeEvent::Recover | NodeEvent::Operation(_) => NodeOutput::empty(),
        }
    }

    fn on_message(&mut self, from: NodeId, payload: Payload) -> NodeOutput {
        self.record_transit(from, &payload);

        match payload {
            Payload::Join(join) => {
                if let Some(parent) = join.parent {
                    self.parent = parent;
                }
                self.children = join.children;
                NodeOutput::empty()
            }
            Payload::Read(read) => self.on_read(read),
            Payload::Write(write) => self.on_write(write),
            Payload::Response(resp) => self.on_response(from, resp),
            Payload::CriticalUpdate(update) => self.on_critical_update(from, update),
            Payload::CriticalUpdateResponse(vote) => self.on_child_vote(from, vote),
            Payload::CriticalWriteResponse(cwr) => self.on_cw_outcome(cwr),
            Payload::Token(token) => self.on_token(from, token),
            Payload::StartSnapshot => NodeOutput::empty(),
        }
    }

    /// Snapshot channel recording: while this node's state is captured and
    /// the sender's marker has not arrived, data-carrying messages count as
    /// in transit.
    fn record_transit(&mut self, from: NodeId, payload: &Payload) {
        match payload {
            Payload::Response(resp) => {
                if let Some(value) = resp.value {
                    self.snapshot
                        .record_transit(from, resp.key, value, Some(resp.seqno));
                }
            }
            Payload::CriticalUpdate(update) => {
                self.snapshot
                    .record_transit(from, update.key, update.value, None);
            }
            _ => {}
        }
    }

    // ========================================================================
    // Upward Requests
    // ========================================================================

    fn on_read(&mut self, read: Read) -> NodeOutput {
        let mut out = NodeOutput::empty();
        let kind = read.kind();
        let Read {
            qid,
            key,
            critical,
            hops,
        } = read;

        // Plain reads may be served locally. Critical reads always go to the
        // database: a cached value may predate a commit in flight.
        if !critical && !self.locked.contains(&key) {
            if let Some(&value) = self.store.get(&key) {
                let mut hops = hops;
                let next = hops.pop().expect("request hops always name the sender");
                out.send(
                    next,
                    Payload::Response(Response {
                        qid,
                        key,
                        value: Some(value),
                        seqno: self.seqno_of(key),
                        kind,
                        critical: false,
                        hops,
                    }),
                );
                return out;
            }
        }

        self.forward_up(&mut out, qid, key, kind, critical, hops.clone());
        let mut hops = hops;
        hops.push(self.id);
        out.send(
            self.parent,
            Payload::Read(Read {
                qid,
                key,
                critical,
                hops,
            }),
        );
        out
    }

    fn on_write(&mut self, write: Write) -> NodeOutput {
        let mut out = NodeOutput::empty();
        let kind = write.kind();
        let Write {
            qid,
            key,
            value,
            critical,
            hops,
        } = write;

        self.forward_up(&mut out, qid, key, kind, critical, hops.clone());
        let mut hops = hops;
        hops.push(self.id);
        out.send(
            self.parent,
            Payload::Write(Write {
                qid,
                key,
                value,
                critical,
                hops,
            }),
        );
        out
    }

    /// Records the pending entry and arms the upstream deadline shared by
    /// both request kinds.
    fn forward_up(
        &mut self,
        out: &mut NodeOutput,
        qid: QueryId,
        key: Key,
        kind: RequestKind,
        critical: bool,
        reply_hops: Hops,
    ) {
        self.pending.insert(
            qid,
            PendingRequest {
                key,
                kind,
                critical,
                reply_hops,
            },
        );
        out.schedule(TimeoutKind::Request(qid), self.timing.request_timeout_ms);
    }

    // ========================================================================
    // Downward Responses
    // ========================================================================

    fn on_response(&mut self, from: NodeId, resp: Response) -> NodeOutput {
        let mut out = NodeOutput::empty();

        // Adopt newer data; drop reordered stale updates silently.
        if let Some(value) = resp.value {
            self.apply_if_newer(&mut out, resp.qid, resp.key, value, resp.seqno);
        }

        // A successful plain-write response from upstream is the
        // invalidation broadcast: an L1 relays it to every L2 below it.
        // Clients are not caches, so an L2 never re-broadcasts, and a
        // failure response has nothing to invalidate.
        if self.tier == CacheTier::L1
            && resp.kind == RequestKind::Write
            && resp.value.is_some()
            && from == self.parent
        {
            out.multicast(&self.children, &Payload::Response(resp.clone()));
        }

        // If this request is ours, walk it back toward the originator.
        if self.pending.remove(&resp.qid).is_some() {
            out.cancel(TimeoutKind::Request(resp.qid));

            let mut resp = resp;
            resp.hops.drop_trailing(self.id);
            if let Some(next) = resp.hops.pop() {
                out.send(next, Payload::Response(resp));
            }
        }
        out
    }

    fn apply_if_newer(
        &mut self,
        out: &mut NodeOutput,
        qid: QueryId,
        key: Key,
        value: Value,
        incoming: Seqno,
    ) {
        // A key this cache has never held is adopted at whatever seqno it
        // arrives with, zero included; a held key only moves forward.
        match self.seqno.get(&key) {
            Some(&cached) if incoming < cached => {
                out.observe(Observation::StaleDropped {
                    qid,
                    key,
                    incoming,
                    cached,
                });
            }
            Some(&cached) if incoming == cached => {}
            _ => {
                self.store.insert(key, value);
                self.seqno.insert(key, incoming);
                out.observe(Observation::Applied {
                    qid,
                    key,
                    value,
                    seqno: incoming,
                });
            }
        }
    }

    // ========================================================================
    // Critical-Write Round
    // ========================================================================

    fn on_critical_update(&mut self, from: NodeId, update: CriticalUpdate) -> NodeOutput {
        let mut out = NodeOutput::empty();

        // A key already frozen by a different session is a conflict: vote NO
        // without recording anything.
        if self.locked.contains(&update.key) {
            out.observe(Observation::CwVoted {
                qid: update.qid,
                vote: Vote::No,
            });
            out.send(
                from,
                Payload::CriticalUpdateResponse(CriticalUpdateResponse {
                    qid: update.qid,
                    vote: Vote::No,
                }),
            );
            return out;
        }

        self.locked.insert(update.key);
        self.cw_sessions.insert(
            update.qid,
            CwSession {
                key: update.key,
                value: update.value,
                votes: BTreeSet::new(),
                replied: false,
            },
        );

        match self.tier {
            CacheTier::L2 => {
                // Leaf of the agreement round: vote straight back. The
                // timer bounds how long the lock survives if the upstream
                // dies before delivering the outcome.
                out.observe(Observation::CwVoted {
                    qid: update.qid,
                    vote: Vote::Ok,
                });
                out.send(
                    from,
                    Payload::CriticalUpdateResponse(CriticalUpdateResponse {
                        qid: update.qid,
                        vote: Vote::Ok,
                    }),
                );
                out.schedule(
                    TimeoutKind::CritWrite(update.qid),
                    self.timing.crit_write_timeout_ms,
                );
            }
            CacheTier::L1 => {
                if self.children.is_empty() {
                    // Nothing below to consult.
                    self.vote(&mut out, update.qid, Vote::Ok);
                } else {
                    out.multicast(&self.children, &Payload::CriticalUpdate(update.clone()));
                    out.schedule(
                        TimeoutKind::CritWrite(update.qid),
                        self.timing.crit_write_timeout_ms,
                    );
                }
            }
        }
        out
    }

    /// L1 only: a child's vote arrives.
    fn on_child_vote(&mut self, from: NodeId, vote: CriticalUpdateResponse) -> NodeOutput {
        let mut out = NodeOutput::empty();
        let Some(session) = self.cw_sessions.get_mut(&vote.qid) else {
            return out;
        };
        if session.replied {
            return out;
        }

        match vote.vote {
            Vote::No => {
                out.cancel(TimeoutKind::CritWrite(vote.qid));
                self.vote(&mut out, vote.qid, Vote::No);
            }
            Vote::Ok => {
                session.votes.insert(from);
                let all_in = self
                    .children
                    .iter()
                    .all(|c| self.cw_sessions[&vote.qid].votes.contains(c));
                if all_in {
                    out.cancel(TimeoutKind::CritWrite(vote.qid));
                    self.vote(&mut out, vote.qid, Vote::Ok);
                }
            }
        }
        out
    }

    /// The vote window closed without an outcome.
    ///
    /// At an L1 this means not every child answered: reply NO and wait for
    /// the coordinator's verdict (the coordinator never crashes, so the
    /// outcome always arrives). At an L2 it means the upstream L1 died
    /// before delivering the outcome: give up the session, release the
    /// lock, and revoke the earlier OK.
    fn on_vote_timeout(&mut self, qid: QueryId) -> NodeOutput {
        let mut out = NodeOutput::empty();
        match self.tier {
            CacheTier::L1 => {
                let awaiting = self.cw_sessions.get(&qid).is_some_and(|s| !s.replied);
                if awaiting {
                    self.vote(&mut out, qid, Vote::No);
                }
            }
            CacheTier::L2 => {
                if let Some(session) = self.cw_sessions.remove(&qid) {
                    self.locked.remove(&session.key);
                    out.observe(Observation::CwVoted { qid, vote: Vote::No });
                    out.send(
                        self.parent,
                        Payload::CriticalUpdateResponse(CriticalUpdateResponse {
                            qid,
                            vote: Vote::No,
                        }),
                    );
                }
            }
        }
        out
    }

    fn vote(&mut self, out: &mut NodeOutput, qid: QueryId, vote: Vote) {
        if let Some(session) = self.cw_sessions.get_mut(&qid) {
            session.replied = true;
        }
        out.observe(Observation::CwVoted { qid, vote });
        out.send(
            self.parent,
            Payload::CriticalUpdateResponse(CriticalUpdateResponse { qid, vote }),
        );
    }

    fn on_cw_outcome(&mut self, cwr: CriticalWriteResponse) -> NodeOutput {
        let mut out = NodeOutput::empty();

        if let Some(session) = self.cw_sessions.remove(&cwr.qid) {
            out.cancel(TimeoutKind::CritWrite(cwr.qid));
            self.locked.remove(&session.key);

            if cwr.outcome == CwOutcome::Commit {
                let seqno = cwr
                    .new_seqno
                    .expect("commit outcome always carries the new seqno");
                self.apply_if_newer(&mut out, cwr.qid, session.key, session.value, seqno);
                out.observe(Observation::CwApplied {
                    qid: cwr.qid,
                    key: session.key,
                    value: session.value,
                    seqno,
                });
            }
        }

        // Relay the outcome downward through the cache tier.
        if self.tier == CacheTier::L1 {
            out.multicast(&self.children, &Payload::CriticalWriteResponse(cwr.clone()));
        }

        // Answer the originator if this request came through here.
        if self.pending.remove(&cwr.qid).is_some() {
            out.cancel(TimeoutKind::Request(cwr.qid));

            let mut cwr = cwr;
            cwr.hops.drop_trailing(self.id);
            if let Some(next) = cwr.hops.pop() {
                out.send(next, Payload::CriticalWriteResponse(cwr));
            }
        }
        out
    }

    // ========================================================================
    // Timeouts & Crash
    // ========================================================================

    /// The upstream never answered: give the originator a failure response
    /// and forget the request.
    fn on_request_timeout(&mut self, qid: QueryId) -> NodeOutput {
        let mut out = NodeOutput::empty();
        let Some(pending) = self.pending.remove(&qid) else {
            return out;
        };

        let mut hops = pending.reply_hops;
        if let Some(next) = hops.pop() {
            out.send(
                next,
                Payload::Response(Response {
                    qid,
                    key: pending.key,
                    value: None,
                    seqno: self.seqno_of(pending.key),
                    kind: pending.kind,
                    critical: pending.critical,
                    hops,
                }),
            );
        }
        out
    }

    /// Cold restart: every piece of soft state is gone.
    fn on_recover(&mut self) -> NodeOutput {
        self.crashed = false;
        self.store.clear();
        self.seqno.clear();
        self.pending.clear();
        self.locked.clear();
        self.cw_sessions.clear();
        self.snapshot.reset();
        NodeOutput::empty()
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    /// Snapshot peers: the upstream channel plus, for an L1, its L2
    /// children. Clients are passive and never receive tokens.
    fn snapshot_peers(&self) -> Vec<NodeId> {
        let mut peers = vec![self.parent];
        if self.tier == CacheTier::L1 {
            peers.extend(self.children.iter().copied());
        }
        peers
    }

    fn on_token(&mut self, from: NodeId, token: Token) -> NodeOutput {
        let mut out = NodeOutput::empty();
        let peers = self.snapshot_peers();
        let action =
            self.snapshot
                .on_token(from, token.snapshot_id, &self.store, &self.seqno, &peers);
        if action.flood {
            out.multicast(&peers, &Payload::Token(token));
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
