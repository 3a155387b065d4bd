//! The client node.
//!
//! Clients sit below the L2 tier. The workload driver hands them operations;
//! they mint a query id, arm a deadline, and fire the request at their L2.
//! Responses cancel the deadline and feed the per-key monotonic-read
//! watermark; a fired deadline marks the operation failed (whether to retry
//! is the driver's business, not the client's).

use std::collections::{BTreeMap, HashMap};

use strata_types::{Key, NodeId, QueryId, RequestKind, Seqno, Timing, Value};

use crate::hops::Hops;
use crate::message::{CriticalWriteResponse, CwOutcome, Payload, Read, Response, Write};
use crate::node::{ClientOp, NodeEvent, NodeOutput, Observation, TimeoutKind};

/// An operation in flight from this client.
#[derive(Debug, Clone, Copy)]
struct PendingOp {
    key: Key,
    kind: RequestKind,
    /// The value this client asked to write, echoed into the success
    /// observation when the commit outcome carries only a seqno.
    value: Option<Value>,
}

/// The client node state machine.
#[derive(Debug)]
pub struct Client {
    id: NodeId,
    timing: Timing,

    /// The L2 cache this client is attached to.
    parent: NodeId,

    pending: HashMap<QueryId, PendingOp>,

    /// Highest seqno observed per key; successful responses must never go
    /// backwards.
    last_seen: BTreeMap<Key, Seqno>,

    next_query: u32,
}

impl Client {
    pub fn new(id: NodeId, timing: Timing) -> Self {
        Self {
            id,
            timing,
            parent: NodeId::default(),
            pending: HashMap::new(),
            last_seen: BTreeMap::new(),
            next_query: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Operations still in flight; zero at quiescence.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Highest seqno this client has observed for a key.
    pub fn watermark(&self, key: Key) -> Seqno {
        self.last_seen.get(&key).copied().unwrap_or(Seqno::ZERO)
    }

    /// Handles one event.
    pub fn handle(&mut self, event: NodeEvent) -> NodeOutput {
        match event {
            NodeEvent::Operation(op) => self.on_operation(op),
            NodeEvent::Message { from: _, payload } => self.on_message(payload),
            NodeEvent::Timeout(TimeoutKind::Request(qid)) => self.on_timeout(qid),
            NodeEvent::Timeout(TimeoutKind::CritWrite(_))
            | NodeEvent::Crash
            | NodeEvent::Recover => NodeOutput::empty(),
        }
    }

    fn on_message(&mut self, payload: Payload) -> NodeOutput {
        match payload {
            Payload::Join(join) => {
                if let Some(parent) = join.parent {
                    self.parent = parent;
                }
                NodeOutput::empty()
            }
            Payload::Response(resp) => self.on_response(resp),
            Payload::CriticalWriteResponse(cwr) => self.on_cw_outcome(cwr),
            // Clients are not snapshot participants and route nothing.
            _ => NodeOutput::empty(),
        }
    }

    fn on_operation(&mut self, op: ClientOp) -> NodeOutput {
        let mut out = NodeOutput::empty();
        let qid = QueryId::from_origin_and_local(self.id, self.next_query);
        self.next_query += 1;

        self.pending.insert(
            qid,
            PendingOp {
                key: op.key,
                kind: op.kind,
                value: op.value,
            },
        );
        out.schedule(TimeoutKind::Request(qid), self.timing.client_timeout_ms);

        let hops = Hops::originating_at(self.id);
        let payload = match op.kind {
            RequestKind::Read | RequestKind::CritRead => Payload::Read(Read {
                qid,
                key: op.key,
                critical: op.kind == RequestKind::CritRead,
                hops,
            }),
            RequestKind::Write | RequestKind::CritWrite => Payload::Write(Write {
                qid,
                key: op.key,
                value: op.value.unwrap_or_default(),
                critical: op.kind == RequestKind::CritWrite,
                hops,
            }),
        };
        out.send(self.parent, payload);
        out
    }

    fn on_response(&mut self, resp: Response) -> NodeOutput {
        let mut out = NodeOutput::empty();
        let Some(pending) = self.pending.remove(&resp.qid) else {
            // Already timed out here; the late answer is dropped.
            return out;
        };
        out.cancel(TimeoutKind::Request(resp.qid));

        match resp.value {
            Some(value) => {
                self.observe_success(&mut out, resp.qid, pending, Some(value), resp.seqno);
            }
            None => out.observe(Observation::ClientFailed {
                qid: resp.qid,
                kind: pending.kind,
                key: pending.key,
            }),
        }
        out
    }

    fn on_cw_outcome(&mut self, cwr: CriticalWriteResponse) -> NodeOutput {
        let mut out = NodeOutput::empty();
        let Some(pending) = self.pending.remove(&cwr.qid) else {
            return out;
        };
        out.cancel(TimeoutKind::Request(cwr.qid));

        match cwr.outcome {
            CwOutcome::Commit => {
                let seqno = cwr
                    .new_seqno
                    .expect("commit outcome always carries the new seqno");
                self.observe_success(&mut out, cwr.qid, pending, pending.value, seqno);
            }
            CwOutcome::Abort => out.observe(Observation::ClientFailed {
                qid: cwr.qid,
                kind: pending.kind,
                key: pending.key,
            }),
        }
        out
    }

    fn observe_success(
        &mut self,
        out: &mut NodeOutput,
        qid: QueryId,
        pending: PendingOp,
        value: Option<Value>,
        seqno: Seqno,
    ) {
        // The monotonic-read contract: the trace checker flags regressions,
        // the debug build catches them at the source.
        debug_assert!(
            seqno >= self.watermark(pending.key),
            "seqno regressed for key {}: {} < {}",
            pending.key,
            seqno,
            self.watermark(pending.key),
        );
        let watermark = self.last_seen.entry(pending.key).or_insert(Seqno::ZERO);
        if seqno > *watermark {
            *watermark = seqno;
        }

        out.observe(Observation::ClientObserved {
            qid,
            kind: pending.kind,
            key: pending.key,
            value,
            seqno,
            critical: pending.kind.is_critical(),
        });
    }

    fn on_timeout(&mut self, qid: QueryId) -> NodeOutput {
        let mut out = NodeOutput::empty();
        if let Some(pending) = self.pending.remove(&qid) {
            out.observe(Observation::ClientTimedOut {
                qid,
                kind: pending.kind,
                key: pending.key,
            });
        }
        out
    }
}

// ============================================================================
// Tests
// ============================================================================
