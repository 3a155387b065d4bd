//! Structured run trace.
//!
//! Every send, delivery, crash marker, and node observation lands here in
//! processing order. The consistency checkers replay the trace after the
//! run; a failing run can be persisted in compact binary form and reloaded
//! for inspection.

use std::fs::File;
use std::io::{self, BufWriter, Write as _};
use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_proto::{Observation, Payload};
use strata_types::{Key, NodeId, QueryId, RequestKind, Seqno, Value};

// ============================================================================
// Records
// ============================================================================

/// One entry in the run trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Simulation time when the entry was recorded.
    pub time_ns: u64,

    /// The node this entry is about.
    pub actor: NodeId,

    pub event: TraceEvent,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// The actor sent a message.
    Sent { to: NodeId, message: MessageMeta },

    /// A message reached the actor.
    Delivered { from: NodeId, message: MessageMeta },

    /// The actor crash-stopped.
    Crashed,

    /// The actor came back up.
    Recovered,

    /// A domain event from inside the actor's state machine.
    Observed(Observation),
}

/// The checker-relevant fields of a message, extracted at trace time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MessageMeta {
    pub label: String,
    pub qid: Option<QueryId>,
    pub kind: Option<RequestKind>,
    pub key: Option<Key>,
    pub value: Option<Value>,
    pub seqno: Option<Seqno>,
    pub critical: bool,
    pub hops: Option<Vec<NodeId>>,
}

impl MessageMeta {
    /// Extracts the metadata of a payload.
    pub fn of(payload: &Payload) -> Self {
        let mut meta = MessageMeta {
            label: payload.label().to_string(),
            qid: payload.query_id(),
            hops: payload.hops().map(|h| h.as_slice().to_vec()),
            ..Default::default()
        };
        match payload {
            Payload::Read(read) => {
                meta.kind = Some(read.kind());
                meta.key = Some(read.key);
                meta.critical = read.critical;
            }
            Payload::Write(write) => {
                meta.kind = Some(write.kind());
                meta.key = Some(write.key);
                meta.value = Some(write.value);
                meta.critical = write.critical;
            }
            Payload::Response(resp) => {
                meta.kind = Some(resp.kind);
                meta.key = Some(resp.key);
                meta.value = resp.value;
                meta.seqno = Some(resp.seqno);
                meta.critical = resp.critical;
            }
            Payload::CriticalUpdate(update) => {
                meta.kind = Some(RequestKind::CritWrite);
                meta.key = Some(update.key);
                meta.value = Some(update.value);
                meta.critical = true;
            }
            Payload::CriticalWriteResponse(cwr) => {
                meta.kind = Some(RequestKind::CritWrite);
                meta.seqno = cwr.new_seqno;
                meta.critical = true;
            }
            Payload::CriticalUpdateResponse(_) => {
                meta.critical = true;
            }
            Payload::Join(_) | Payload::StartSnapshot | Payload::Token(_) => {}
        }
        meta
    }

    /// True for request messages travelling upward.
    pub fn is_request(&self) -> bool {
        self.label == "Read" || self.label == "Write"
    }

    /// True for response-shaped messages travelling downward.
    pub fn is_response(&self) -> bool {
        self.label == "Response" || self.label == "CriticalWriteResponse"
    }
}

// ============================================================================
// Trace Log
// ============================================================================

/// Append-only trace of one simulation run.
#[derive(Debug, Default)]
pub struct TraceLog {
    records: Vec<TraceRecord>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TraceRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceRecord> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Writes the trace to a file in compact binary form.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let bytes = postcard::to_allocvec(&self.records).map_err(io::Error::other)?;
        writer.write_all(&bytes)?;
        writer.flush()
    }

    /// Reads a trace back from a file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let records = postcard::from_bytes(&bytes).map_err(io::Error::other)?;
        Ok(Self { records })
    }
}
