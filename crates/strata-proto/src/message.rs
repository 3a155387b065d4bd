//! Protocol messages.
//!
//! This module defines all messages exchanged in the cache hierarchy:
//!
//! ## Request / response path
//! - [`Read`] - Client → L2 → L1 → Database: fetch a key (plain or critical)
//! - [`Write`] - Client → L2 → L1 → Database: store a value (plain or critical)
//! - [`Response`] - downward: the answer, or a `value: None` failure
//!
//! ## Critical-write agreement
//! - [`CriticalUpdate`] - Database → L1 → L2: freeze this key, prepare the value
//! - [`CriticalUpdateResponse`] - L2 → L1 → Database: my vote (aggregated at L1)
//! - [`CriticalWriteResponse`] - Database → all L1 → all L2 → originator: commit or abort
//!
//! ## Bootstrap & snapshot
//! - [`Join`] - wiring layer → node: your parent and children
//! - `StartSnapshot` - injected at the database to open a snapshot round
//! - [`Token`] - snapshot marker flooded across the cache topology

use serde::{Deserialize, Serialize};
use strata_types::{Key, NodeId, QueryId, RequestKind, Seqno, Value};

use crate::hops::Hops;

// ============================================================================
// Payload
// ============================================================================

/// The payload of a message between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Upward read request (plain or critical).
    Read(Read),

    /// Upward write request (plain or critical).
    Write(Write),

    /// Downward response, also used as the write invalidation broadcast.
    Response(Response),

    /// First phase of a critical write: freeze the key, prepare the value.
    CriticalUpdate(CriticalUpdate),

    /// A vote in the critical-write round.
    CriticalUpdateResponse(CriticalUpdateResponse),

    /// Second phase of a critical write: commit or abort.
    CriticalWriteResponse(CriticalWriteResponse),

    /// Bootstrap wiring: parent and children assignment.
    Join(Join),

    /// Opens a snapshot round; only meaningful at the database.
    StartSnapshot,

    /// Chandy-Lamport snapshot marker.
    Token(Token),
}

impl Payload {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Payload::Read(_) => "Read",
            Payload::Write(_) => "Write",
            Payload::Response(_) => "Response",
            Payload::CriticalUpdate(_) => "CriticalUpdate",
            Payload::CriticalUpdateResponse(_) => "CriticalUpdateResponse",
            Payload::CriticalWriteResponse(_) => "CriticalWriteResponse",
            Payload::Join(_) => "Join",
            Payload::StartSnapshot => "StartSnapshot",
            Payload::Token(_) => "Token",
        }
    }

    /// Returns the query id, for payloads that carry one.
    pub fn query_id(&self) -> Option<QueryId> {
        match self {
            Payload::Read(m) => Some(m.qid),
            Payload::Write(m) => Some(m.qid),
            Payload::Response(m) => Some(m.qid),
            Payload::CriticalUpdate(m) => Some(m.qid),
            Payload::CriticalUpdateResponse(m) => Some(m.qid),
            Payload::CriticalWriteResponse(m) => Some(m.qid),
            _ => None,
        }
    }

    /// Returns the route stack, for payloads that carry one.
    pub fn hops(&self) -> Option<&Hops> {
        match self {
            Payload::Read(m) => Some(&m.hops),
            Payload::Write(m) => Some(&m.hops),
            Payload::Response(m) => Some(&m.hops),
            Payload::CriticalUpdate(m) => Some(&m.hops),
            Payload::CriticalWriteResponse(m) => Some(&m.hops),
            _ => None,
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// A read request travelling toward the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Read {
    pub qid: QueryId,
    pub key: Key,
    /// Critical reads are never served from a cache.
    pub critical: bool,
    pub hops: Hops,
}

impl Read {
    pub fn kind(&self) -> RequestKind {
        if self.critical {
            RequestKind::CritRead
        } else {
            RequestKind::Read
        }
    }
}

/// A write request travelling toward the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Write {
    pub qid: QueryId,
    pub key: Key,
    pub value: Value,
    /// Critical writes go through the two-phase agreement round.
    pub critical: bool,
    pub hops: Hops,
}

impl Write {
    pub fn kind(&self) -> RequestKind {
        if self.critical {
            RequestKind::CritWrite
        } else {
            RequestKind::Write
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// The answer to a request, walking the route stack back down.
///
/// `value: None` means the operation failed (key frozen by a critical write,
/// or an upstream timeout). Plain-write responses are also multicast to every
/// L1 as the invalidation/update broadcast; the one L1 on the recorded path
/// additionally routes the response toward the originator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub qid: QueryId,
    pub key: Key,
    pub value: Option<Value>,
    /// Sequence number of the key at the responding node.
    pub seqno: Seqno,
    pub kind: RequestKind,
    pub critical: bool,
    pub hops: Hops,
}

impl Response {
    /// Returns true if the operation succeeded.
    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }
}

// ============================================================================
// Critical Write Round
// ============================================================================

/// Phase one of a critical write: every cache freezes the key and prepares
/// the proposed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalUpdate {
    pub qid: QueryId,
    pub key: Key,
    pub value: Value,
    /// Reply path toward the originator, carried through to the outcome.
    pub hops: Hops,
}

/// A vote on a critical update. L2s vote to their L1; the L1 aggregates and
/// votes to the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalUpdateResponse {
    pub qid: QueryId,
    pub vote: Vote,
}

/// A cache's verdict on a critical update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vote {
    Ok,
    No,
}

/// Phase two of a critical write: the coordinator's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalWriteResponse {
    pub qid: QueryId,
    pub outcome: CwOutcome,
    /// The committed sequence number; `None` on abort.
    pub new_seqno: Option<Seqno>,
    pub hops: Hops,
}

/// Terminal outcome of a critical-write session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CwOutcome {
    Commit,
    Abort,
}

// ============================================================================
// Bootstrap & Snapshot
// ============================================================================

/// Topology assignment delivered by the wiring layer at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Snapshot marker message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub snapshot_id: u64,
}
