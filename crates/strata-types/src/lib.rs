//! # strata-types: Core types for stratacache
//!
//! This crate contains shared types used across the stratacache system:
//! - Entity IDs ([`NodeId`], [`QueryId`])
//! - Cache data types ([`Key`], [`Value`], [`Seqno`])
//! - Request classification ([`RequestKind`])
//! - Timing knobs ([`Timing`])

use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};

// ============================================================================
// Entity IDs - All Copy (cheap 8-byte values)
// ============================================================================

/// Unique identifier for a node (database, cache, or client).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NodeId(u64);

impl NodeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<NodeId> for u64 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Unique identifier for a client request.
///
/// Survives forwarding: every hop of a request and its response carries the
/// same `QueryId`.
///
/// **Bit Layout**:
/// - Upper 32 bits: originating node id
/// - Lower 32 bits: per-origin request counter
///
/// Packing the origin into the id makes ids globally unique without any
/// shared counter, and keeps simulation runs reproducible: the id stream of
/// a client depends only on its own request count.
///
/// # Examples
///
/// ```
/// # use strata_types::{NodeId, QueryId};
/// let qid = QueryId::from_origin_and_local(NodeId::new(7), 3);
/// assert_eq!(qid.origin(), NodeId::new(7));
/// assert_eq!(qid.local(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueryId(u64);

impl QueryId {
    /// Creates a query id from the originating node and its local counter.
    pub fn from_origin_and_local(origin: NodeId, local: u32) -> Self {
        let origin_bits = origin.as_u64() << 32;
        let local_bits = u64::from(local);
        Self(origin_bits | local_bits)
    }

    /// Extracts the originating node id (upper 32 bits).
    pub fn origin(self) -> NodeId {
        NodeId::new(self.0 >> 32)
    }

    /// Extracts the per-origin counter (lower 32 bits).
    pub fn local(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }
}

impl Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.origin(), self.local())
    }
}

impl From<QueryId> for u64 {
    fn from(id: QueryId) -> Self {
        id.0
    }
}

// ============================================================================
// Cache Data Types
// ============================================================================

/// A key in the key-value space.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Key(u64);

impl Key {
    pub fn new(key: u64) -> Self {
        Self(key)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Key {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A value in the key-value space.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Value(u64);

impl Value {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Per-key sequence number owned by the database.
///
/// The database is the only authority that increments a key's seqno; every
/// response is stamped with one, and caches discard updates whose seqno is
/// not newer than what they already hold. This is the whole monotonic-read
/// story.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Seqno(u64);

impl Seqno {
    pub const ZERO: Seqno = Seqno(0);

    pub fn new(seqno: u64) -> Self {
        Self(seqno)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for Seqno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Seqno {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ============================================================================
// Request Classification
// ============================================================================

/// The four operations clients issue against the cache hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    /// Plain read; may be served by any cache tier.
    Read,

    /// Plain write; applied at the database and broadcast downward.
    Write,

    /// Critical read; always served by the database.
    CritRead,

    /// Critical write; two-phase agreement across all L1 caches.
    CritWrite,
}

impl RequestKind {
    /// Returns true for the critical variants.
    pub fn is_critical(self) -> bool {
        matches!(self, RequestKind::CritRead | RequestKind::CritWrite)
    }

    /// Returns true for read-like requests.
    pub fn is_read(self) -> bool {
        matches!(self, RequestKind::Read | RequestKind::CritRead)
    }
}

impl Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestKind::Read => "READ",
            RequestKind::Write => "WRITE",
            RequestKind::CritRead => "CRITREAD",
            RequestKind::CritWrite => "CRITWRITE",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Timing Configuration
// ============================================================================

/// Timing knobs recognised by every component, in milliseconds.
///
/// Defaults are sized so a full client → database → client round trip under
/// maximum network delay fits comfortably inside each timeout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Timing {
    /// Upper bound of the uniform random per-send network delay.
    pub network_delay_ms: u64,

    /// How long a client waits for a response before giving up.
    pub client_timeout_ms: u64,

    /// How long a cache waits for an upstream response before giving up.
    pub request_timeout_ms: u64,

    /// How long the database (and an L1 collecting child votes) waits for
    /// critical-write acknowledgements.
    pub crit_write_timeout_ms: u64,

    /// How long a crashed cache stays down before recovering.
    pub recovery_delay_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            network_delay_ms: 20,
            client_timeout_ms: 2_000,
            request_timeout_ms: 1_000,
            crit_write_timeout_ms: 1_200,
            recovery_delay_ms: 3_000,
        }
    }
}

impl Timing {
    /// Sets the network delay bound.
    pub fn with_network_delay_ms(mut self, ms: u64) -> Self {
        self.network_delay_ms = ms;
        self
    }

    /// Sets the client timeout.
    pub fn with_client_timeout_ms(mut self, ms: u64) -> Self {
        self.client_timeout_ms = ms;
        self
    }

    /// Sets the cache request timeout.
    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    /// Sets the critical-write vote timeout.
    pub fn with_crit_write_timeout_ms(mut self, ms: u64) -> Self {
        self.crit_write_timeout_ms = ms;
        self
    }

    /// Sets the crash recovery delay.
    pub fn with_recovery_delay_ms(mut self, ms: u64) -> Self {
        self.recovery_delay_ms = ms;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
