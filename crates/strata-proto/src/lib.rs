//! # strata-proto: Two-tier cache coordination protocol
//!
//! This crate implements the coordination core of the stratacache system as
//! pure, deterministic state machines following the functional-core /
//! imperative-shell pattern.
//!
//! # Architecture
//!
//! Every node is completely pure:
//! - Takes messages, timeouts, and injected operations as input
//! - Produces outgoing messages, timer commands, and trace observations
//! - No I/O, no clocks, no randomness
//!
//! This enables comprehensive deterministic simulation under `strata-sim`.
//!
//! # Topology
//!
//! ```text
//!                     ┌──────────┐
//!                     │ Database │        seqno authority, CW coordinator
//!                     └────┬─────┘
//!            ┌────────────┼────────────┐
//!        ┌───▼───┐    ┌───▼───┐    ┌───▼───┐
//!        │  L1   │    │  L1   │    │  L1   │
//!        └───┬───┘    └───────┘    └───────┘
//!       ┌────┴────┐
//!   ┌───▼───┐ ┌───▼───┐
//!   │  L2   │ │  L2   │
//!   └───┬───┘ └───────┘
//!  ┌────┴────┐
//! ┌▼──────┐ ┌▼──────┐
//! │Client │ │Client │
//! └───────┘ └───────┘
//! ```
//!
//! Requests climb the tree recording their hops; responses unwind the hop
//! stack back to the originator. Plain writes are broadcast downward as
//! invalidations; critical writes run a two-phase agreement round across
//! every L1 (each L1 consulting its L2s) before anything becomes visible.
//!
//! # Key Types
//!
//! - [`Database`], [`CacheNode`], [`Client`]: the three node state machines
//! - [`NodeEvent`] / [`NodeOutput`]: the uniform node surface
//! - [`Payload`]: the message catalogue
//! - [`SnapshotState`]: the Chandy-Lamport engine every non-client embeds

mod cache;
mod client;
mod database;
pub mod hops;
pub mod message;
pub mod node;
pub mod snapshot;

pub use cache::{CacheNode, CacheTier};
pub use client::Client;
pub use database::Database;
pub use hops::Hops;
pub use message::{
    CriticalUpdate, CriticalUpdateResponse, CriticalWriteResponse, CwOutcome, Join, Payload, Read,
    Response, Token, Vote, Write,
};
pub use node::{ClientOp, NodeEvent, NodeOutput, Observation, Outbound, TimeoutKind, TimerCmd};
pub use snapshot::{SnapshotCut, SnapshotState, TokenAction};

/// Any node in the hierarchy, for callers that hold a heterogeneous set.
#[derive(Debug)]
pub enum Node {
    Database(Database),
    Cache(CacheNode),
    Client(Client),
}

impl Node {
    /// This node's id.
    pub fn id(&self) -> strata_types::NodeId {
        match self {
            Node::Database(n) => n.id(),
            Node::Cache(n) => n.id(),
            Node::Client(n) => n.id(),
        }
    }

    /// Dispatches one event to the underlying state machine.
    pub fn handle(&mut self, event: NodeEvent) -> NodeOutput {
        match self {
            Node::Database(n) => n.handle(event),
            Node::Cache(n) => n.handle(event),
            Node::Client(n) => n.handle(event),
        }
    }
}
