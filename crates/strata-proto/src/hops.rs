//! Route stack carried by every request and response.
//!
//! A request records the nodes it traverses on the way up: the client pushes
//! itself, then every forwarder pushes itself before sending toward the
//! database. Responses walk the stack back down: the sender pops the tail
//! and addresses the popped node with the remainder. A node holding a
//! broadcast copy whose tail is itself drops that trailing entry before
//! routing.

use serde::{Deserialize, Serialize};
use strata_types::NodeId;

/// Ordered list of nodes traversed from the originator toward the database.
///
/// The tail is always the most recent hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Hops(Vec<NodeId>);

impl Hops {
    /// Creates an empty route stack.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Creates a route stack holding only the originator.
    pub fn originating_at(origin: NodeId) -> Self {
        Self(vec![origin])
    }

    /// Pushes a forwarder onto the stack.
    pub fn push(&mut self, node: NodeId) {
        self.0.push(node);
    }

    /// Pops and returns the most recent hop.
    pub fn pop(&mut self) -> Option<NodeId> {
        self.0.pop()
    }

    /// Returns the most recent hop without removing it.
    pub fn tail(&self) -> Option<NodeId> {
        self.0.last().copied()
    }

    /// Removes the tail entry when it names the given node.
    ///
    /// Broadcast responses carry the same stack to every recipient; the one
    /// recipient that is on the path sees itself at the tail and strips it
    /// before routing onward.
    pub fn drop_trailing(&mut self, node: NodeId) {
        if self.tail() == Some(node) {
            self.0.pop();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if `self` is a prefix of `other`.
    pub fn is_prefix_of(&self, other: &Hops) -> bool {
        self.0.len() <= other.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Returns the hops as a slice, originator first.
    pub fn as_slice(&self) -> &[NodeId] {
        &self.0
    }
}

impl From<Vec<NodeId>> for Hops {
    fn from(nodes: Vec<NodeId>) -> Self {
        Self(nodes)
    }
}
