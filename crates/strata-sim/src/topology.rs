//! Cache-tree topology construction.
//!
//! The hierarchy is a tree rooted at the database: the database fans out to
//! L1 caches, each L1 to its L2 caches, each L2 to its clients. Node ids are
//! allocated sequentially (database first, then tier by tier), so a given
//! shape always produces the same wiring.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strata_proto::Join;
use strata_types::{Key, NodeId, Value};

/// Shape of the tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub l1_count: usize,
    pub l2_per_l1: usize,
    pub clients_per_l2: usize,
    /// Number of keys pre-loaded into the database.
    pub key_count: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            l1_count: 2,
            l2_per_l1: 2,
            clients_per_l2: 2,
            key_count: 16,
        }
    }
}

/// The wired tree: who is where, and who talks to whom.
#[derive(Debug, Clone)]
pub struct Topology {
    pub database: NodeId,
    pub l1s: Vec<NodeId>,
    pub l2s: Vec<NodeId>,
    pub clients: Vec<NodeId>,

    /// L2 children per L1.
    pub l2s_of: HashMap<NodeId, Vec<NodeId>>,
    /// Client children per L2.
    pub clients_of: HashMap<NodeId, Vec<NodeId>>,
    /// Upstream neighbour of every non-root node.
    pub parent_of: HashMap<NodeId, NodeId>,
}

impl Topology {
    /// Builds the tree for a given shape.
    pub fn build(config: TopologyConfig) -> Self {
        let mut next_id = 0u64;
        let mut alloc = || {
            let id = NodeId::new(next_id);
            next_id += 1;
            id
        };

        let database = alloc();
        let l1s: Vec<NodeId> = (0..config.l1_count).map(|_| alloc()).collect();

        let mut l2s = Vec::new();
        let mut l2s_of = HashMap::new();
        let mut parent_of = HashMap::new();
        for &l1 in &l1s {
            parent_of.insert(l1, database);
            let children: Vec<NodeId> = (0..config.l2_per_l1).map(|_| alloc()).collect();
            for &l2 in &children {
                parent_of.insert(l2, l1);
            }
            l2s.extend(children.iter().copied());
            l2s_of.insert(l1, children);
        }

        let mut clients = Vec::new();
        let mut clients_of = HashMap::new();
        for &l2 in &l2s {
            let children: Vec<NodeId> = (0..config.clients_per_l2).map(|_| alloc()).collect();
            for &client in &children {
                parent_of.insert(client, l2);
            }
            clients.extend(children.iter().copied());
            clients_of.insert(l2, children);
        }

        Self {
            database,
            l1s,
            l2s,
            clients,
            l2s_of,
            clients_of,
            parent_of,
        }
    }

    /// Every cache node, both tiers.
    pub fn caches(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.l1s.iter().chain(self.l2s.iter()).copied()
    }

    /// The join message delivered to a node at bootstrap.
    pub fn join_for(&self, node: NodeId) -> Join {
        let children = if node == self.database {
            self.l1s.clone()
        } else if let Some(l2s) = self.l2s_of.get(&node) {
            l2s.clone()
        } else if let Some(clients) = self.clients_of.get(&node) {
            clients.clone()
        } else {
            Vec::new()
        };
        Join {
            parent: self.parent_of.get(&node).copied(),
            children,
        }
    }

    /// Initial database content for a shape: `key_count` keys, each seeded
    /// with ten times its key.
    pub fn initial_store(config: TopologyConfig) -> std::collections::BTreeMap<Key, Value> {
        (0..config.key_count as u64)
            .map(|k| (Key::new(k), Value::new(k * 10)))
            .collect()
    }
}
