//! Simulated network with per-send delay and pairwise FIFO.
//!
//! Every send draws a uniform delay in `[0, network_delay_ms)` and the delay
//! is injected into the delivery time, off the handler's critical path.
//! Pairwise FIFO, which both the agreement round and the snapshot depend on,
//! is preserved by clamping each delivery to be no earlier than the previous
//! delivery on the same `(from, to)` channel.

use std::collections::HashMap;

use strata_types::NodeId;

use crate::clock::ms_to_ns;
use crate::rng::SimRng;

/// Network configuration.
#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    /// Upper bound of the uniform per-send delay, in milliseconds.
    pub delay_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { delay_ms: 20 }
    }
}

impl NetworkConfig {
    /// Zero-delay network: messages arrive in send order, instantly.
    pub fn instant() -> Self {
        Self { delay_ms: 0 }
    }
}

/// Counters kept for the run summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkStats {
    pub messages_sent: u64,
    /// Sends whose delivery was pushed later to preserve channel FIFO.
    pub fifo_clamped: u64,
}

/// The delay shim applied to every send.
#[derive(Debug)]
pub struct SimNetwork {
    config: NetworkConfig,
    /// Last delivery time per directed channel.
    last_delivery_ns: HashMap<(NodeId, NodeId), u64>,
    stats: NetworkStats,
}

impl SimNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            last_delivery_ns: HashMap::new(),
            stats: NetworkStats::default(),
        }
    }

    /// Computes the delivery time for a send happening now.
    pub fn send(&mut self, from: NodeId, to: NodeId, now_ns: u64, rng: &mut SimRng) -> u64 {
        let delay_ns = if self.config.delay_ms == 0 {
            0
        } else {
            rng.next_u64_range(0, ms_to_ns(self.config.delay_ms))
        };

        let mut deliver_at = now_ns + delay_ns;
        let channel = (from, to);
        if let Some(&last) = self.last_delivery_ns.get(&channel) {
            if deliver_at < last {
                deliver_at = last;
                self.stats.fifo_clamped += 1;
            }
        }
        self.last_delivery_ns.insert(channel, deliver_at);
        self.stats.messages_sent += 1;
        deliver_at
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats
    }
}
