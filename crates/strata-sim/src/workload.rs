//! Random client workloads.
//!
//! Generates a seeded stream of operations spread across clients and
//! simulated time. The mix of plain and critical reads and writes is
//! configurable; everything is drawn from the run's RNG, so a seed pins the
//! whole workload.

use serde::{Deserialize, Serialize};
use strata_proto::ClientOp;
use strata_types::{Key, NodeId, RequestKind, Value};

use crate::rng::SimRng;

/// Workload shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Total operations across all clients.
    pub num_operations: usize,

    /// Fraction of operations that are reads (plain or critical).
    pub read_ratio: f64,

    /// Fraction of reads that are critical.
    pub critical_read_ratio: f64,

    /// Fraction of writes that are critical.
    pub critical_write_ratio: f64,

    /// Mean gap between consecutive operations, in milliseconds.
    pub mean_gap_ms: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            num_operations: 200,
            read_ratio: 0.7,
            critical_read_ratio: 0.15,
            critical_write_ratio: 0.2,
            mean_gap_ms: 40,
        }
    }
}

impl WorkloadConfig {
    pub fn with_operations(mut self, n: usize) -> Self {
        self.num_operations = n;
        self
    }

    pub fn with_read_ratio(mut self, ratio: f64) -> Self {
        self.read_ratio = ratio;
        self
    }

    /// A write-heavy mix, useful for exercising the broadcast path.
    pub fn write_heavy() -> Self {
        Self {
            read_ratio: 0.3,
            ..Default::default()
        }
    }
}

/// One operation with its injection point.
#[derive(Debug, Clone, Copy)]
pub struct ScheduledOp {
    pub at_ms: u64,
    pub client: NodeId,
    pub op: ClientOp,
}

/// Generates operation streams for a set of clients.
#[derive(Debug)]
pub struct WorkloadGenerator {
    config: WorkloadConfig,
}

impl WorkloadGenerator {
    pub fn new(config: WorkloadConfig) -> Self {
        Self { config }
    }

    /// Generates the full schedule.
    ///
    /// Operations are spaced by uniform gaps in `[0, 2 * mean_gap_ms]` and
    /// assigned to uniformly random clients over uniformly random keys in
    /// `[0, key_count)`.
    pub fn generate(
        &self,
        clients: &[NodeId],
        key_count: usize,
        rng: &mut SimRng,
    ) -> Vec<ScheduledOp> {
        debug_assert!(!clients.is_empty(), "workload needs at least one client");
        debug_assert!(key_count > 0, "workload needs at least one key");

        let mut ops = Vec::with_capacity(self.config.num_operations);
        let mut at_ms = 0u64;
        for _ in 0..self.config.num_operations {
            at_ms += rng.next_u64_range(0, 2 * self.config.mean_gap_ms.max(1) + 1);
            let client = clients[rng.next_usize(clients.len())];
            let key = Key::new(rng.next_usize(key_count) as u64);

            let op = if rng.next_bool_with_probability(self.config.read_ratio) {
                let critical = rng.next_bool_with_probability(self.config.critical_read_ratio);
                ClientOp {
                    kind: if critical {
                        RequestKind::CritRead
                    } else {
                        RequestKind::Read
                    },
                    key,
                    value: None,
                }
            } else {
                let critical = rng.next_bool_with_probability(self.config.critical_write_ratio);
                ClientOp {
                    kind: if critical {
                        RequestKind::CritWrite
                    } else {
                        RequestKind::Write
                    },
                    key,
                    value: Some(Value::new(rng.next_u64_range(1, 1_000_000))),
                }
            };

            ops.push(ScheduledOp { at_ms, client, op });
        }
        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clients(n: u64) -> Vec<NodeId> {
        (0..n).map(NodeId::new).collect()
    }

    #[test]
    fn generates_requested_count_in_time_order() {
        let generator = WorkloadGenerator::new(WorkloadConfig::default().with_operations(500));
        let mut rng = SimRng::new(1);
        let ops = generator.generate(&clients(4), 16, &mut rng);

        assert_eq!(ops.len(), 500);
        for window in ops.windows(2) {
            assert!(window[0].at_ms <= window[1].at_ms);
        }
    }

    #[test]
    fn writes_carry_values_reads_do_not() {
        let generator = WorkloadGenerator::new(WorkloadConfig::default().with_operations(300));
        let mut rng = SimRng::new(2);
        for scheduled in generator.generate(&clients(2), 8, &mut rng) {
            match scheduled.op.kind {
                RequestKind::Read | RequestKind::CritRead => {
                    assert!(scheduled.op.value.is_none());
                }
                RequestKind::Write | RequestKind::CritWrite => {
                    assert!(scheduled.op.value.is_some());
                }
            }
        }
    }

    #[test]
    fn same_seed_same_workload() {
        let generator = WorkloadGenerator::new(WorkloadConfig::default());
        let mut rng1 = SimRng::new(77);
        let mut rng2 = SimRng::new(77);
        let a = generator.generate(&clients(3), 8, &mut rng1);
        let b = generator.generate(&clients(3), 8, &mut rng2);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.at_ms, y.at_ms);
            assert_eq!(x.client, y.client);
            assert_eq!(x.op, y.op);
        }
    }

    #[test]
    fn ratio_extremes_are_respected() {
        let generator = WorkloadGenerator::new(WorkloadConfig {
            read_ratio: 1.0,
            ..Default::default()
        });
        let mut rng = SimRng::new(3);
        assert!(generator
            .generate(&clients(2), 8, &mut rng)
            .iter()
            .all(|s| s.op.kind.is_read()));

        let generator = WorkloadGenerator::new(WorkloadConfig {
            read_ratio: 0.0,
            critical_write_ratio: 1.0,
            ..Default::default()
        });
        assert!(generator
            .generate(&clients(2), 8, &mut rng)
            .iter()
            .all(|s| s.op.kind == RequestKind::CritWrite));
    }
}
