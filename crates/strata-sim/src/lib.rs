//! # strata-sim: Deterministic simulation of the stratacache hierarchy
//!
//! This crate drives the pure state machines of `strata-proto` under a
//! discrete-event simulation with controlled time, randomness, and network
//! delay.
//!
//! ## Philosophy
//!
//! - **Reproducibility**: same seed → same workload → same delivery order →
//!   same trace, byte for byte
//! - **Time compression**: minutes of simulated traffic in milliseconds
//! - **Fault injection**: cache crash-stops with automatic cold recovery
//! - **Invariant checking**: the run trace is replayed through a checker
//!   suite covering reads, writes, agreement, routing, snapshots, and
//!   crashes
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ClusterSim                               │
//! │  ┌───────────┐  ┌────────────┐  ┌──────────┐  ┌───────────┐  │
//! │  │ SimClock  │  │ EventQueue │  │  SimRng  │  │SimNetwork │  │
//! │  │ (discrete)│  │(scheduler) │  │ (seeded) │  │(delay+FIFO)│ │
//! │  └───────────┘  └────────────┘  └──────────┘  └───────────┘  │
//! │                                                               │
//! │  ┌─────────────────────────────────────────────────────────┐ │
//! │  │   Database        L1 caches       L2 caches    Clients  │ │
//! │  │            (pure state machines from strata-proto)      │ │
//! │  └─────────────────────────────────────────────────────────┘ │
//! │                                                               │
//! │  ┌─────────────────────────────────────────────────────────┐ │
//! │  │   TraceLog  ──►  TraceChecker suite (replayed post-run) │ │
//! │  └─────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use strata_sim::{ClusterSim, SimConfig, WorkloadConfig, WorkloadGenerator};
//!
//! let config = SimConfig::default().with_seed(12345);
//! let mut sim = ClusterSim::new(config);
//!
//! let workload = WorkloadGenerator::new(WorkloadConfig::default().with_operations(50));
//! let clients = sim.topology().clients.clone();
//! let key_count = sim.topology().l1s.len() * 8;
//! let ops = workload.generate(&clients, key_count, sim.rng_mut());
//! sim.schedule_workload(&ops);
//!
//! sim.run();
//! assert!(sim.verify().is_empty());
//! ```

mod clock;
mod error;
mod event;
mod harness;
pub mod invariant;
mod network;
mod rng;
mod topology;
pub mod trace;
mod workload;

pub use clock::{ms_to_ns, ns_to_ms, SimClock};
pub use error::SimError;
pub use event::{Event, EventId, EventKind, EventQueue};
pub use harness::{ClusterSim, SimSummary};
pub use invariant::{
    check_trace, default_checkers, CrashSilenceChecker, CwAtomicityChecker, CwExclusionChecker,
    HopConsistencyChecker, InvariantResult, MonotonicReadChecker, SeqnoAuthorityChecker,
    SnapshotConsistencyChecker, TraceChecker, WriteVisibilityChecker,
};
pub use network::{NetworkConfig, NetworkStats, SimNetwork};
pub use rng::SimRng;
pub use topology::{Topology, TopologyConfig};
pub use trace::{MessageMeta, TraceEvent, TraceLog, TraceRecord};
pub use workload::{ScheduledOp, WorkloadConfig, WorkloadGenerator};

use strata_types::Timing;

// ============================================================================
// Simulation Configuration
// ============================================================================

/// Configuration for a simulation run.
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Seed for the deterministic RNG.
    pub seed: u64,
    /// Horizon of simulated time, in milliseconds.
    pub max_time_ms: u64,
    /// Maximum number of events to process.
    pub max_events: u64,
    /// Shape of the cache tree.
    pub topology: TopologyConfig,
    /// Timeouts and delays.
    pub timing: Timing,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_time_ms: 120_000,
            max_events: 1_000_000,
            topology: TopologyConfig::default(),
            timing: Timing::default(),
        }
    }
}

impl SimConfig {
    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the simulated-time horizon.
    pub fn with_max_time_ms(mut self, max_time_ms: u64) -> Self {
        self.max_time_ms = max_time_ms;
        self
    }

    /// Sets the event limit.
    pub fn with_max_events(mut self, max_events: u64) -> Self {
        self.max_events = max_events;
        self
    }

    /// Sets the tree shape.
    pub fn with_topology(mut self, topology: TopologyConfig) -> Self {
        self.topology = topology;
        self
    }

    /// Sets the timing knobs.
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }
}
