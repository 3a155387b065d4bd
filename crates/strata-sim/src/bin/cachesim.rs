//! cachesim: deterministic simulation runner for the stratacache hierarchy.
//!
//! # Usage
//!
//! ```bash
//! # Run one seed with the default workload
//! cachesim run --seed 12345
//!
//! # Run with crashes and snapshot rounds mixed in
//! cachesim run --seed 12345 --crashes 2 --snapshots 3
//!
//! # Sweep many seeds, stopping at the first violation
//! cachesim sweep --count 500
//!
//! # Verbose protocol tracing
//! cachesim -v run --seed 12345
//! ```

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use strata_sim::{
    ClusterSim, InvariantResult, SimConfig, TopologyConfig, WorkloadConfig, WorkloadGenerator,
};

#[derive(Parser)]
#[command(name = "cachesim", about = "Deterministic two-tier cache simulator")]
struct Cli {
    /// Enable verbose protocol tracing.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single seed.
    Run {
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Operations in the generated workload.
        #[arg(long, default_value_t = 200)]
        ops: usize,

        /// Number of L1 caches.
        #[arg(long, default_value_t = 2)]
        l1: usize,

        /// L2 caches per L1.
        #[arg(long, default_value_t = 2)]
        l2: usize,

        /// Clients per L2.
        #[arg(long, default_value_t = 2)]
        clients: usize,

        /// Random cache crashes to inject.
        #[arg(long, default_value_t = 0)]
        crashes: usize,

        /// Snapshot rounds to trigger.
        #[arg(long, default_value_t = 1)]
        snapshots: usize,

        /// Write the run trace to this file on violation.
        #[arg(long)]
        trace_out: Option<std::path::PathBuf>,
    },

    /// Run many consecutive seeds and stop at the first violation.
    Sweep {
        /// First seed.
        #[arg(long, default_value_t = 0)]
        start: u64,

        /// Number of seeds.
        #[arg(long, default_value_t = 100)]
        count: u64,

        /// Operations per run.
        #[arg(long, default_value_t = 200)]
        ops: usize,

        /// Random cache crashes per run.
        #[arg(long, default_value_t = 1)]
        crashes: usize,

        /// Snapshot rounds per run.
        #[arg(long, default_value_t = 1)]
        snapshots: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Command::Run {
            seed,
            ops,
            l1,
            l2,
            clients,
            crashes,
            snapshots,
            trace_out,
        } => {
            let topology = TopologyConfig {
                l1_count: l1,
                l2_per_l1: l2,
                clients_per_l2: clients,
                key_count: 16,
            };
            let violations = run_one(seed, ops, topology, crashes, snapshots, trace_out.as_deref())?;
            if violations.is_empty() {
                Ok(())
            } else {
                anyhow::bail!("{} invariant violation(s), seed {seed}", violations.len())
            }
        }

        Command::Sweep {
            start,
            count,
            ops,
            crashes,
            snapshots,
        } => {
            for seed in start..start + count {
                let violations =
                    run_one(seed, ops, TopologyConfig::default(), crashes, snapshots, None)?;
                if !violations.is_empty() {
                    anyhow::bail!(
                        "{} invariant violation(s); reproduce with: cachesim run --seed {seed} \
                         --ops {ops} --crashes {crashes} --snapshots {snapshots}",
                        violations.len()
                    );
                }
            }
            println!("{}", json!({ "seeds": count, "violations": 0 }));
            Ok(())
        }
    }
}

fn run_one(
    seed: u64,
    ops: usize,
    topology: TopologyConfig,
    crashes: usize,
    snapshots: usize,
    trace_out: Option<&std::path::Path>,
) -> anyhow::Result<Vec<InvariantResult>> {
    let config = SimConfig::default().with_seed(seed).with_topology(topology);
    let mut sim = ClusterSim::new(config);

    // Workload across the full run.
    let workload = WorkloadGenerator::new(WorkloadConfig::default().with_operations(ops));
    let clients = sim.topology().clients.clone();
    let key_count = topology.key_count;
    let scheduled = workload.generate(&clients, key_count, sim.rng_mut());
    let horizon_ms = scheduled.last().map(|s| s.at_ms).unwrap_or(0).max(1);
    sim.schedule_workload(&scheduled);

    // Crashes and snapshots land at random points inside the workload.
    let caches: Vec<_> = sim.topology().caches().collect();
    for _ in 0..crashes {
        let at_ms = sim.rng_mut().next_u64_range(0, horizon_ms + 1);
        let victim = caches[sim.rng_mut().next_usize(caches.len())];
        sim.schedule_crash(at_ms, victim);
    }
    for _ in 0..snapshots {
        let at_ms = sim.rng_mut().next_u64_range(0, horizon_ms + 1);
        sim.schedule_snapshot(at_ms);
    }

    let summary = sim.run();
    let violations = sim.verify();
    let leaks = sim.quiescence_report();

    println!(
        "{}",
        json!({
            "seed": summary.seed,
            "events": summary.events_processed,
            "simulated_ms": summary.final_time_ns / 1_000_000,
            "trace_records": summary.trace_len,
            "violations": violations.len(),
            "leaks": leaks,
        })
    );

    for violation in &violations {
        if let InvariantResult::Violated {
            invariant,
            message,
            context,
        } = violation
        {
            eprintln!("VIOLATION [{invariant}] {message}");
            for (k, v) in context {
                eprintln!("    {k}: {v}");
            }
        }
    }

    if !violations.is_empty() {
        if let Some(path) = trace_out {
            sim.trace()
                .save_to_file(path)
                .with_context(|| format!("writing trace to {}", path.display()))?;
            eprintln!("trace written to {}", path.display());
        }
    }

    Ok(violations)
}
