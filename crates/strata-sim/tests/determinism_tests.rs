//! Reproducibility: a seed pins the entire run.

use strata_sim::{ClusterSim, SimConfig, TraceRecord, WorkloadConfig, WorkloadGenerator};

fn run_trace(seed: u64) -> Vec<TraceRecord> {
    let mut sim = ClusterSim::new(SimConfig::default().with_seed(seed));

    let workload = WorkloadGenerator::new(WorkloadConfig::default().with_operations(150));
    let clients = sim.topology().clients.clone();
    let ops = workload.generate(&clients, 8, sim.rng_mut());
    let horizon = ops.last().unwrap().at_ms;
    sim.schedule_workload(&ops);

    let victim = sim.topology().l2s[1];
    sim.schedule_crash(horizon / 3, victim);
    sim.schedule_snapshot(horizon + 4_000);

    sim.run();
    sim.trace().records().to_vec()
}

#[test]
fn same_seed_produces_identical_traces() {
    let a = run_trace(31337);
    let b = run_trace(31337);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x, y);
    }
}

#[test]
fn different_seeds_diverge() {
    let a = run_trace(1);
    let b = run_trace(2);
    assert_ne!(a, b);
}

#[test]
fn reruns_stay_clean_across_seeds() {
    for seed in 0..5 {
        let mut sim = ClusterSim::new(SimConfig::default().with_seed(seed));
        let workload = WorkloadGenerator::new(WorkloadConfig::default().with_operations(100));
        let clients = sim.topology().clients.clone();
        let ops = workload.generate(&clients, 8, sim.rng_mut());
        sim.schedule_workload(&ops);
        sim.run();

        let violations = sim.verify();
        assert!(violations.is_empty(), "seed {seed}: {violations:?}");
        let leaks = sim.quiescence_report();
        assert!(leaks.is_empty(), "seed {seed}: {leaks:?}");
    }
}
