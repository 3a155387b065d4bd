//! End-to-end protocol scenarios on small clusters.
//!
//! Each test builds a cluster, scripts a handful of operations (and faults),
//! runs to quiescence, and checks both the concrete outcome and the full
//! invariant suite over the trace.

use strata_proto::{ClientOp, Observation};
use strata_sim::{
    ClusterSim, SimConfig, TopologyConfig, TraceEvent, WorkloadConfig, WorkloadGenerator,
};
use strata_types::{Key, NodeId, RequestKind, Seqno, Value};

fn small_config(seed: u64, l1: usize, l2: usize, clients: usize) -> SimConfig {
    SimConfig::default().with_seed(seed).with_topology(TopologyConfig {
        l1_count: l1,
        l2_per_l1: l2,
        clients_per_l2: clients,
        key_count: 8,
    })
}

fn read_op(key: u64) -> ClientOp {
    ClientOp {
        kind: RequestKind::Read,
        key: Key::new(key),
        value: None,
    }
}

fn write_op(key: u64, value: u64) -> ClientOp {
    ClientOp {
        kind: RequestKind::Write,
        key: Key::new(key),
        value: Some(Value::new(value)),
    }
}

fn crit_write_op(key: u64, value: u64) -> ClientOp {
    ClientOp {
        kind: RequestKind::CritWrite,
        key: Key::new(key),
        value: Some(Value::new(value)),
    }
}

/// All successful client observations, in trace order.
fn observed(sim: &ClusterSim) -> Vec<(NodeId, Key, Option<Value>, Seqno)> {
    sim.trace()
        .iter()
        .filter_map(|record| match &record.event {
            TraceEvent::Observed(Observation::ClientObserved {
                key, value, seqno, ..
            }) => Some((record.actor, *key, *value, *seqno)),
            _ => None,
        })
        .collect()
}

fn assert_clean(sim: &ClusterSim) {
    let violations = sim.verify();
    assert!(violations.is_empty(), "violations: {violations:?}");
    let leaks = sim.quiescence_report();
    assert!(leaks.is_empty(), "leaks: {leaks:?}");
}

#[test]
fn read_miss_then_cache_hit() {
    let mut sim = ClusterSim::new(small_config(1, 1, 1, 1));
    let client = sim.topology().clients[0];
    let l2 = sim.topology().l2s[0];

    sim.schedule_op(0, client, read_op(1));
    sim.schedule_op(500, client, read_op(1));
    sim.run();

    // Both reads return the initial content at seqno 0.
    let seen = observed(&sim);
    assert_eq!(seen.len(), 2);
    for (_, key, value, seqno) in &seen {
        assert_eq!(*key, Key::new(1));
        assert_eq!(*value, Some(Value::new(10)));
        assert_eq!(*seqno, Seqno::ZERO);
    }

    // Only the first read left the L2; the second was a cache hit.
    let upward_reads = sim
        .trace()
        .iter()
        .filter(|record| {
            record.actor == l2
                && matches!(
                    &record.event,
                    TraceEvent::Sent { message, .. } if message.label == "Read"
                )
        })
        .count();
    assert_eq!(upward_reads, 1);

    assert_clean(&sim);
}

#[test]
fn plain_write_becomes_visible_everywhere() {
    let mut sim = ClusterSim::new(small_config(2, 2, 2, 2));
    let writer = sim.topology().clients[0];
    // A client in the opposite subtree.
    let reader = *sim.topology().clients.last().unwrap();

    sim.schedule_op(0, writer, write_op(1, 99));
    sim.schedule_op(1_000, reader, read_op(1));
    sim.run();

    assert_eq!(sim.database().value_of(Key::new(1)), Some(Value::new(99)));
    assert_eq!(sim.database().seqno_of(Key::new(1)), Seqno::new(1));

    // The invalidation broadcast updated every cache in both subtrees.
    for cache_id in sim.topology().caches().collect::<Vec<_>>() {
        assert_eq!(
            sim.cache(cache_id).value_of(Key::new(1)),
            Some(Value::new(99)),
            "cache {cache_id} missed the broadcast"
        );
        assert_eq!(sim.cache(cache_id).seqno_of(Key::new(1)), Seqno::new(1));
    }

    // Writer saw its write succeed; reader saw the new value.
    let seen = observed(&sim);
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, writer);
    assert_eq!(seen[0].2, Some(Value::new(99)));
    assert_eq!(seen[1].0, reader);
    assert_eq!(seen[1].2, Some(Value::new(99)));
    assert_eq!(seen[1].3, Seqno::new(1));

    assert_clean(&sim);
}

#[test]
fn critical_write_commits_atomically() {
    let mut sim = ClusterSim::new(small_config(3, 2, 2, 2));
    let writer = sim.topology().clients[0];
    let reader = *sim.topology().clients.last().unwrap();

    sim.schedule_op(0, writer, crit_write_op(2, 77));
    sim.schedule_op(2_000, reader, read_op(2));
    sim.run();

    assert_eq!(sim.database().value_of(Key::new(2)), Some(Value::new(77)));
    assert_eq!(sim.database().seqno_of(Key::new(2)), Seqno::new(1));
    for cache_id in sim.topology().caches().collect::<Vec<_>>() {
        assert_eq!(
            sim.cache(cache_id).value_of(Key::new(2)),
            Some(Value::new(77)),
            "cache {cache_id} did not apply the commit"
        );
        assert_eq!(sim.cache(cache_id).locked_len(), 0);
    }

    let seen = observed(&sim);
    assert_eq!(seen.len(), 2);
    // The writer's outcome carries the committed seqno.
    assert_eq!(seen[0].0, writer);
    assert_eq!(seen[0].2, Some(Value::new(77)));
    assert_eq!(seen[0].3, Seqno::new(1));

    assert_clean(&sim);
}

#[test]
fn critical_write_aborts_when_an_l1_is_down() {
    let mut sim = ClusterSim::new(small_config(4, 2, 2, 1));
    // Writer sits under the first L1; crash the second.
    let writer = sim.topology().clients[0];
    let victim = sim.topology().l1s[1];

    sim.schedule_crash(0, victim);
    sim.schedule_op(100, writer, crit_write_op(2, 77));
    sim.run();

    // The vote never completed; the coordinator aborted; nothing changed.
    assert_eq!(sim.database().value_of(Key::new(2)), Some(Value::new(20)));
    assert_eq!(sim.database().seqno_of(Key::new(2)), Seqno::ZERO);
    assert_eq!(sim.database().open_sessions(), 0);

    let aborted = sim.trace().iter().any(|record| {
        matches!(
            &record.event,
            TraceEvent::Observed(Observation::CwResolved {
                outcome: strata_proto::CwOutcome::Abort,
                ..
            })
        )
    });
    assert!(aborted, "the coordinator should have aborted the round");

    let failed = sim.trace().iter().any(|record| {
        record.actor == writer
            && matches!(
                &record.event,
                TraceEvent::Observed(Observation::ClientFailed { .. })
            )
    });
    assert!(failed, "the writer should have learned the abort");

    // No cache kept a lock or applied anything.
    for cache_id in sim.topology().caches().collect::<Vec<_>>() {
        assert_eq!(sim.cache(cache_id).locked_len(), 0);
        assert_eq!(sim.cache(cache_id).value_of(Key::new(2)), None);
    }

    assert_clean(&sim);
}

#[test]
fn plain_write_against_locked_key_fails() {
    let mut sim = ClusterSim::new(small_config(5, 2, 1, 1));
    // One L1 is down so the session stays open until the coordinator's
    // timer; the plain write lands inside that window.
    let victim = sim.topology().l1s[1];
    let writer = sim.topology().clients[0];

    sim.schedule_crash(0, victim);
    sim.schedule_op(100, writer, crit_write_op(3, 50));
    sim.schedule_op(400, writer, write_op(3, 60));
    sim.run();

    // The plain write was rejected while the session was open.
    let rejected = sim.trace().iter().any(|record| {
        matches!(
            &record.event,
            TraceEvent::Observed(Observation::OpRejected {
                kind: RequestKind::Write,
                key,
                ..
            }) if *key == Key::new(3)
        )
    });
    assert!(rejected, "the plain write should have hit the frozen key");
    assert_eq!(sim.database().value_of(Key::new(3)), Some(Value::new(30)));

    assert_clean(&sim);
}

#[test]
fn snapshot_during_write_burst_is_consistent() {
    let mut sim = ClusterSim::new(small_config(6, 2, 2, 2));

    let workload = WorkloadGenerator::new(WorkloadConfig::write_heavy().with_operations(120));
    let clients = sim.topology().clients.clone();
    let ops = workload.generate(&clients, 8, sim.rng_mut());
    sim.schedule_workload(&ops);
    sim.schedule_snapshot(1_500);
    sim.run();

    // Database + two L1s + four L2s all completed the round.
    let cuts = sim
        .trace()
        .iter()
        .filter(|record| {
            matches!(
                &record.event,
                TraceEvent::Observed(Observation::SnapshotCut(cut)) if cut.snapshot_id == 1
            )
        })
        .count();
    assert_eq!(cuts, 7, "every participant should report its cut");

    assert_clean(&sim);
}

#[test]
fn crashed_l2_times_out_clients_and_recovers_cold() {
    let mut sim = ClusterSim::new(small_config(7, 1, 1, 1));
    let client = sim.topology().clients[0];
    let l2 = sim.topology().l2s[0];

    // Warm the cache, then crash it.
    sim.schedule_op(0, client, read_op(1));
    sim.schedule_crash(500, l2);
    // This read dies inside the crash window.
    sim.schedule_op(600, client, read_op(1));
    // After recovery (500ms + 3s) the cache works again, repopulating cold.
    sim.schedule_op(5_000, client, read_op(1));
    sim.run();

    let timed_out = sim.trace().iter().any(|record| {
        record.actor == client
            && matches!(
                &record.event,
                TraceEvent::Observed(Observation::ClientTimedOut { .. })
            )
    });
    assert!(timed_out, "the request into the crash window should time out");

    let seen = observed(&sim);
    assert_eq!(seen.len(), 2, "first and third reads succeed");
    assert!(seen.iter().all(|(_, _, value, _)| *value == Some(Value::new(10))));

    assert_clean(&sim);
}

#[test]
fn mixed_workload_with_faults_holds_every_invariant() {
    let mut sim = ClusterSim::new(small_config(8, 2, 2, 2));

    let workload = WorkloadGenerator::new(WorkloadConfig::default().with_operations(250));
    let clients = sim.topology().clients.clone();
    let ops = workload.generate(&clients, 8, sim.rng_mut());
    let horizon = ops.last().unwrap().at_ms;
    sim.schedule_workload(&ops);

    // One crash in each tier, mid-workload, plus a snapshot after both have
    // recovered.
    let l1_victim = sim.topology().l1s[1];
    let l2_victim = sim.topology().l2s[0];
    sim.schedule_crash(horizon / 4, l1_victim);
    sim.schedule_crash(horizon / 2, l2_victim);
    sim.schedule_snapshot(horizon + 4_000);
    sim.run();

    assert_clean(&sim);

    // The run actually exercised the protocol.
    let successes = observed(&sim).len();
    assert!(successes > 50, "only {successes} operations succeeded");
}
