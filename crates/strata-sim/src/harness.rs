//! The cluster simulation harness.
//!
//! Owns everything the pure nodes are not allowed to: the clock, the event
//! queue, the RNG, the delayed network, the timer registry, and the trace.
//! One [`ClusterSim`] is one reproducible run: pop the next event, advance
//! the clock, dispatch to the owning node, and feed the node's output back
//! into the queue.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use strata_proto::{
    CacheNode, CacheTier, Client, Database, Node, NodeEvent, NodeOutput, Payload, TimeoutKind,
    TimerCmd,
};
use strata_types::{Key, NodeId, Value};

use crate::clock::{ms_to_ns, SimClock};
use crate::event::{Event, EventId, EventKind, EventQueue};
use crate::invariant::{check_trace, default_checkers, InvariantResult};
use crate::network::{NetworkConfig, SimNetwork};
use crate::rng::SimRng;
use crate::topology::Topology;
use crate::trace::{MessageMeta, TraceEvent, TraceLog, TraceRecord};
use crate::workload::ScheduledOp;
use crate::SimConfig;

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct SimSummary {
    pub seed: u64,
    pub events_processed: u64,
    pub final_time_ns: u64,
    pub trace_len: usize,
}

/// A full simulated cluster and its run state.
pub struct ClusterSim {
    config: SimConfig,
    topology: Topology,
    initial_store: BTreeMap<Key, Value>,

    clock: SimClock,
    queue: EventQueue,
    rng: SimRng,
    network: SimNetwork,
    nodes: HashMap<NodeId, Node>,

    /// Live one-shot timers per `(owner, kind)`.
    timers: HashMap<(NodeId, TimeoutKind), EventId>,

    trace: TraceLog,
    events_processed: u64,
}

impl ClusterSim {
    /// Builds the cluster: allocates the tree, constructs every node, and
    /// wires parents and children. Wiring happens synchronously before time
    /// starts, mirroring the bootstrap join phase.
    pub fn new(config: SimConfig) -> Self {
        let topology = Topology::build(config.topology);
        let initial_store = Topology::initial_store(config.topology);

        let mut nodes: HashMap<NodeId, Node> = HashMap::new();
        nodes.insert(
            topology.database,
            Node::Database(Database::new(
                topology.database,
                initial_store.clone(),
                config.timing,
            )),
        );
        for &l1 in &topology.l1s {
            nodes.insert(
                l1,
                Node::Cache(CacheNode::new(l1, CacheTier::L1, config.timing)),
            );
        }
        for &l2 in &topology.l2s {
            nodes.insert(
                l2,
                Node::Cache(CacheNode::new(l2, CacheTier::L2, config.timing)),
            );
        }
        for &client in &topology.clients {
            nodes.insert(client, Node::Client(Client::new(client, config.timing)));
        }

        // Join fan-out: untraced, instantaneous, before the first event.
        let mut to_join: Vec<NodeId> = nodes.keys().copied().collect();
        to_join.sort();
        for id in to_join {
            let join = topology.join_for(id);
            let node = nodes.get_mut(&id).expect("node just inserted");
            node.handle(NodeEvent::Message {
                from: topology.database,
                payload: Payload::Join(join),
            });
        }

        let network = SimNetwork::new(NetworkConfig {
            delay_ms: config.timing.network_delay_ms,
        });

        Self {
            rng: SimRng::new(config.seed),
            topology,
            initial_store,
            clock: SimClock::new(),
            queue: EventQueue::new(),
            network,
            nodes,
            timers: HashMap::new(),
            trace: TraceLog::new(),
            events_processed: 0,
            config,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn trace(&self) -> &TraceLog {
        &self.trace
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn rng_mut(&mut self) -> &mut SimRng {
        &mut self.rng
    }

    /// The database node, for assertions.
    pub fn database(&self) -> &Database {
        match &self.nodes[&self.topology.database] {
            Node::Database(db) => db,
            _ => unreachable!("root is always the database"),
        }
    }

    /// A cache node, for assertions.
    pub fn cache(&self, id: NodeId) -> &CacheNode {
        match &self.nodes[&id] {
            Node::Cache(cache) => cache,
            _ => panic!("node {id} is not a cache"),
        }
    }

    /// A client node, for assertions.
    pub fn client(&self, id: NodeId) -> &Client {
        match &self.nodes[&id] {
            Node::Client(client) => client,
            _ => panic!("node {id} is not a client"),
        }
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Schedules a workload stream.
    pub fn schedule_workload(&mut self, ops: &[ScheduledOp]) {
        for scheduled in ops {
            self.queue.schedule(
                ms_to_ns(scheduled.at_ms),
                EventKind::Inject {
                    client: scheduled.client,
                    op: scheduled.op,
                },
            );
        }
    }

    /// Schedules a single operation at a client.
    pub fn schedule_op(&mut self, at_ms: u64, client: NodeId, op: strata_proto::ClientOp) {
        self.queue
            .schedule(ms_to_ns(at_ms), EventKind::Inject { client, op });
    }

    /// Schedules a cache crash; recovery follows automatically after the
    /// configured delay.
    pub fn schedule_crash(&mut self, at_ms: u64, node: NodeId) {
        self.queue
            .schedule(ms_to_ns(at_ms), EventKind::Crash { node });
    }

    /// Schedules a snapshot round.
    pub fn schedule_snapshot(&mut self, at_ms: u64) {
        self.queue.schedule(ms_to_ns(at_ms), EventKind::StartSnapshot);
    }

    // ========================================================================
    // Run Loop
    // ========================================================================

    /// Processes the next event, if the run limits allow another.
    pub fn step(&mut self) -> Option<Event> {
        if self.events_processed >= self.config.max_events {
            return None;
        }
        let event = self.queue.pop()?;
        if event.time_ns > ms_to_ns(self.config.max_time_ms) {
            // Past the horizon: put it back and stop.
            self.queue.schedule(event.time_ns, event.kind);
            return None;
        }

        self.clock.advance_to(event.time_ns);
        self.events_processed += 1;
        self.dispatch(event.clone());
        Some(event)
    }

    /// Runs to quiescence (or a run limit) and returns the summary.
    pub fn run(&mut self) -> SimSummary {
        while self.step().is_some() {}
        SimSummary {
            seed: self.config.seed,
            events_processed: self.events_processed,
            final_time_ns: self.clock.now(),
            trace_len: self.trace.len(),
        }
    }

    fn dispatch(&mut self, event: Event) {
        match event.kind {
            EventKind::Deliver { from, to, payload } => {
                self.record(to, TraceEvent::Delivered {
                    from,
                    message: MessageMeta::of(&payload),
                });
                let output = self.handle_at(to, NodeEvent::Message { from, payload });
                self.process_output(to, output);
            }
            EventKind::Timer { node, kind } => {
                self.timers.remove(&(node, kind));
                let output = self.handle_at(node, NodeEvent::Timeout(kind));
                self.process_output(node, output);
            }
            EventKind::Crash { node } => {
                debug!(node = %node, "cache crash");
                self.record(node, TraceEvent::Crashed);
                let output = self.handle_at(node, NodeEvent::Crash);
                self.process_output(node, output);
                // The detached recovery timer: not cancellable, not in the
                // registry.
                let recover_at =
                    self.clock.now() + ms_to_ns(self.config.timing.recovery_delay_ms);
                self.queue.schedule(recover_at, EventKind::Recover { node });
            }
            EventKind::Recover { node } => {
                debug!(node = %node, "cache recovery");
                self.record(node, TraceEvent::Recovered);
                let output = self.handle_at(node, NodeEvent::Recover);
                self.process_output(node, output);
            }
            EventKind::Inject { client, op } => {
                let output = self.handle_at(client, NodeEvent::Operation(op));
                self.process_output(client, output);
            }
            EventKind::StartSnapshot => {
                let database = self.topology.database;
                let output = self.handle_at(
                    database,
                    NodeEvent::Message {
                        from: database,
                        payload: Payload::StartSnapshot,
                    },
                );
                self.process_output(database, output);
            }
        }
    }

    fn handle_at(&mut self, id: NodeId, event: NodeEvent) -> NodeOutput {
        match self.nodes.get_mut(&id) {
            Some(node) => node.handle(event),
            None => NodeOutput::empty(),
        }
    }

    /// Feeds a node's output back into the run: trace the observations,
    /// apply the timer commands, and put every message on the wire.
    fn process_output(&mut self, actor: NodeId, output: NodeOutput) {
        for observation in output.observations {
            self.record(actor, TraceEvent::Observed(observation));
        }

        for command in output.timers {
            match command {
                TimerCmd::Schedule { kind, delay_ms } => {
                    let fire_at = self.clock.now() + ms_to_ns(delay_ms);
                    let id = self.queue.schedule(fire_at, EventKind::Timer { node: actor, kind });
                    if let Some(stale) = self.timers.insert((actor, kind), id) {
                        self.queue.cancel(stale);
                    }
                }
                TimerCmd::Cancel { kind } => {
                    if let Some(id) = self.timers.remove(&(actor, kind)) {
                        self.queue.cancel(id);
                    }
                }
            }
        }

        for outbound in output.messages {
            let deliver_at = self
                .network
                .send(actor, outbound.to, self.clock.now(), &mut self.rng);
            debug!(
                from = %actor,
                to = %outbound.to,
                label = outbound.payload.label(),
                deliver_at,
                "send"
            );
            self.record(actor, TraceEvent::Sent {
                to: outbound.to,
                message: MessageMeta::of(&outbound.payload),
            });
            self.queue.schedule(
                deliver_at,
                EventKind::Deliver {
                    from: actor,
                    to: outbound.to,
                    payload: outbound.payload,
                },
            );
        }
    }

    fn record(&mut self, actor: NodeId, event: TraceEvent) {
        self.trace.push(TraceRecord {
            time_ns: self.clock.now(),
            actor,
            event,
        });
    }

    // ========================================================================
    // Verification
    // ========================================================================

    /// Replays the trace through the default checker suite.
    pub fn verify(&self) -> Vec<InvariantResult> {
        let mut checkers = default_checkers(self.topology.database, &self.initial_store);
        check_trace(self.trace.records(), &mut checkers)
    }

    /// Names of every transient structure that should be empty once the run
    /// has drained. Non-empty entries indicate a leak.
    pub fn quiescence_report(&self) -> Vec<String> {
        let mut leaks = Vec::new();

        let db = self.database();
        if db.open_sessions() > 0 {
            leaks.push(format!("database sessions: {}", db.open_sessions()));
        }
        for cache_id in self.topology.caches().collect::<Vec<_>>() {
            let cache = self.cache(cache_id);
            if cache.pending_len() > 0 {
                leaks.push(format!("cache {cache_id} pending: {}", cache.pending_len()));
            }
            if cache.locked_len() > 0 {
                leaks.push(format!("cache {cache_id} locks: {}", cache.locked_len()));
            }
            if cache.open_sessions() > 0 {
                leaks.push(format!(
                    "cache {cache_id} sessions: {}",
                    cache.open_sessions()
                ));
            }
        }
        for &client_id in &self.topology.clients {
            let client = self.client(client_id);
            if client.pending_len() > 0 {
                leaks.push(format!(
                    "client {client_id} pending: {}",
                    client.pending_len()
                ));
            }
        }
        if !self.timers.is_empty() {
            leaks.push(format!("timer registry: {}", self.timers.len()));
        }
        leaks
    }
}
