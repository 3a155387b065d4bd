//! Consistency checkers replaying the run trace.
//!
//! Each checker verifies one correctness property of the protocol by
//! consuming trace records in order; a run passes when every checker stays
//! silent through the whole trace and its end-of-run check.
//!
//! # Available Checkers
//!
//! - [`MonotonicReadChecker`]: per-client per-key seqnos never regress
//! - [`WriteVisibilityChecker`]: observed values were really committed at
//!   that seqno
//! - [`CwAtomicityChecker`]: commit ⇒ applied exactly once everywhere it was
//!   applied, with one common seqno; abort ⇒ applied nowhere
//! - [`CwExclusionChecker`]: no plain operation succeeds at the database
//!   while the key's session is open
//! - [`SeqnoAuthorityChecker`]: database seqnos advance by exactly one per
//!   commit
//! - [`HopConsistencyChecker`]: response routes are prefixes of the
//!   matching request route
//! - [`SnapshotConsistencyChecker`]: no cache captures or records in
//!   transit a seqno the database's own cut has not reached
//! - [`CrashSilenceChecker`]: crashed nodes send nothing

use std::collections::{BTreeMap, HashMap, HashSet};

use strata_proto::{CwOutcome, Observation, SnapshotCut};
use strata_types::{Key, NodeId, QueryId, Seqno, Value};

use crate::trace::{TraceEvent, TraceRecord};

// ============================================================================
// Invariant Result
// ============================================================================

/// Result of one invariant check step.
#[derive(Debug, Clone)]
pub enum InvariantResult {
    /// The invariant holds.
    Ok,
    /// The invariant is violated.
    Violated {
        /// Name of the violated invariant.
        invariant: String,
        /// Description of the violation.
        message: String,
        /// Additional context.
        context: Vec<(String, String)>,
    },
}

impl InvariantResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, InvariantResult::Ok)
    }

    fn violated(invariant: &str, message: String, context: Vec<(String, String)>) -> Self {
        InvariantResult::Violated {
            invariant: invariant.to_string(),
            message,
            context,
        }
    }
}

// ============================================================================
// Checker Trait
// ============================================================================

/// A consistency property verified against the trace.
pub trait TraceChecker {
    /// Name of this checker.
    fn name(&self) -> &'static str;

    /// Consumes one record.
    fn observe(&mut self, record: &TraceRecord) -> InvariantResult;

    /// Runs once after the whole trace has been consumed.
    fn finish(&mut self) -> InvariantResult {
        InvariantResult::Ok
    }

    /// Resets the checker to its initial state.
    fn reset(&mut self);
}

/// Replays a trace through a set of checkers, collecting every violation.
pub fn check_trace(
    trace: &[TraceRecord],
    checkers: &mut [Box<dyn TraceChecker>],
) -> Vec<InvariantResult> {
    let mut violations = Vec::new();
    for record in trace {
        for checker in checkers.iter_mut() {
            let result = checker.observe(record);
            if !result.is_ok() {
                violations.push(result);
            }
        }
    }
    for checker in checkers.iter_mut() {
        let result = checker.finish();
        if !result.is_ok() {
            violations.push(result);
        }
    }
    violations
}

/// The full default checker suite for a run.
pub fn default_checkers(
    database: NodeId,
    initial_store: &BTreeMap<Key, Value>,
) -> Vec<Box<dyn TraceChecker>> {
    vec![
        Box::new(MonotonicReadChecker::new()),
        Box::new(WriteVisibilityChecker::new(initial_store)),
        Box::new(CwAtomicityChecker::new()),
        Box::new(CwExclusionChecker::new(database)),
        Box::new(SeqnoAuthorityChecker::new(database)),
        Box::new(HopConsistencyChecker::new()),
        Box::new(SnapshotConsistencyChecker::new(database)),
        Box::new(CrashSilenceChecker::new()),
    ]
}

// ============================================================================
// Monotonic Reads
// ============================================================================

/// Per (client, key), observed seqnos never go backwards.
#[derive(Debug, Default)]
pub struct MonotonicReadChecker {
    watermarks: HashMap<(NodeId, Key), Seqno>,
}

impl MonotonicReadChecker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraceChecker for MonotonicReadChecker {
    fn name(&self) -> &'static str {
        "monotonic_reads"
    }

    fn observe(&mut self, record: &TraceRecord) -> InvariantResult {
        let TraceEvent::Observed(Observation::ClientObserved { qid, key, seqno, .. }) =
            &record.event
        else {
            return InvariantResult::Ok;
        };

        let name = self.name();
        let watermark = self
            .watermarks
            .entry((record.actor, *key))
            .or_insert(Seqno::ZERO);
        if *seqno < *watermark {
            return InvariantResult::violated(
                name,
                format!(
                    "client {} saw key {} regress from seqno {} to {}",
                    record.actor, key, watermark, seqno
                ),
                vec![("qid".to_string(), qid.to_string())],
            );
        }
        *watermark = *seqno;
        InvariantResult::Ok
    }

    fn reset(&mut self) {
        self.watermarks.clear();
    }
}

// ============================================================================
// Write Visibility
// ============================================================================

/// Every `(key, seqno, value)` observed anywhere must be a write the
/// database actually committed at that seqno (or the initial content at
/// seqno zero).
#[derive(Debug)]
pub struct WriteVisibilityChecker {
    initial: BTreeMap<Key, Value>,
    committed: HashMap<(Key, Seqno), Value>,
}

impl WriteVisibilityChecker {
    pub fn new(initial_store: &BTreeMap<Key, Value>) -> Self {
        let committed = initial_store
            .iter()
            .map(|(&k, &v)| ((k, Seqno::ZERO), v))
            .collect();
        Self {
            initial: initial_store.clone(),
            committed,
        }
    }

    fn check_observation(
        &self,
        name: &str,
        actor: NodeId,
        key: Key,
        value: Value,
        seqno: Seqno,
        qid: QueryId,
    ) -> InvariantResult {
        match self.committed.get(&(key, seqno)) {
            Some(&expected) if expected == value => InvariantResult::Ok,
            Some(&expected) => InvariantResult::violated(
                name,
                format!(
                    "node {actor} observed key {key} = {value} at seqno {seqno}, \
                     but the database committed {expected}"
                ),
                vec![("qid".to_string(), qid.to_string())],
            ),
            None => InvariantResult::violated(
                name,
                format!(
                    "node {actor} observed key {key} = {value} at seqno {seqno}, \
                     which was never committed"
                ),
                vec![("qid".to_string(), qid.to_string())],
            ),
        }
    }
}

impl TraceChecker for WriteVisibilityChecker {
    fn name(&self) -> &'static str {
        "write_visibility"
    }

    fn observe(&mut self, record: &TraceRecord) -> InvariantResult {
        match &record.event {
            TraceEvent::Observed(Observation::Committed {
                key, value, seqno, ..
            }) => {
                self.committed.insert((*key, *seqno), *value);
                InvariantResult::Ok
            }
            TraceEvent::Observed(Observation::ClientObserved {
                qid,
                key,
                value: Some(value),
                seqno,
                ..
            }) => self.check_observation(self.name(), record.actor, *key, *value, *seqno, *qid),
            TraceEvent::Observed(Observation::Applied {
                qid,
                key,
                value,
                seqno,
            }) => self.check_observation(self.name(), record.actor, *key, *value, *seqno, *qid),
            _ => InvariantResult::Ok,
        }
    }

    fn reset(&mut self) {
        self.committed = self
            .initial
            .iter()
            .map(|(&k, &v)| ((k, Seqno::ZERO), v))
            .collect();
    }
}

// ============================================================================
// Critical-Write Atomicity
// ============================================================================

/// Commit ⇒ every applier applies the session exactly once at the common
/// committed seqno; abort ⇒ nobody applies.
#[derive(Debug, Default)]
pub struct CwAtomicityChecker {
    resolved: HashMap<QueryId, (CwOutcome, Option<Seqno>)>,
    appliers: HashMap<QueryId, HashSet<NodeId>>,
}

impl CwAtomicityChecker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraceChecker for CwAtomicityChecker {
    fn name(&self) -> &'static str {
        "critical_write_atomicity"
    }

    fn observe(&mut self, record: &TraceRecord) -> InvariantResult {
        match &record.event {
            TraceEvent::Observed(Observation::CwResolved {
                qid, outcome, seqno, ..
            }) => {
                self.resolved.insert(*qid, (*outcome, *seqno));
                InvariantResult::Ok
            }
            TraceEvent::Observed(Observation::CwApplied { qid, key, seqno, .. }) => {
                let Some((outcome, resolved_seqno)) = self.resolved.get(qid) else {
                    return InvariantResult::violated(
                        self.name(),
                        format!(
                            "node {} applied critical write {qid} before any outcome",
                            record.actor
                        ),
                        vec![],
                    );
                };
                if *outcome == CwOutcome::Abort {
                    return InvariantResult::violated(
                        self.name(),
                        format!(
                            "node {} applied aborted critical write {qid} on key {key}",
                            record.actor
                        ),
                        vec![],
                    );
                }
                if Some(*seqno) != *resolved_seqno {
                    return InvariantResult::violated(
                        self.name(),
                        format!(
                            "node {} applied critical write {qid} at seqno {seqno}, \
                             committed seqno was {resolved_seqno:?}",
                            record.actor
                        ),
                        vec![],
                    );
                }
                if !self.appliers.entry(*qid).or_default().insert(record.actor) {
                    return InvariantResult::violated(
                        self.name(),
                        format!(
                            "node {} applied critical write {qid} twice",
                            record.actor
                        ),
                        vec![],
                    );
                }
                InvariantResult::Ok
            }
            _ => InvariantResult::Ok,
        }
    }

    fn reset(&mut self) {
        self.resolved.clear();
        self.appliers.clear();
    }
}

// ============================================================================
// Critical-Write Exclusion
// ============================================================================

/// While a key's session is open at the database, no plain operation on it
/// succeeds there.
#[derive(Debug)]
pub struct CwExclusionChecker {
    database: NodeId,
    open: HashMap<Key, QueryId>,
}

impl CwExclusionChecker {
    pub fn new(database: NodeId) -> Self {
        Self {
            database,
            open: HashMap::new(),
        }
    }
}

impl TraceChecker for CwExclusionChecker {
    fn name(&self) -> &'static str {
        "critical_write_exclusion"
    }

    fn observe(&mut self, record: &TraceRecord) -> InvariantResult {
        if record.actor != self.database {
            return InvariantResult::Ok;
        }

        match &record.event {
            TraceEvent::Observed(Observation::CwBegun { qid, key, .. }) => {
                self.open.insert(*key, *qid);
                InvariantResult::Ok
            }
            TraceEvent::Observed(Observation::CwResolved { key, .. }) => {
                self.open.remove(key);
                InvariantResult::Ok
            }
            TraceEvent::Observed(Observation::Committed {
                qid,
                key,
                critical: false,
                ..
            }) => {
                if let Some(session) = self.open.get(key) {
                    return InvariantResult::violated(
                        self.name(),
                        format!(
                            "plain write {qid} committed on key {key} during session {session}"
                        ),
                        vec![],
                    );
                }
                InvariantResult::Ok
            }
            TraceEvent::Sent { message, .. } => {
                // A successful read response leaving the database for a key
                // under an open session breaks mutual exclusion.
                let is_read_response = message.label == "Response"
                    && message.kind.is_some_and(strata_types::RequestKind::is_read);
                if is_read_response && message.value.is_some() {
                    if let Some(key) = message.key {
                        if let Some(session) = self.open.get(&key) {
                            return InvariantResult::violated(
                                self.name(),
                                format!(
                                    "database served key {key} during session {session}"
                                ),
                                vec![],
                            );
                        }
                    }
                }
                InvariantResult::Ok
            }
            _ => InvariantResult::Ok,
        }
    }

    fn reset(&mut self) {
        self.open.clear();
    }
}

// ============================================================================
// Seqno Authority
// ============================================================================

/// Database seqnos advance by exactly one per committed write.
#[derive(Debug)]
pub struct SeqnoAuthorityChecker {
    database: NodeId,
    last: HashMap<Key, Seqno>,
}

impl SeqnoAuthorityChecker {
    pub fn new(database: NodeId) -> Self {
        Self {
            database,
            last: HashMap::new(),
        }
    }
}

impl TraceChecker for SeqnoAuthorityChecker {
    fn name(&self) -> &'static str {
        "seqno_authority"
    }

    fn observe(&mut self, record: &TraceRecord) -> InvariantResult {
        if record.actor != self.database {
            return InvariantResult::Ok;
        }
        let TraceEvent::Observed(Observation::Committed { qid, key, seqno, .. }) = &record.event
        else {
            return InvariantResult::Ok;
        };

        let previous = self.last.get(key).copied().unwrap_or(Seqno::ZERO);
        if *seqno != previous.next() {
            return InvariantResult::violated(
                self.name(),
                format!(
                    "commit {qid} moved key {key} from seqno {previous} to {seqno}, \
                     expected {}",
                    previous.next()
                ),
                vec![],
            );
        }
        self.last.insert(*key, *seqno);
        InvariantResult::Ok
    }

    fn reset(&mut self) {
        self.last.clear();
    }
}

// ============================================================================
// Hop Consistency
// ============================================================================

/// Response routes are prefixes of the route the request recorded.
#[derive(Debug, Default)]
pub struct HopConsistencyChecker {
    /// Longest route seen per request.
    request_hops: HashMap<QueryId, Vec<NodeId>>,
}

impl HopConsistencyChecker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraceChecker for HopConsistencyChecker {
    fn name(&self) -> &'static str {
        "hop_consistency"
    }

    fn observe(&mut self, record: &TraceRecord) -> InvariantResult {
        let TraceEvent::Sent { message, .. } = &record.event else {
            return InvariantResult::Ok;
        };
        let (Some(qid), Some(hops)) = (message.qid, message.hops.as_ref()) else {
            return InvariantResult::Ok;
        };

        if message.is_request() {
            let recorded = self.request_hops.entry(qid).or_default();
            if hops.len() > recorded.len() {
                *recorded = hops.clone();
            }
            return InvariantResult::Ok;
        }

        if message.is_response() {
            if let Some(request) = self.request_hops.get(&qid) {
                let is_prefix =
                    hops.len() <= request.len() && request[..hops.len()] == hops[..];
                if !is_prefix {
                    return InvariantResult::violated(
                        self.name(),
                        format!(
                            "response route for {qid} is not a prefix of its request route"
                        ),
                        vec![
                            ("request".to_string(), format!("{request:?}")),
                            ("response".to_string(), format!("{hops:?}")),
                        ],
                    );
                }
            }
        }
        InvariantResult::Ok
    }

    fn reset(&mut self) {
        self.request_hops.clear();
    }
}

// ============================================================================
// Snapshot Consistency
// ============================================================================

/// No cache's cut may be ahead of the database's cut: every seqno a cache
/// captured, or recorded in transit, is bounded by the database's captured
/// seqno for that key. Rounds without a database cut (interrupted by the
/// run's end) are skipped.
#[derive(Debug)]
pub struct SnapshotConsistencyChecker {
    database: NodeId,
    cuts: Vec<(NodeId, SnapshotCut)>,
}

impl SnapshotConsistencyChecker {
    pub fn new(database: NodeId) -> Self {
        Self {
            database,
            cuts: Vec::new(),
        }
    }
}

impl TraceChecker for SnapshotConsistencyChecker {
    fn name(&self) -> &'static str {
        "snapshot_cut"
    }

    fn observe(&mut self, record: &TraceRecord) -> InvariantResult {
        if let TraceEvent::Observed(Observation::SnapshotCut(cut)) = &record.event {
            self.cuts.push((record.actor, cut.clone()));
        }
        InvariantResult::Ok
    }

    fn finish(&mut self) -> InvariantResult {
        let mut db_cuts: HashMap<u64, &SnapshotCut> = HashMap::new();
        for (actor, cut) in &self.cuts {
            if *actor == self.database {
                db_cuts.insert(cut.snapshot_id, cut);
            }
        }

        for (actor, cut) in &self.cuts {
            if *actor == self.database {
                continue;
            }
            let Some(db_cut) = db_cuts.get(&cut.snapshot_id) else {
                continue;
            };
            let bound_exceeded = cut
                .seqno
                .iter()
                .chain(cut.transit_seqno.iter())
                .find(|&(key, seqno)| {
                    db_cut.seqno.get(key).copied().unwrap_or(Seqno::ZERO) < *seqno
                });
            if let Some((key, seqno)) = bound_exceeded {
                return InvariantResult::violated(
                    self.name(),
                    format!(
                        "snapshot {}: node {actor} recorded key {key} at seqno {seqno}, \
                         ahead of the database cut",
                        cut.snapshot_id
                    ),
                    vec![],
                );
            }
        }
        InvariantResult::Ok
    }

    fn reset(&mut self) {
        self.cuts.clear();
    }
}

// ============================================================================
// Crash Silence
// ============================================================================

/// A crashed node sends nothing until it recovers.
#[derive(Debug, Default)]
pub struct CrashSilenceChecker {
    crashed: HashSet<NodeId>,
}

impl CrashSilenceChecker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraceChecker for CrashSilenceChecker {
    fn name(&self) -> &'static str {
        "crash_silence"
    }

    fn observe(&mut self, record: &TraceRecord) -> InvariantResult {
        match &record.event {
            TraceEvent::Crashed => {
                self.crashed.insert(record.actor);
                InvariantResult::Ok
            }
            TraceEvent::Recovered => {
                self.crashed.remove(&record.actor);
                InvariantResult::Ok
            }
            TraceEvent::Sent { to, message } => {
                if self.crashed.contains(&record.actor) {
                    return InvariantResult::violated(
                        self.name(),
                        format!(
                            "crashed node {} sent {} to {to}",
                            record.actor, message.label
                        ),
                        vec![],
                    );
                }
                InvariantResult::Ok
            }
            _ => InvariantResult::Ok,
        }
    }

    fn reset(&mut self) {
        self.crashed.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::RequestKind;

    fn client_read(actor: u64, key: u64, value: u64, seqno: u64, q: u32) -> TraceRecord {
        TraceRecord {
            time_ns: 0,
            actor: NodeId::new(actor),
            event: TraceEvent::Observed(Observation::ClientObserved {
                qid: QueryId::from_origin_and_local(NodeId::new(actor), q),
                kind: RequestKind::Read,
                key: Key::new(key),
                value: Some(Value::new(value)),
                seqno: Seqno::new(seqno),
                critical: false,
            }),
        }
    }

    fn committed(key: u64, value: u64, seqno: u64, critical: bool) -> TraceRecord {
        TraceRecord {
            time_ns: 0,
            actor: NodeId::new(0),
            event: TraceEvent::Observed(Observation::Committed {
                qid: QueryId::from_origin_and_local(NodeId::new(5), seqno as u32),
                key: Key::new(key),
                value: Value::new(value),
                seqno: Seqno::new(seqno),
                critical,
            }),
        }
    }

    #[test]
    fn monotonic_checker_flags_regression() {
        let mut checker = MonotonicReadChecker::new();
        assert!(checker.observe(&client_read(7, 1, 10, 3, 0)).is_ok());
        assert!(checker.observe(&client_read(7, 1, 10, 3, 1)).is_ok());
        assert!(!checker.observe(&client_read(7, 1, 10, 2, 2)).is_ok());
        // Another client's watermark is independent.
        assert!(checker.observe(&client_read(8, 1, 10, 1, 0)).is_ok());
    }

    #[test]
    fn visibility_checker_accepts_initial_and_committed() {
        let initial: BTreeMap<Key, Value> = [(Key::new(1), Value::new(10))].into();
        let mut checker = WriteVisibilityChecker::new(&initial);

        // Initial content at seqno zero.
        assert!(checker.observe(&client_read(7, 1, 10, 0, 0)).is_ok());
        // Unknown (key, seqno) pair.
        assert!(!checker.observe(&client_read(7, 1, 99, 1, 1)).is_ok());
        // After the commit it is fine.
        assert!(checker.observe(&committed(1, 99, 1, false)).is_ok());
        assert!(checker.observe(&client_read(7, 1, 99, 1, 2)).is_ok());
        // Wrong value at a committed seqno.
        assert!(!checker.observe(&client_read(7, 1, 98, 1, 3)).is_ok());
    }

    fn cw_resolved(q: u32, key: u64, outcome: CwOutcome, seqno: Option<u64>) -> TraceRecord {
        TraceRecord {
            time_ns: 0,
            actor: NodeId::new(0),
            event: TraceEvent::Observed(Observation::CwResolved {
                qid: QueryId::from_origin_and_local(NodeId::new(5), q),
                key: Key::new(key),
                outcome,
                seqno: seqno.map(Seqno::new),
            }),
        }
    }

    fn cw_applied(actor: u64, q: u32, key: u64, seqno: u64) -> TraceRecord {
        TraceRecord {
            time_ns: 0,
            actor: NodeId::new(actor),
            event: TraceEvent::Observed(Observation::CwApplied {
                qid: QueryId::from_origin_and_local(NodeId::new(5), q),
                key: Key::new(key),
                value: Value::new(77),
                seqno: Seqno::new(seqno),
            }),
        }
    }

    #[test]
    fn atomicity_checker_commit_path() {
        let mut checker = CwAtomicityChecker::new();
        assert!(checker
            .observe(&cw_resolved(0, 2, CwOutcome::Commit, Some(5)))
            .is_ok());
        assert!(checker.observe(&cw_applied(10, 0, 2, 5)).is_ok());
        // Wrong seqno.
        assert!(!checker.observe(&cw_applied(11, 0, 2, 6)).is_ok());
        // Double apply.
        assert!(!checker.observe(&cw_applied(10, 0, 2, 5)).is_ok());
    }

    #[test]
    fn atomicity_checker_abort_path() {
        let mut checker = CwAtomicityChecker::new();
        assert!(checker
            .observe(&cw_resolved(0, 2, CwOutcome::Abort, None))
            .is_ok());
        assert!(!checker.observe(&cw_applied(10, 0, 2, 5)).is_ok());
    }

    #[test]
    fn exclusion_checker_blocks_plain_commits_in_session() {
        let mut checker = CwExclusionChecker::new(NodeId::new(0));
        let begun = TraceRecord {
            time_ns: 0,
            actor: NodeId::new(0),
            event: TraceEvent::Observed(Observation::CwBegun {
                qid: QueryId::from_origin_and_local(NodeId::new(5), 0),
                key: Key::new(2),
                value: Value::new(77),
            }),
        };
        assert!(checker.observe(&begun).is_ok());
        assert!(!checker.observe(&committed(2, 5, 1, false)).is_ok());
        // Critical commits inside the session are the session itself.
        assert!(checker.observe(&committed(2, 77, 1, true)).is_ok());
        assert!(checker
            .observe(&cw_resolved(0, 2, CwOutcome::Commit, Some(1)))
            .is_ok());
        assert!(checker.observe(&committed(2, 5, 2, false)).is_ok());
    }

    #[test]
    fn seqno_checker_requires_increment_by_one() {
        let mut checker = SeqnoAuthorityChecker::new(NodeId::new(0));
        assert!(checker.observe(&committed(1, 99, 1, false)).is_ok());
        assert!(checker.observe(&committed(1, 98, 2, false)).is_ok());
        // Gap.
        assert!(!checker.observe(&committed(1, 97, 4, false)).is_ok());
    }

    #[test]
    fn crash_silence_checker() {
        let mut checker = CrashSilenceChecker::new();
        let crashed = TraceRecord {
            time_ns: 0,
            actor: NodeId::new(3),
            event: TraceEvent::Crashed,
        };
        let sent = TraceRecord {
            time_ns: 1,
            actor: NodeId::new(3),
            event: TraceEvent::Sent {
                to: NodeId::new(4),
                message: crate::trace::MessageMeta {
                    label: "Response".to_string(),
                    ..Default::default()
                },
            },
        };
        let recovered = TraceRecord {
            time_ns: 2,
            actor: NodeId::new(3),
            event: TraceEvent::Recovered,
        };

        assert!(checker.observe(&sent).is_ok());
        assert!(checker.observe(&crashed).is_ok());
        assert!(!checker.observe(&sent).is_ok());
        assert!(checker.observe(&recovered).is_ok());
        assert!(checker.observe(&sent).is_ok());
    }

    #[test]
    fn snapshot_checker_bounds_cache_cuts() {
        let mut checker = SnapshotConsistencyChecker::new(NodeId::new(0));

        let cut = |actor: u64, seqno: u64| TraceRecord {
            time_ns: 0,
            actor: NodeId::new(actor),
            event: TraceEvent::Observed(Observation::SnapshotCut(SnapshotCut {
                snapshot_id: 1,
                store: [(Key::new(1), Value::new(10))].into(),
                seqno: [(Key::new(1), Seqno::new(seqno))].into(),
                transit_data: BTreeMap::new(),
                transit_seqno: BTreeMap::new(),
            })),
        };

        checker.observe(&cut(0, 5)); // database cut
        checker.observe(&cut(10, 5)); // cache at the bound
        assert!(checker.finish().is_ok());

        checker.reset();
        checker.observe(&cut(0, 5));
        checker.observe(&cut(10, 6)); // cache ahead of the database
        assert!(!checker.finish().is_ok());
    }
}
