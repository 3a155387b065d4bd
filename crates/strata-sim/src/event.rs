//! Time-ordered event queue.
//!
//! The scheduler at the heart of the simulation: a binary heap ordered by
//! `(time, sequence)` so that events at the same instant pop in scheduling
//! order (FIFO). Cancellation is lazy: cancelled ids are remembered and
//! skipped at pop time, which keeps one-shot request timers cheap.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use strata_proto::{ClientOp, Payload, TimeoutKind};
use strata_types::NodeId;

// ============================================================================
// Events
// ============================================================================

/// Opaque handle to a scheduled event, usable for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// What happens when an event fires.
#[derive(Debug, Clone)]
pub enum EventKind {
    /// A message arrives at its destination.
    Deliver {
        from: NodeId,
        to: NodeId,
        payload: Payload,
    },

    /// A node's one-shot timer fires.
    Timer { node: NodeId, kind: TimeoutKind },

    /// A cache crash-stops.
    Crash { node: NodeId },

    /// A crashed cache comes back up (the detached recovery timer).
    Recover { node: NodeId },

    /// The workload driver hands a client an operation.
    Inject { client: NodeId, op: ClientOp },

    /// A snapshot round opens at the database.
    StartSnapshot,
}

/// A scheduled event.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: EventId,
    pub time_ns: u64,
    pub kind: EventKind,
}

// Min-heap ordering by (time, id); ids are handed out sequentially, so equal
// times pop FIFO.
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.time_ns, other.id).cmp(&(self.time_ns, self.id))
    }
}

// ============================================================================
// Event Queue
// ============================================================================

/// Priority queue of scheduled events with lazy cancellation.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Event>,
    cancelled: HashSet<EventId>,
    next_id: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an event at the given time and returns its handle.
    pub fn schedule(&mut self, time_ns: u64, kind: EventKind) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.heap.push(Event { id, time_ns, kind });
        id
    }

    /// Cancels a scheduled event. Idempotent; cancelling an already-fired
    /// event is a no-op.
    pub fn cancel(&mut self, id: EventId) {
        self.cancelled.insert(id);
    }

    /// Removes and returns the next live event.
    pub fn pop(&mut self) -> Option<Event> {
        while let Some(event) = self.heap.pop() {
            if self.cancelled.remove(&event.id) {
                continue;
            }
            return Some(event);
        }
        None
    }

    /// The time of the next live event, if any.
    pub fn next_time(&mut self) -> Option<u64> {
        // Drain cancelled entries off the top so the peek is live.
        while let Some(event) = self.heap.peek() {
            if self.cancelled.contains(&event.id) {
                let event = self.heap.pop().expect("peeked entry exists");
                self.cancelled.remove(&event.id);
                continue;
            }
            return Some(event.time_ns);
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.heap.len() <= self.cancelled.len()
    }

    /// Number of live scheduled entries.
    pub fn len(&self) -> usize {
        self.heap.len().saturating_sub(self.cancelled.len())
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.cancelled.clear();
    }
}
