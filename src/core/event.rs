use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::resource::ResourceStatus;
use super::types::{ResourceId, UnitId};

pub type EventId = String;

/// Delivery priority of an event. Input shortages are reported `High`,
/// output overflow `Low`, so the controller handles under-supply first when
/// both occur at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    High,
}

/// A shortage or overflow signal raised by a production unit.
///
/// Events carry names rather than references, so the queue owns its data
/// independently of the lifetime of the unit that raised it.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: EventId,
    /// Unit that raised the event.
    pub source: UnitId,
    /// Resource implicated in the triggering condition.
    pub resource: ResourceId,
    pub status: ResourceStatus,
    pub priority: Priority,
    /// Quantity involved: the attempted input amount for shortages, the
    /// unstored remainder for overflow.
    pub amount: u64,
}

impl Event {
    pub fn new(
        source: impl Into<UnitId>,
        resource: impl Into<ResourceId>,
        status: ResourceStatus,
        priority: Priority,
        amount: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            resource: resource.into(),
            status,
            priority,
            amount,
        }
    }
}

/// Heap wrapper ordering events by priority, then by recency within a
/// priority band: the most recently pushed of equal priority pops first.
#[derive(Debug)]
struct QueuedEvent {
    event: Event,
    seq: u64,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event.priority == other.event.priority && self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: highest priority first, newest sequence
        // number first among equals.
        self.event
            .priority
            .cmp(&other.event.priority)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

struct Inner {
    heap: BinaryHeap<QueuedEvent>,
    seq: u64,
}

/// Thread-safe priority channel carrying events from units to the
/// controller.
///
/// A single coarse lock serializes push and pop for the whole queue; queue
/// traffic is infrequent relative to unit processing time, so contention is
/// not a concern. The condvar lets the consumer wait for work with a bound
/// instead of busy-polling.
pub struct EventQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                seq: 0,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Insert an event, keeping the queue ordered by descending priority
    /// with newest-first among equal priorities.
    pub fn push(&self, event: Event) {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.seq;
        inner.seq += 1;
        inner.heap.push(QueuedEvent { event, seq });
        self.not_empty.notify_one();
    }

    /// Remove and return the front event, or `None` if the queue is empty.
    /// Never blocks.
    pub fn pop(&self) -> Option<Event> {
        self.inner.lock().unwrap().heap.pop().map(|q| q.event)
    }

    /// Like [`pop`](Self::pop), but waits up to `timeout` for an event to
    /// arrive before giving up. Never blocks past the timeout.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Event> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(queued) = inner.heap.pop() {
                return Some(queued.event);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self.not_empty.wait_timeout(inner, deadline - now).unwrap();
            inner = guard;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all remaining entries.
    pub fn clear(&self) {
        self.inner.lock().unwrap().heap.clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
