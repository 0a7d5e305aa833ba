//! Scheduled events for the discrete-event kernel.
//!
//! An [`Event`] is ordered by `(time, priority, sequence)`, ascending on all
//! three. `sequence` is assigned by [`crate::kernel::timeline::Timeline`] at
//! schedule time and exists purely to make the ordering total and stable:
//! two events scheduled for the same `(time, priority)` fire in the order
//! they were scheduled.

use std::cmp::Ordering;

use crate::kernel::process::Process;

/// Time unit of the simulation. Picosecond resolution per spec; the kernel
/// itself is agnostic to the unit and just orders integers.
pub type SimTime = u64;

/// Lower numeric value fires first when two events share the same `time`.
pub const DEFAULT_PRIORITY: i64 = i64::MAX;

#[derive(Debug, Clone)]
pub struct Event {
    pub time: SimTime,
    pub priority: i64,
    pub process: Process,
    pub(crate) sequence: u64,
    pub(crate) invalidated: bool,
}

impl Event {
    pub fn new(time: SimTime, process: Process) -> Self {
        Self {
            time,
            priority: DEFAULT_PRIORITY,
            process,
            sequence: 0,
            invalidated: false,
        }
    }

    pub fn with_priority(time: SimTime, process: Process, priority: i64) -> Self {
        Self {
            time,
            priority,
            process,
            sequence: 0,
            invalidated: false,
        }
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }
}

/// A stable, opaque handle to a scheduled [`Event`], usable with
/// [`crate::kernel::timeline::Timeline::remove_event`] without holding a
/// borrow of the event itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle {
    pub(crate) sequence: u64,
    pub(crate) time: SimTime,
}

impl EventHandle {
    pub fn time(&self) -> SimTime {
        self.time
    }
}

/// Min-heap ordering key: earliest time first, then smallest priority, then
/// insertion order. `std::collections::BinaryHeap` is a max-heap, so we
/// reverse the comparison the way the teacher reverses `Instant` ordering in
/// its pending-packet heap.
#[derive(Debug, Clone)]
pub(crate) struct QueuedEvent(pub Event);

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.0.time == other.0.time
            && self.0.priority == other.0.priority
            && self.0.sequence == other.0.sequence
    }
}

impl Eq for QueuedEvent {}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .time
            .cmp(&self.0.time)
            .then_with(|| other.0.priority.cmp(&self.0.priority))
            .then_with(|| other.0.sequence.cmp(&self.0.sequence))
    }
}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
