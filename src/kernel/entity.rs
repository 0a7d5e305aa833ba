//! Entity registration and tagged-event dispatch.
//!
//! Every simulated object that can receive a scheduled callback -- a node, a
//! memory array, a quantum channel -- implements [`Entity`] and registers
//! itself with the owning [`crate::kernel::timeline::Timeline`] by name at
//! construction, mirroring the Python base class that appends `self` to
//! `timeline.entities`.
//!
//! Rather than dynamic dispatch on message type or closures over mutable
//! state, a scheduled callback names its target entity and carries an
//! [`EntityEvent`]: a tagged variant per protocol family, matched
//! exhaustively by the receiving entity. This keeps the event queue `Clone`
//! and `'static` and lets `Timeline::execute` resolve the target by name at
//! fire time instead of holding a live reference across the wait.

use crate::message::Message;

/// The payload of a [`crate::kernel::process::Process`]: what should happen
/// to the named entity when the event fires.
#[derive(Debug, Clone)]
pub enum EntityEvent {
    /// A classical or quantum-derived message arrived from `src`.
    ReceiveMessage { src: String, message: Message },
    /// A memory finished its coherence window and reverted to `Raw`.
    MemoryExpire { memory_index: usize },
    /// A memory was excited, emitting a photon towards `peer` over the
    /// quantum channel identified by `channel`.
    ExcitePhoton {
        memory_index: usize,
        channel: String,
        peer: String,
    },
    /// A photon (or its heralding click, for the single-heralded scheme)
    /// emitted at `t_emit` arrives at the owning BSM/detector node.
    PhotonArrival {
        memory_index: usize,
        source: String,
        t_emit: u64,
    },
    /// Periodic or triggered re-evaluation of the resource manager's rules,
    /// used to drive the continuous (unreserved) generation rule.
    ResourceManagerTick,
    /// A reservation's start or end time has been reached.
    ReservationWindow { reservation_id: String, is_start: bool },
}

/// A simulated object addressable by name from the event queue.
pub trait Entity {
    /// Stable name used to look the entity back up from the timeline's
    /// registry when a scheduled event for it fires.
    fn name(&self) -> &str;
}
