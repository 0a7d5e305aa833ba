//! RSVP-style entanglement reservation.
//!
//! A two-pass admission protocol grounded in
//! `network_management/reservation.py`: the initiator's `Reservation`
//! request walks the path forward collecting each hop's spare memory
//! capacity (`QCap`) and checking it can carve out a non-overlapping
//! `[start_time, end_time)` window on enough memories
//! (`MemoryTimeCard::schedule_reservation`, a binary search over each
//! memory's sorted, non-overlapping booked intervals -- admission rejects
//! only on a strict interval overlap, otherwise returns the insertion
//! index, exactly as the original). If every hop admits, rules are
//! installed back along the path in reverse: entanglement-generation rules
//! at the two endpoints, swapping rules at interior hops (in binary-
//! subdivision order, so the chain collapses from the middle outward
//! rather than strictly left-to-right), and purification rules wherever
//! the requested fidelity exceeds what a single generation round produces.

use crate::kernel::event::SimTime;
use crate::resource::rule_manager::{Rule, RuleAction};
use crate::resource::MemoryState;

#[derive(Debug, Clone)]
pub enum ReservationMessage {
    Request {
        receiver: String,
        reservation: Reservation,
        qcaps: Vec<QCap>,
    },
    Reject {
        receiver: String,
        reservation: Reservation,
    },
    Approve {
        receiver: String,
        reservation: Reservation,
        qcaps: Vec<QCap>,
    },
}

impl ReservationMessage {
    pub fn receiver(&self) -> &str {
        match self {
            ReservationMessage::Request { receiver, .. } => receiver,
            ReservationMessage::Reject { receiver, .. } => receiver,
            ReservationMessage::Approve { receiver, .. } => receiver,
        }
    }
}

/// Per-hop spare capacity reported during the forward admission pass.
#[derive(Debug, Clone)]
pub struct QCap {
    pub node: String,
    pub available_memories: usize,
}

#[derive(Debug, Clone)]
pub struct Reservation {
    pub id: String,
    pub initiator: String,
    pub responder: String,
    pub start_time: SimTime,
    pub end_time: SimTime,
    pub memory_size: usize,
    pub fidelity: f64,
    /// Not part of equality: two reservations with the same parameters but
    /// different computed paths are still "the same request" for admission
    /// purposes, matching `Reservation.__eq__` in the original.
    pub path: Vec<String>,
}

impl PartialEq for Reservation {
    fn eq(&self, other: &Self) -> bool {
        self.initiator == other.initiator
            && self.responder == other.responder
            && self.start_time == other.start_time
            && self.end_time == other.end_time
            && self.memory_size == other.memory_size
            && (self.fidelity - other.fidelity).abs() < 1e-12
    }
}

impl Reservation {
    pub fn new(
        id: impl Into<String>,
        initiator: impl Into<String>,
        responder: impl Into<String>,
        start_time: SimTime,
        end_time: SimTime,
        memory_size: usize,
        fidelity: f64,
    ) -> Self {
        Self {
            id: id.into(),
            initiator: initiator.into(),
            responder: responder.into(),
            start_time,
            end_time,
            memory_size,
            fidelity,
            path: Vec::new(),
        }
    }
}

/// One booked, non-overlapping `[start, end)` interval on a single memory.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BookedInterval {
    start: SimTime,
    end: SimTime,
}

/// Per-memory reservation calendar. Intervals are kept sorted by start time
/// and are never allowed to overlap; `schedule_reservation` is the binary
/// search used to find where a new interval would land and whether it
/// collides with a neighbor, following `MemoryTimeCard.schedule_reservation`
/// literally: reject only on strict overlap, otherwise return the index a
/// new interval would be inserted at.
#[derive(Debug, Clone, Default)]
pub struct MemoryTimeCard {
    pub memory_index: usize,
    intervals: Vec<BookedInterval>,
}

impl MemoryTimeCard {
    pub fn new(memory_index: usize) -> Self {
        Self {
            memory_index,
            intervals: Vec::new(),
        }
    }

    /// Returns `Some(insertion_index)` if `[start, end)` does not overlap
    /// any booked interval, `None` if it does.
    pub fn schedule_reservation(&self, start: SimTime, end: SimTime) -> Option<usize> {
        let pos = self.intervals.partition_point(|iv| iv.end <= start);
        if pos < self.intervals.len() && self.intervals[pos].start < end {
            return None;
        }
        if pos > 0 && self.intervals[pos - 1].end > start {
            return None;
        }
        Some(pos)
    }

    pub fn add(&mut self, start: SimTime, end: SimTime) -> bool {
        match self.schedule_reservation(start, end) {
            Some(pos) => {
                self.intervals.insert(pos, BookedInterval { start, end });
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, start: SimTime, end: SimTime) -> bool {
        if let Some(idx) = self
            .intervals
            .iter()
            .position(|iv| iv.start == start && iv.end == end)
        {
            self.intervals.remove(idx);
            true
        } else {
            false
        }
    }
}

/// Returns interior path indices (excluding the two endpoints at `0` and
/// `path_len - 1`) in binary-subdivision swap order: the midpoint of the
/// remaining span swaps first, then the two halves are recursed into. This
/// is what lets a long chain collapse from the center outward instead of
/// strictly end-to-end, following the interior relay ordering used when
/// `reservation.py` builds `ES` rules hop by hop.
pub fn swap_order(path_len: usize) -> Vec<usize> {
    if path_len < 3 {
        return Vec::new();
    }
    let mut order = Vec::new();
    let mut stack = vec![(1usize, path_len - 2)];
    while let Some((lo, hi)) = stack.pop() {
        if lo > hi {
            continue;
        }
        let mid = lo + (hi - lo) / 2;
        order.push(mid);
        if mid > lo {
            stack.push((lo, mid - 1));
        }
        if mid < hi {
            stack.push((mid + 1, hi));
        }
    }
    order
}

/// Highest precedence: claims a raw memory for a fresh generation attempt
/// before anything downstream (swapping, purification) gets a look at it.
const EG_PRIORITY: i64 = 10;
/// Claims an entangled memory for a pending swap or BSM before purification
/// can grab it out from under the swap.
const ES_PRIORITY: i64 = 20;
/// Lowest of the three reservation-backed tiers: only matches a memory that
/// swapping has already passed on (still `Entangled`, below target fidelity).
const EP_PRIORITY: i64 = 30;

/// Builds the endpoint generation rule for `reservation` at the initiator
/// or responder end of `path`.
pub fn eg_rule_endpoint(reservation: &Reservation, mid: &str, peer_node: &str) -> Rule {
    let rid = reservation.id.clone();
    let mid = mid.to_string();
    let peer_node = peer_node.to_string();
    Rule::new(
        format!("eg::{}", reservation.id),
        EG_PRIORITY,
        Some(rid),
        |info| info.state == MemoryState::Raw,
        move |_info| RuleAction::InstallGenerationA {
            mid: mid.clone(),
            peer_node: peer_node.clone(),
        },
    )
}

pub fn eg_rule_responder(reservation: &Reservation, peer_node: &str) -> Rule {
    let rid = reservation.id.clone();
    let peer_node = peer_node.to_string();
    Rule::new(
        format!("eg-b::{}", reservation.id),
        EG_PRIORITY,
        Some(rid),
        |info| info.state == MemoryState::Raw,
        move |_info| RuleAction::InstallGenerationB {
            peer_node: peer_node.clone(),
        },
    )
}

/// Interior swapping rule: this node performs the BSM joining its two
/// halves of the A-B and B-C pairs. The condition matches on either half so
/// re-evaluation fires no matter which of the two local pairs completes
/// entanglement generation first; `Node::attempt_swap` itself checks that
/// both are ready before doing anything.
pub fn es_rule_interior(
    reservation: &Reservation,
    left_memory: usize,
    right_memory: usize,
    left_node: &str,
    right_node: &str,
    success_probability: f64,
    degradation: f64,
) -> Rule {
    let rid = reservation.id.clone();
    let left_node = left_node.to_string();
    let right_node = right_node.to_string();
    Rule::new(
        format!("es-a::{}::{}", reservation.id, left_memory),
        ES_PRIORITY,
        Some(rid),
        move |info| info.state == MemoryState::Entangled && (info.memory_index == left_memory || info.memory_index == right_memory),
        move |_info| RuleAction::InstallSwappingA {
            left_memory,
            right_memory,
            left_node: left_node.clone(),
            right_node: right_node.clone(),
            success_probability,
            degradation,
        },
    )
}

/// Endpoint-side counterpart: claims a freshly entangled memory as pending a
/// swap result so purification can't race it while the interior hop is
/// still working on the BSM.
pub fn es_rule_endpoint(reservation: &Reservation, peer_node: &str) -> Rule {
    let rid = reservation.id.clone();
    let peer_node = peer_node.to_string();
    Rule::new(
        format!("es-b::{}", reservation.id),
        ES_PRIORITY,
        Some(rid),
        |info| info.state == MemoryState::Entangled,
        move |_info| RuleAction::InstallSwappingB {
            peer_node: peer_node.clone(),
        },
    )
}

/// Primary-side purification rule: fires whenever one of this node's
/// memories is entangled with `peer_node` below the reservation's target
/// fidelity, nominating it as the pair to keep. The sacrifice pair isn't
/// known at install time -- `Node::start_purification` resolves it
/// dynamically by scanning for a sibling memory already entangled with the
/// same peer.
pub fn ep_rule_paired(reservation: &Reservation, peer_node: &str) -> Rule {
    let rid = reservation.id.clone();
    let peer_node = peer_node.to_string();
    let target_fidelity = reservation.fidelity;
    Rule::new(
        format!("ep-a::{}", reservation.id),
        EP_PRIORITY,
        Some(rid),
        move |info| info.state == MemoryState::Entangled && info.fidelity < target_fidelity,
        move |info| RuleAction::InstallPurificationA {
            kept_memory: info.memory_index,
            sacrifice_memory: usize::MAX,
            peer_node: peer_node.clone(),
        },
    )
}

/// Non-primary counterpart: never initiates, just claims a below-target
/// memory so it doesn't get swept into anything else while it waits for the
/// primary's `PurificationResult`.
pub fn ep_rule_responder(reservation: &Reservation, peer_node: &str) -> Rule {
    let rid = reservation.id.clone();
    let peer_node = peer_node.to_string();
    let target_fidelity = reservation.fidelity;
    Rule::new(
        format!("ep-b::{}", reservation.id),
        EP_PRIORITY,
        Some(rid),
        move |info| info.state == MemoryState::Entangled && info.fidelity < target_fidelity,
        move |_info| RuleAction::InstallPurificationB {
            peer_node: peer_node.clone(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_card_accepts_non_overlapping_intervals() {
        let mut card = MemoryTimeCard::new(0);
        assert!(card.add(0, 10));
        assert!(card.add(10, 20));
        assert!(card.add(30, 40));
    }

    #[test]
    fn time_card_rejects_overlap() {
        let mut card = MemoryTimeCard::new(0);
        assert!(card.add(0, 10));
        assert!(!card.add(5, 15));
        assert!(!card.add(9, 10));
    }

    #[test]
    fn swap_order_visits_all_interior_indices_exactly_once() {
        let order = swap_order(7);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn swap_order_starts_from_midpoint() {
        let order = swap_order(5);
        assert_eq!(order[0], 2);
    }

    #[test]
    fn two_hop_path_has_no_interior_swaps() {
        assert!(swap_order(2).is_empty());
    }

    #[test]
    fn reservation_equality_ignores_path() {
        let mut a = Reservation::new("r1", "a", "c", 0, 100, 1, 0.8);
        let mut b = Reservation::new("r1", "a", "c", 0, 100, 1, 0.8);
        a.path = vec!["a".into(), "b".into(), "c".into()];
        b.path = vec!["a".into(), "x".into(), "c".into()];
        assert_eq!(a, b);
    }
}
