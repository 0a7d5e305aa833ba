//! Network-management plane entry point.
//!
//! Stacks the reservation protocol on top of static routing, the way
//! `network_management/network_manager.py::NetworkManager` wires
//! `ResourceReservationProtocol` above `StaticRoutingProtocol` in a
//! two-layer push/pop stack. The app-facing surface is a single `request`
//! call; everything below (path computation, admission, rule installation)
//! is internal to the reservation protocol.

use crate::kernel::event::SimTime;
use crate::network::reservation::Reservation;
use crate::network::routing::StaticRoutingProtocol;

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub responder: String,
    pub start_time: SimTime,
    pub end_time: SimTime,
    pub memory_size: usize,
    pub fidelity: f64,
}

#[derive(Default)]
pub struct NetworkManager {
    pub routing: StaticRoutingProtocol,
    next_reservation_seq: u64,
}

impl NetworkManager {
    pub fn new() -> Self {
        Self {
            routing: StaticRoutingProtocol::new(),
            next_reservation_seq: 0,
        }
    }

    /// Builds a fresh `Reservation` for an app-level request, assigning it
    /// a locally-unique id. Admission and rule installation are driven by
    /// the owning node's reservation-protocol state, not here -- this is
    /// purely the app-facing constructor, matching
    /// `NetworkManager.request`'s role of building the `Reservation` object
    /// before handing it to the reservation protocol's `push`.
    pub fn build_reservation(&mut self, node_name: &str, req: ReservationRequest) -> Reservation {
        let id = format!("{node_name}-rsv-{}", self.next_reservation_seq);
        self.next_reservation_seq += 1;
        Reservation::new(
            id,
            node_name,
            req.responder,
            req.start_time,
            req.end_time,
            req.memory_size,
            req.fidelity,
        )
    }
}
