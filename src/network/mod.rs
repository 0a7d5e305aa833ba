//! Network-management plane: static routing and RSVP-style reservation.

pub mod network_manager;
pub mod reservation;
pub mod routing;

pub use network_manager::{NetworkManager, ReservationRequest};
pub use reservation::{MemoryTimeCard, QCap, Reservation, ReservationMessage};
pub use routing::StaticRoutingProtocol;
