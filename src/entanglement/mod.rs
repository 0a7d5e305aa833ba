//! Entanglement management: generation, purification, and swapping
//! protocols, plus the shared protocol contract they implement.

pub mod generation;
pub mod protocol;
pub mod purification;
pub mod swapping;

pub use protocol::{EntanglementProtocol, ProtocolOutcome, RemotePeer};
