//! Wire message taxonomy.
//!
//! Every classical message exchanged between nodes is one tagged variant
//! here, one per protocol family (EG, EP, ES, RSVP, RM), matching the design
//! note that dynamic dispatch on message type should be a single exhaustive
//! match rather than runtime type probing. Each inner message carries the
//! name of the protocol instance on the destination node that should
//! receive it, mirroring the Python `Message.receiver` attribute used by
//! `Node.receive_message` to route into the right protocol object.

use crate::entanglement::generation::GenerationMessage;
use crate::entanglement::purification::PurificationMessage;
use crate::entanglement::swapping::SwappingMessage;
use crate::network::reservation::ReservationMessage;
use crate::resource::resource_manager::ResourceManagerMessage;

#[derive(Debug, Clone)]
pub enum Message {
    Generation(GenerationMessage),
    Purification(PurificationMessage),
    Swapping(SwappingMessage),
    Reservation(ReservationMessage),
    ResourceManager(ResourceManagerMessage),
}

impl Message {
    /// Name of the protocol instance on the receiving node that this
    /// message is addressed to.
    pub fn receiver(&self) -> &str {
        match self {
            Message::Generation(m) => m.receiver(),
            Message::Purification(m) => m.receiver(),
            Message::Swapping(m) => m.receiver(),
            Message::Reservation(m) => m.receiver(),
            Message::ResourceManager(m) => m.receiver(),
        }
    }
}
