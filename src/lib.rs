//! Discrete-event simulation kernel and entanglement-management control
//! plane for quantum networks.
//!
//! [`kernel`] is the reusable event-driven core (events, entities, deferred
//! calls, the timeline that drives them). Everything else is the control
//! plane built on top of it: hardware models ([`memory`], [`channel`]),
//! the resource-management plane ([`resource`]), the entanglement
//! protocols ([`entanglement`]), and the network-management plane
//! ([`network`]), wired together per node by [`node`].

pub mod channel;
pub mod config;
pub mod entanglement;
pub mod error;
pub mod kernel;
pub mod memory;
pub mod message;
pub mod network;
pub mod node;
pub mod resource;

pub use error::{SimError, SimResult};
pub use kernel::{Entity, EntityEvent, Event, EventHandle, Process, SimTime, Timeline};
pub use message::Message;
pub use node::{Node, NodeKind};
