//! Common contract for entanglement-management protocols.
//!
//! Mirrors `entanglement_management/entanglement_protocol.py`: every
//! protocol instance is attached to a set of local memories, is paired with
//! exactly one remote protocol instance (named, not a live reference, so it
//! survives the entity-swap dispatch), and can be asked whether it is ready
//! to start, have a memory expire out from under it, or be released back to
//! the resource manager.

#[derive(Debug, Clone, Default)]
pub struct RemotePeer {
    pub protocol: String,
    pub node: String,
    pub memories: Vec<String>,
}

pub trait EntanglementProtocol {
    fn name(&self) -> &str;
    fn set_others(&mut self, peer: RemotePeer);
    fn is_ready(&self) -> bool;
}

/// Outcome of a protocol completing, consumed by the owning node to update
/// the resource manager and, for success, chain into the next stage
/// (purification or swapping) via the rule engine's next re-evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolOutcome {
    Success { fidelity: f64 },
    Failure,
}
