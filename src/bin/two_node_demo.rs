//! Minimal two-node entanglement-generation demo.
//!
//! Wires two routers connected by a classical and a quantum channel,
//! installs the continuous (unreserved) generation rule on both sides, and
//! runs the timeline to completion. Illustrative wiring, not a CLI: no
//! argument parsing, just a fixed scenario that exercises the kernel and
//! resource-management plane end to end.

use anyhow::Result;
use entangle_core::channel::{ClassicalChannel, QuantumChannel};
use entangle_core::node::{Node, NodeKind};
use entangle_core::Timeline;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut tl = Timeline::new(10_000_000, 42);

    let mut alice = Node::new("alice", NodeKind::Router).with_memories(4, 0.93, 1_000_000_000);
    let mut bob = Node::new("bob", NodeKind::Router).with_memories(4, 0.93, 1_000_000_000);

    alice.add_classical_channel(ClassicalChannel::new("cc-alice-bob", "alice", "bob", 10_000.0));
    bob.add_classical_channel(ClassicalChannel::new("cc-alice-bob", "alice", "bob", 10_000.0));
    alice.add_quantum_channel(QuantumChannel::new("qc-alice-bob", "alice", "bob", 10_000.0, 0.2));
    bob.add_quantum_channel(QuantumChannel::new("qc-alice-bob", "alice", "bob", 10_000.0, 0.2));

    alice.install_continuous_generation("qc-alice-bob", "bob", "bob.mem[0]");
    bob.install_continuous_generation_responder("alice");

    tl.register_node(alice)?;
    tl.register_node(bob)?;

    let events_executed = tl.run()?;
    tracing::info!(events_executed, final_time = tl.now(), "demo run finished");
    Ok(())
}
