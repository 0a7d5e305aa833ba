//! End-to-end scenarios, following the naming of the testable-property
//! scenarios this crate implements (two-node generation success,
//! reservation rejection, double-booking rejection, determinism,
//! three-hop swapping, purification).

use entangle_core::channel::{ClassicalChannel, QuantumChannel};
use entangle_core::node::{Node, NodeKind, ReservationResult};
use entangle_core::network::ReservationRequest;
use entangle_core::resource::MemoryState;
use entangle_core::{EntityEvent, Process, Timeline};

fn wire_two_nodes(name_a: &str, name_b: &str, memories_a: usize, memories_b: usize) -> (Node, Node) {
    let mut a = Node::new(name_a, NodeKind::Router).with_memories(memories_a, 1.0, 1_000_000_000);
    let mut b = Node::new(name_b, NodeKind::Router).with_memories(memories_b, 1.0, 1_000_000_000);

    let cc_name = format!("cc-{name_a}-{name_b}");
    let qc_name = format!("qc-{name_a}-{name_b}");
    a.add_classical_channel(ClassicalChannel::new(&cc_name, name_a, name_b, 0.0));
    b.add_classical_channel(ClassicalChannel::new(&cc_name, name_a, name_b, 0.0));
    a.add_quantum_channel(QuantumChannel::new(&qc_name, name_a, name_b, 0.0, 0.0));
    b.add_quantum_channel(QuantumChannel::new(&qc_name, name_a, name_b, 0.0, 0.0));
    (a, b)
}

/// A three-node chain `a - r - b`, with `r` the lone interior relay.
/// `add_classical_channel`/`add_quantum_channel` only auto-populate routes
/// for direct neighbors, so the non-adjacent endpoint-to-endpoint routes
/// have to be added by hand here.
fn wire_chain(
    name_a: &str,
    name_r: &str,
    name_b: &str,
    memories_a: usize,
    memories_r: usize,
    memories_b: usize,
) -> (Node, Node, Node) {
    let mut a = Node::new(name_a, NodeKind::Router).with_memories(memories_a, 1.0, 1_000_000_000);
    let mut r = Node::new(name_r, NodeKind::Router).with_memories(memories_r, 1.0, 1_000_000_000);
    let mut b = Node::new(name_b, NodeKind::Router).with_memories(memories_b, 1.0, 1_000_000_000);

    let cc_ar = format!("cc-{name_a}-{name_r}");
    let qc_ar = format!("qc-{name_a}-{name_r}");
    a.add_classical_channel(ClassicalChannel::new(&cc_ar, name_a, name_r, 0.0));
    r.add_classical_channel(ClassicalChannel::new(&cc_ar, name_a, name_r, 0.0));
    a.add_quantum_channel(QuantumChannel::new(&qc_ar, name_a, name_r, 0.0, 0.0));
    r.add_quantum_channel(QuantumChannel::new(&qc_ar, name_a, name_r, 0.0, 0.0));

    let cc_rb = format!("cc-{name_r}-{name_b}");
    let qc_rb = format!("qc-{name_r}-{name_b}");
    r.add_classical_channel(ClassicalChannel::new(&cc_rb, name_r, name_b, 0.0));
    b.add_classical_channel(ClassicalChannel::new(&cc_rb, name_r, name_b, 0.0));
    r.add_quantum_channel(QuantumChannel::new(&qc_rb, name_r, name_b, 0.0, 0.0));
    b.add_quantum_channel(QuantumChannel::new(&qc_rb, name_r, name_b, 0.0, 0.0));

    a.network_manager.routing.add_route(name_b, name_r);
    b.network_manager.routing.add_route(name_a, name_r);

    (a, r, b)
}

// `reserve_net_resource` needs a live `&mut Timeline` to schedule the first
// REQUEST hop, which is also the timeline the node itself is registered
// in. Every test below borrows the node out of the registry, calls it
// against the timeline, then puts it back -- the same entity-swap the
// kernel performs internally on every dispatched event.

#[test]
fn s1_two_node_reservation_runs_to_approval() {
    let (a, b) = wire_two_nodes("a", "b", 1, 1);
    let mut tl = Timeline::new(1_000_000_000_000, 7);
    tl.register_node(a).unwrap();
    tl.register_node(b).unwrap();

    {
        let node_a = tl.node_mut("a").unwrap();
        let mut node_a_owned = std::mem::replace(node_a, Node::new("a", NodeKind::Router));
        node_a_owned
            .reserve_net_resource(
                ReservationRequest {
                    responder: "b".to_string(),
                    start_time: 100,
                    end_time: 200,
                    memory_size: 1,
                    fidelity: 1.0,
                },
                &mut tl,
            )
            .unwrap();
        *tl.node_mut("a").unwrap() = node_a_owned;
    }

    tl.run().unwrap();

    let node_b = tl.node("b").unwrap();
    assert!(matches!(node_b.reservation_log().first(), Some(ReservationResult::Approved(_))));

    let node_a = tl.node("a").unwrap();
    assert!(matches!(node_a.reservation_log().first(), Some(ReservationResult::Approved(_))));

    let mem_a = node_a.resource_manager.memory_info(0);
    assert_eq!(mem_a.state, MemoryState::Entangled);
    assert_eq!(mem_a.remote_node.as_deref(), Some("b"));
    assert!(mem_a.fidelity > 0.0);

    let mem_b = node_b.resource_manager.memory_info(0);
    assert_eq!(mem_b.state, MemoryState::Entangled);
    assert_eq!(mem_b.remote_node.as_deref(), Some("a"));
    assert!(mem_b.fidelity > 0.0);
}

#[test]
fn s2_reservation_rejected_without_enough_memory() {
    let (a, b) = wire_two_nodes("a", "b", 1, 0);
    let mut tl = Timeline::new(1_000_000_000_000, 3);
    tl.register_node(a).unwrap();
    tl.register_node(b).unwrap();

    {
        let node_a = tl.node_mut("a").unwrap();
        let mut node_a_owned = std::mem::replace(node_a, Node::new("a", NodeKind::Router));
        node_a_owned
            .reserve_net_resource(
                ReservationRequest {
                    responder: "b".to_string(),
                    start_time: 100,
                    end_time: 200,
                    memory_size: 1,
                    fidelity: 1.0,
                },
                &mut tl,
            )
            .unwrap();
        *tl.node_mut("a").unwrap() = node_a_owned;
    }

    tl.run().unwrap();

    let node_b = tl.node("b").unwrap();
    assert!(matches!(node_b.reservation_log().first(), Some(ReservationResult::Rejected(_))));
}

#[test]
fn determinism_same_seed_same_event_count() {
    let run = || {
        let (a, b) = wire_two_nodes("a", "b", 1, 1);
        let mut tl = Timeline::new(1_000_000_000_000, 99);
        tl.register_node(a).unwrap();
        tl.register_node(b).unwrap();
        let node_a = tl.node_mut("a").unwrap();
        let mut node_a_owned = std::mem::replace(node_a, Node::new("a", NodeKind::Router));
        node_a_owned
            .reserve_net_resource(
                ReservationRequest {
                    responder: "b".to_string(),
                    start_time: 100,
                    end_time: 200,
                    memory_size: 1,
                    fidelity: 1.0,
                },
                &mut tl,
            )
            .unwrap();
        *tl.node_mut("a").unwrap() = node_a_owned;
        tl.run().unwrap()
    };

    assert_eq!(run(), run());
}

#[test]
fn s3_three_hop_path_swaps_into_end_to_end_entanglement() {
    let (a, r, b) = wire_chain("a", "r", "b", 1, 2, 1);
    let mut tl = Timeline::new(1_000_000_000_000, 11);
    tl.register_node(a).unwrap();
    tl.register_node(r).unwrap();
    tl.register_node(b).unwrap();

    {
        let node_a = tl.node_mut("a").unwrap();
        let mut node_a_owned = std::mem::replace(node_a, Node::new("a", NodeKind::Router));
        node_a_owned
            .reserve_net_resource(
                ReservationRequest {
                    responder: "b".to_string(),
                    start_time: 100,
                    end_time: 200,
                    memory_size: 1,
                    // Below the fidelity a single swapped pair already
                    // achieves, so no purification rule fires and the
                    // swapping path alone is what's under test here.
                    fidelity: 0.05,
                },
                &mut tl,
            )
            .unwrap();
        *tl.node_mut("a").unwrap() = node_a_owned;
    }

    tl.run().unwrap();

    let node_a = tl.node("a").unwrap();
    let node_b = tl.node("b").unwrap();
    assert!(matches!(node_a.reservation_log().first(), Some(ReservationResult::Approved(_))));
    assert!(matches!(node_b.reservation_log().first(), Some(ReservationResult::Approved(_))));

    let mem_a = node_a.resource_manager.memory_info(0);
    assert_eq!(mem_a.state, MemoryState::Entangled);
    assert_eq!(mem_a.remote_node.as_deref(), Some("b"));
    assert!(mem_a.fidelity > 0.0);

    let mem_b = node_b.resource_manager.memory_info(0);
    assert_eq!(mem_b.state, MemoryState::Entangled);
    assert_eq!(mem_b.remote_node.as_deref(), Some("a"));
    assert!(mem_b.fidelity > 0.0);
}

#[test]
fn s4_concurrent_reservation_rejected_while_memory_is_occupied() {
    let (a, b) = wire_two_nodes("a", "b", 1, 1);
    let mut tl = Timeline::new(1_000_000_000_000, 5);
    tl.register_node(a).unwrap();
    tl.register_node(b).unwrap();

    {
        let node_a = tl.node_mut("a").unwrap();
        let mut node_a_owned = std::mem::replace(node_a, Node::new("a", NodeKind::Router));
        // Both requests are queued against the same `now` before the
        // timeline runs; the first claims b's only memory while being
        // processed, so the second sees zero raw memories left.
        node_a_owned
            .reserve_net_resource(
                ReservationRequest {
                    responder: "b".to_string(),
                    start_time: 100,
                    end_time: 200,
                    memory_size: 1,
                    fidelity: 1.0,
                },
                &mut tl,
            )
            .unwrap();
        node_a_owned
            .reserve_net_resource(
                ReservationRequest {
                    responder: "b".to_string(),
                    start_time: 300,
                    end_time: 400,
                    memory_size: 1,
                    fidelity: 1.0,
                },
                &mut tl,
            )
            .unwrap();
        *tl.node_mut("a").unwrap() = node_a_owned;
    }

    tl.run().unwrap();

    let node_b = tl.node("b").unwrap();
    assert_eq!(node_b.reservation_log().len(), 2);
    assert!(matches!(node_b.reservation_log()[0], ReservationResult::Approved(_)));
    assert!(matches!(node_b.reservation_log()[1], ReservationResult::Rejected(_)));
}

#[test]
fn s5_reservation_window_expiry_tears_down_rules_without_releasing_entanglement() {
    let (a, b) = wire_two_nodes("a", "b", 1, 1);
    let mut tl = Timeline::new(1_000_000_000_000, 13);
    tl.register_node(a).unwrap();
    tl.register_node(b).unwrap();

    let reservation_id = {
        let node_a = tl.node_mut("a").unwrap();
        let mut node_a_owned = std::mem::replace(node_a, Node::new("a", NodeKind::Router));
        let id = node_a_owned
            .reserve_net_resource(
                ReservationRequest {
                    responder: "b".to_string(),
                    start_time: 100,
                    end_time: 200,
                    memory_size: 1,
                    fidelity: 1.0,
                },
                &mut tl,
            )
            .unwrap();
        *tl.node_mut("a").unwrap() = node_a_owned;
        id
    };

    tl.run().unwrap();

    {
        let node_a = tl.node("a").unwrap();
        assert!(!node_a.resource_manager.is_empty_of_rules());
        assert_eq!(node_a.resource_manager.memory_info(0).state, MemoryState::Entangled);
    }

    // Nothing in the scheduler auto-fires a reservation's window expiry;
    // exercising the cleanup path means injecting it directly, the way an
    // external window-timer would.
    tl.schedule(
        tl.now() + 1,
        Process::new(
            "a",
            EntityEvent::ReservationWindow {
                reservation_id,
                is_start: false,
            },
        ),
    )
    .unwrap();
    tl.run().unwrap();

    let node_a = tl.node("a").unwrap();
    assert!(node_a.resource_manager.is_empty_of_rules());
    // Expiry tears down the reservation's rules, not the entanglement that
    // already formed under them.
    assert_eq!(node_a.resource_manager.memory_info(0).state, MemoryState::Entangled);
}

#[test]
fn s6_purification_raises_fidelity_above_single_round_generation() {
    let (a, b) = wire_two_nodes("a", "b", 2, 2);
    let mut tl = Timeline::new(1_000_000_000_000, 21);
    tl.register_node(a).unwrap();
    tl.register_node(b).unwrap();

    {
        let node_a = tl.node_mut("a").unwrap();
        let mut node_a_owned = std::mem::replace(node_a, Node::new("a", NodeKind::Router));
        node_a_owned
            .reserve_net_resource(
                ReservationRequest {
                    responder: "b".to_string(),
                    start_time: 100,
                    end_time: 200,
                    memory_size: 2,
                    // Above a single generation round's fidelity (0.93
                    // by default), forcing the purification rules to fire.
                    fidelity: 0.95,
                },
                &mut tl,
            )
            .unwrap();
        *tl.node_mut("a").unwrap() = node_a_owned;
    }

    tl.run().unwrap();

    let node_a = tl.node("a").unwrap();
    let node_b = tl.node("b").unwrap();

    let entangled_a: Vec<_> = (0..2)
        .map(|i| node_a.resource_manager.memory_info(i))
        .filter(|m| m.state == MemoryState::Entangled)
        .collect();
    let entangled_b: Vec<_> = (0..2)
        .map(|i| node_b.resource_manager.memory_info(i))
        .filter(|m| m.state == MemoryState::Entangled)
        .collect();

    // One memory survives as the kept pair, the other was consumed as the
    // sacrifice -- on both sides, since each independently tracks its half.
    assert_eq!(entangled_a.len(), 1);
    assert_eq!(entangled_b.len(), 1);
    assert!(entangled_a[0].fidelity > 0.93);
    assert!(entangled_b[0].fidelity > 0.93);
}
