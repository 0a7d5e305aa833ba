//! Continuous (unreserved) entanglement generation.
//!
//! Outside of any admitted reservation, a node may still want idle memories
//! to opportunistically entangle with a fixed neighbor in the background.
//! `resource_management/continuous_rule.py` installs an always-on rule pair
//! for exactly this; it has no `Reservation` backing it, so its rules carry
//! no `reservation_id` and are never torn down by `expire_reservation`.
//! Off by default -- a node only gets this behavior if
//! `Node::install_continuous_generation` is called explicitly.

use crate::resource::memory_manager::MemoryState;
use crate::resource::rule_manager::{Rule, RuleAction};

/// Ascending priority means smaller = higher precedence; this is the
/// largest value any rule can carry, so a reservation-backed rule (10/20/30)
/// always wins the memory first.
const CONTINUOUS_RULE_PRIORITY: i64 = i64::MAX - 1;

/// Builds the rule that, for any raw memory, starts an `EntanglementGenerationA`
/// towards `peer_node`/`peer_memory` over link `mid`. Lowest precedence so any
/// reservation-backed rule always wins the memory first.
pub fn continuous_generation_rule_a(name: &str, mid: &str, peer_node: &str) -> Rule {
    let mid = mid.to_string();
    let peer_node = peer_node.to_string();
    Rule::new(
        name,
        CONTINUOUS_RULE_PRIORITY,
        None,
        |info| info.state == MemoryState::Raw,
        move |_info| RuleAction::InstallGenerationA {
            mid: mid.clone(),
            peer_node: peer_node.clone(),
        },
    )
}

/// Responder-side counterpart installed on the neighbor: accepts an
/// incoming negotiate from `peer_node` and starts `EntanglementGenerationB`.
pub fn continuous_generation_rule_b(name: &str, peer_node: &str) -> Rule {
    let peer_node = peer_node.to_string();
    Rule::new(
        name,
        CONTINUOUS_RULE_PRIORITY,
        None,
        |info| info.state == MemoryState::Raw,
        move |_info| RuleAction::InstallGenerationB {
            peer_node: peer_node.clone(),
        },
    )
}
