//! Central per-node resource manager.
//!
//! Owns the [`MemoryInfo`] table and the [`RuleManager`]; `update` is the
//! single re-evaluation entry point called whenever a memory's state
//! changes (entanglement succeeded, protocol released it, a new rule was
//! installed). It walks the rule list in priority order and, for the
//! first rule whose condition matches the memory, returns the rule's
//! action for the owning `Node` to instantiate.
//!
//! `ResourceManagerMessage::Request`/`Response` carry the
//! `resource_manager.py` REQUEST/RESPONSE pairing taxonomy over the wire
//! (used for the `ReleaseProtocol`/`ReleaseMemory` teardown notifications in
//! `Node::receive_resource_manager_message`); the pairing *decision* itself
//! -- matching an outbound request to a waiting protocol instance on the
//! remote side -- is `waiting_protocols`/[`Selector`] below, a closed
//! enum standing in for `resource_manager.py`'s `selector_fn`/
//! `selector_args` pair. `Node`'s generation handshake resolves its
//! responder instance through [`eg_peer_by_name`]; [`ep_peer_by_memory_pair`]
//! and [`es_peer_by_memory_name`] exist for the same purpose on the
//! purification and swapping paths.

use tracing::{debug, info};

use crate::resource::memory_manager::{MemoryInfo, MemoryState};
use crate::resource::rule_manager::{Rule, RuleAction, RuleManager};

#[derive(Debug, Clone)]
pub enum ResourceManagerMessage {
    Request {
        receiver: String,
        protocol_name: String,
        protocol_family: String,
        memory_indices: Vec<usize>,
    },
    Response {
        receiver: String,
        protocol_name: String,
        is_approved: bool,
        paired_memory_indices: Vec<usize>,
    },
    ReleaseProtocol {
        receiver: String,
        protocol_name: String,
    },
    ReleaseMemory {
        receiver: String,
        memory_index: usize,
    },
}

impl ResourceManagerMessage {
    pub fn receiver(&self) -> &str {
        match self {
            ResourceManagerMessage::Request { receiver, .. } => receiver,
            ResourceManagerMessage::Response { receiver, .. } => receiver,
            ResourceManagerMessage::ReleaseProtocol { receiver, .. } => receiver,
            ResourceManagerMessage::ReleaseMemory { receiver, .. } => receiver,
        }
    }
}

/// A selector identifies which waiting protocol instance an incoming
/// pairing request should bind to -- a closed enum standing in for
/// `resource_manager.py`'s arbitrary `selector_fn`/`selector_args` callable,
/// matching this codebase's rule against dynamic dispatch keyed by runtime
/// type.
#[derive(Debug, Clone)]
pub enum Selector {
    /// Matches a waiting protocol enrolled by a specific peer node --
    /// generation's pairing key, since the two sides only share a node name
    /// up front, not a protocol instance name.
    ByPeerName { peer: String },
    /// Matches a waiting protocol holding a specific local `(kept,
    /// sacrifice)` memory pair -- purification's pairing key.
    ByMemoryPair { kept: usize, sacrifice: usize },
    /// Matches a waiting protocol attached to one specific local memory --
    /// swapping's pairing key.
    ByMemoryName { memory_index: usize },
}

impl Selector {
    fn matches(&self, entry: &WaitingProtocol) -> bool {
        match self {
            Selector::ByPeerName { peer } => entry.peer_node.as_deref() == Some(peer.as_str()),
            Selector::ByMemoryPair { kept, sacrifice } => {
                entry.memory_indices.contains(kept) && entry.memory_indices.contains(sacrifice)
            }
            Selector::ByMemoryName { memory_index } => entry.memory_indices.contains(memory_index),
        }
    }
}

pub fn eg_peer_by_name(peer: impl Into<String>) -> Selector {
    Selector::ByPeerName { peer: peer.into() }
}

pub fn ep_peer_by_memory_pair(kept: usize, sacrifice: usize) -> Selector {
    Selector::ByMemoryPair { kept, sacrifice }
}

pub fn es_peer_by_memory_name(memory_index: usize) -> Selector {
    Selector::ByMemoryName { memory_index }
}

/// A protocol instance enrolled as waiting for an incoming pairing request,
/// removed the moment a [`Selector`] matches it.
#[derive(Debug, Clone)]
pub struct WaitingProtocol {
    pub protocol_name: String,
    pub memory_indices: Vec<usize>,
    pub peer_node: Option<String>,
}

#[derive(Debug, Default)]
pub struct ResourceManager {
    pub node_name: String,
    memories: Vec<MemoryInfo>,
    rules: RuleManager,
    waiting_protocols: Vec<WaitingProtocol>,
}

impl ResourceManager {
    pub fn new(node_name: impl Into<String>, memory_count: usize) -> Self {
        Self {
            node_name: node_name.into(),
            memories: (0..memory_count).map(MemoryInfo::new).collect(),
            rules: RuleManager::new(),
            waiting_protocols: Vec::new(),
        }
    }

    pub fn memory_info(&self, index: usize) -> &MemoryInfo {
        &self.memories[index]
    }

    pub fn memory_info_mut(&mut self, index: usize) -> &mut MemoryInfo {
        &mut self.memories[index]
    }

    pub fn memory_count(&self) -> usize {
        self.memories.len()
    }

    pub fn load_rule(&mut self, rule: Rule) {
        info!(node = %self.node_name, rule = %rule.name, priority = rule.priority, "installing rule");
        self.rules.load(rule);
    }

    pub fn is_empty_of_rules(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn expire_reservation(&mut self, reservation_id: &str) {
        let expired = self.rules.expire_reservation(reservation_id);
        for rule in expired {
            debug!(node = %self.node_name, rule = %rule.name, "expired rule for ended reservation");
        }
    }

    /// Re-evaluates rules against `memory_index` in priority order; returns
    /// the action of the first matching rule, if any. Each rule's own
    /// condition encodes which memory state it cares about (`Raw` for
    /// generation, `Entangled` for swapping/purification) -- `update`
    /// itself no longer gates on state, since a blanket `Raw`-only gate
    /// would make every post-entanglement rule structurally unreachable.
    pub fn update(&mut self, memory_index: usize) -> Option<RuleAction> {
        let info = &self.memories[memory_index];
        for rule in self.rules.rules_in_priority_order() {
            if rule.is_valid(info) {
                let action = rule.do_action(info);
                debug!(node = %self.node_name, rule = %rule.name, memory = memory_index, "rule matched");
                return Some(action);
            }
        }
        None
    }

    /// Enrolls a protocol instance as waiting for an incoming pairing
    /// request.
    pub fn enroll_waiting(&mut self, entry: WaitingProtocol) {
        self.waiting_protocols.push(entry);
    }

    /// Looks up a waiting protocol matching `selector`, removing it on
    /// match -- a pairing request can only ever bind once.
    pub fn match_waiting(&mut self, selector: &Selector) -> Option<WaitingProtocol> {
        let idx = self.waiting_protocols.iter().position(|w| selector.matches(w))?;
        Some(self.waiting_protocols.remove(idx))
    }

    pub fn release_memory(&mut self, memory_index: usize) {
        self.memories[memory_index].to_raw();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_respects_rule_condition_over_memory_state() {
        let mut rm = ResourceManager::new("node1", 2);
        rm.memory_info_mut(0).to_occupied("p1");
        rm.load_rule(Rule::new(
            "raw-only",
            1,
            None,
            |info| info.state == MemoryState::Raw,
            |_| RuleAction::InstallGenerationB { peer_node: "x".into() },
        ));
        assert!(rm.update(0).is_none());
        assert!(rm.update(1).is_some());
    }

    #[test]
    fn update_returns_lowest_priority_value_match() {
        let mut rm = ResourceManager::new("node1", 1);
        rm.load_rule(Rule::new(
            "low",
            1,
            None,
            |_| true,
            |_| RuleAction::InstallGenerationB { peer_node: "low".into() },
        ));
        rm.load_rule(Rule::new(
            "high",
            10,
            None,
            |_| true,
            |_| RuleAction::InstallGenerationB { peer_node: "high".into() },
        ));
        match rm.update(0) {
            Some(RuleAction::InstallGenerationB { peer_node }) => assert_eq!(peer_node, "low"),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn match_waiting_removes_on_hit_and_leaves_misses() {
        let mut rm = ResourceManager::new("node1", 1);
        rm.enroll_waiting(WaitingProtocol {
            protocol_name: "eg::b::0".into(),
            memory_indices: vec![0],
            peer_node: Some("a".into()),
        });
        assert!(rm.match_waiting(&eg_peer_by_name("z")).is_none());
        let found = rm.match_waiting(&eg_peer_by_name("a"));
        assert_eq!(found.unwrap().protocol_name, "eg::b::0");
        assert!(rm.match_waiting(&eg_peer_by_name("a")).is_none());
    }

    #[test]
    fn memory_pair_selector_requires_both_indices() {
        let entry = WaitingProtocol {
            protocol_name: "ep::a::0".into(),
            memory_indices: vec![0, 1],
            peer_node: Some("b".into()),
        };
        assert!(ep_peer_by_memory_pair(0, 1).matches(&entry));
        assert!(!ep_peer_by_memory_pair(0, 2).matches(&entry));
    }

    #[test]
    fn memory_name_selector_matches_single_index() {
        let entry = WaitingProtocol {
            protocol_name: "es-b::c::2".into(),
            memory_indices: vec![2],
            peer_node: None,
        };
        assert!(es_peer_by_memory_name(2).matches(&entry));
        assert!(!es_peer_by_memory_name(3).matches(&entry));
    }
}
