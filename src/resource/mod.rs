//! Resource-management plane: per-memory state tracking, the priority rule
//! engine, and the central resource manager that ties them together.

pub mod continuous_rule;
pub mod memory_manager;
pub mod resource_manager;
pub mod rule_manager;

pub use memory_manager::{MemoryInfo, MemoryState};
pub use resource_manager::{
    eg_peer_by_name, ep_peer_by_memory_pair, es_peer_by_memory_name, ResourceManager, ResourceManagerMessage,
    Selector, WaitingProtocol,
};
pub use rule_manager::{Rule, RuleAction, RuleManager};
