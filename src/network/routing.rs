//! Static routing.
//!
//! A flat forwarding table, `destination -> next hop`, installed once at
//! topology-build time and consulted on every classical send. No dynamic
//! route discovery or link-state exchange -- grounded in
//! `network_management/routing.py::StaticRoutingProtocol`, which is
//! likewise a dictionary lookup with no protocol messages of its own.

use std::collections::HashMap;

use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, Default)]
pub struct StaticRoutingProtocol {
    forwarding_table: HashMap<String, String>,
}

impl StaticRoutingProtocol {
    pub fn new() -> Self {
        Self {
            forwarding_table: HashMap::new(),
        }
    }

    pub fn add_route(&mut self, destination: impl Into<String>, next_hop: impl Into<String>) {
        self.forwarding_table.insert(destination.into(), next_hop.into());
    }

    pub fn next_hop(&self, destination: &str) -> SimResult<&str> {
        self.forwarding_table
            .get(destination)
            .map(|s| s.as_str())
            .ok_or_else(|| SimError::NoRoute(destination.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_installed_route() {
        let mut routing = StaticRoutingProtocol::new();
        routing.add_route("c", "b");
        assert_eq!(routing.next_hop("c").unwrap(), "b");
    }

    #[test]
    fn unknown_destination_errors() {
        let routing = StaticRoutingProtocol::new();
        assert!(routing.next_hop("z").is_err());
    }
}
