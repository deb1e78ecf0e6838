//! Address registry.
//!
//! Tracks which owner holds each assigned address so the planner can
//! prove that no address lands on two interfaces.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use crate::error::CapacityError;

/// Registry of every address in a plan, keyed by address.
#[derive(Debug, Default)]
pub struct AddressRegistry {
    /// Address -> owner description, e.g. "R3 GigabitEthernet0/0"
    assigned: HashMap<Ipv4Addr, String>,
    /// Fast lookup for uniqueness checking
    used: HashSet<Ipv4Addr>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `address` for `owner`, failing if someone else already holds it.
    pub fn register(&mut self, address: Ipv4Addr, owner: &str) -> Result<(), CapacityError> {
        if !self.used.insert(address) {
            let first = self.assigned.get(&address).cloned().unwrap_or_default();
            return Err(CapacityError::DuplicateAddress {
                address,
                first,
                second: owner.to_string(),
            });
        }
        self.assigned.insert(address, owner.to_string());
        Ok(())
    }

    /// Owner of a given address
    pub fn owner_of(&self, address: Ipv4Addr) -> Option<&str> {
        self.assigned.get(&address).map(String::as_str)
    }

    pub fn count(&self) -> usize {
        self.used.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_unique_addresses() {
        let mut registry = AddressRegistry::new();
        registry.register(Ipv4Addr::new(10, 10, 0, 1), "R1 Gi0/0").unwrap();
        registry.register(Ipv4Addr::new(10, 10, 0, 2), "R2 Gi0/0").unwrap();
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.owner_of(Ipv4Addr::new(10, 10, 0, 1)), Some("R1 Gi0/0"));
        assert_eq!(registry.owner_of(Ipv4Addr::new(10, 10, 0, 2)), Some("R2 Gi0/0"));
    }

    #[test]
    fn test_duplicate_names_both_owners() {
        let mut registry = AddressRegistry::new();
        registry.register(Ipv4Addr::new(10, 10, 0, 1), "R1 Gi0/0").unwrap();
        match registry.register(Ipv4Addr::new(10, 10, 0, 1), "CA-ROOT Gi0/0") {
            Err(CapacityError::DuplicateAddress { first, second, .. }) => {
                assert_eq!(first, "R1 Gi0/0");
                assert_eq!(second, "CA-ROOT Gi0/0");
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
    }
}
