//! Address Book
//!
//! Process-wide record of which guest addresses are reserved by which
//! instance. The inventory lists the assignable addresses; the address book
//! tracks usage across snapshots.

use super::snapshot::NetworkDescriptor;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Reservations per network: address -> instance id
#[derive(Debug, Default)]
pub struct AddressBook {
    reservations: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl AddressBook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reserve the first free address of a network for an instance
    ///
    /// Reserving again for the same instance returns the address it
    /// already holds.
    pub fn reserve(&self, network: &NetworkDescriptor, instance_id: &str) -> Result<String> {
        let mut reservations = self.reservations.lock();
        let taken = reservations.entry(network.id.clone()).or_default();

        if let Some((address, _)) = taken.iter().find(|(_, owner)| owner.as_str() == instance_id) {
            debug!(network = %network.id, instance = %instance_id, address = %address, "Address already reserved");
            return Ok(address.clone());
        }

        let address = network
            .addresses
            .iter()
            .find(|a| !taken.contains_key(*a))
            .cloned()
            .ok_or_else(|| Error::NoCapacity {
                scope: format!("network {}", network.id),
                reason: format!("all {} addresses are reserved", network.addresses.len()),
            })?;

        taken.insert(address.clone(), instance_id.to_string());
        info!(network = %network.id, instance = %instance_id, address = %address, "Reserved address");
        Ok(address)
    }

    /// Free one address; returns whether it was reserved
    pub fn release(&self, network_id: &str, address: &str) -> bool {
        let mut reservations = self.reservations.lock();
        let released = reservations
            .get_mut(network_id)
            .map(|taken| taken.remove(address).is_some())
            .unwrap_or(false);
        if released {
            info!(network = %network_id, address = %address, "Released address");
        }
        released
    }

    /// Free every address held by an instance; returns how many
    pub fn release_instance(&self, instance_id: &str) -> usize {
        let mut reservations = self.reservations.lock();
        let mut count = 0;
        for taken in reservations.values_mut() {
            let before = taken.len();
            taken.retain(|_, owner| owner != instance_id);
            count += before - taken.len();
        }
        count
    }

    /// Current reservations of a network as (address, instance) pairs
    pub fn reserved(&self, network_id: &str) -> Vec<(String, String)> {
        self.reservations
            .lock()
            .get(network_id)
            .map(|taken| taken.iter().map(|(a, i)| (a.clone(), i.clone())).collect())
            .unwrap_or_default()
    }

    /// Whether the network still has an unreserved address
    pub fn has_free(&self, network: &NetworkDescriptor) -> bool {
        let reservations = self.reservations.lock();
        match reservations.get(&network.id) {
            None => !network.addresses.is_empty(),
            Some(taken) => network.addresses.iter().any(|a| !taken.contains_key(a)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::snapshot::fixtures::network;

    #[test]
    fn test_reserve_in_inventory_order() {
        let book = AddressBook::new();
        let net = network("vlan-10", &["10.0.0.10", "10.0.0.11"]);

        assert_eq!(book.reserve(&net, "vm-a").unwrap(), "10.0.0.10");
        assert_eq!(book.reserve(&net, "vm-b").unwrap(), "10.0.0.11");
        assert!(!book.has_free(&net));
    }

    #[test]
    fn test_reserve_is_idempotent_per_instance() {
        let book = AddressBook::new();
        let net = network("vlan-10", &["10.0.0.10", "10.0.0.11"]);

        let first = book.reserve(&net, "vm-a").unwrap();
        let again = book.reserve(&net, "vm-a").unwrap();
        assert_eq!(first, again);
        assert_eq!(book.reserved("vlan-10").len(), 1);
    }

    #[test]
    fn test_exhausted_network_is_no_capacity() {
        let book = AddressBook::new();
        let net = network("vlan-10", &["10.0.0.10"]);
        book.reserve(&net, "vm-a").unwrap();

        let err = book.reserve(&net, "vm-b").unwrap_err();
        assert!(matches!(err, Error::NoCapacity { .. }));
    }

    #[test]
    fn test_release_makes_address_reusable() {
        let book = AddressBook::new();
        let net = network("vlan-10", &["10.0.0.10"]);
        let addr = book.reserve(&net, "vm-a").unwrap();

        assert!(book.release("vlan-10", &addr));
        assert!(!book.release("vlan-10", &addr));
        assert_eq!(book.reserve(&net, "vm-b").unwrap(), "10.0.0.10");
        assert_eq!(book.release_instance("vm-b"), 1);
    }
}
