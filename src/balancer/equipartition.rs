//! Static Host Balancer
//!
//! Distributes instances over a fixed, configured host list. Round-robin
//! walks the list with a shared cursor; least-loaded picks the host with the
//! fewest VMs. Only configured hosts present and enabled in the current
//! snapshot are candidates.

use super::{Balancer, BalancerKind, BalancerSection, InventoryView, Strategy};
use crate::error::{Error, Result};
use crate::inventory::{HostDescriptor, InventorySnapshot};
use crate::settings::ProvisioningSettings;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Equipartition over configured hosts
#[derive(Debug)]
pub struct StaticHostBalancer {
    hosts: Vec<String>,
    strategy: Strategy,
    cursor: AtomicUsize,
    inventory: InventoryView,
}

impl Default for StaticHostBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticHostBalancer {
    pub fn new() -> Self {
        Self {
            hosts: Vec::new(),
            strategy: Strategy::default(),
            cursor: AtomicUsize::new(0),
            inventory: InventoryView::new(),
        }
    }

    /// Configured hosts present and enabled in the snapshot, in configuration order
    fn eligible<'a>(&self, inventory: &'a InventorySnapshot) -> Vec<&'a HostDescriptor> {
        self.hosts
            .iter()
            .filter_map(|name| inventory.host(name))
            .filter(|h| h.enabled)
            .collect()
    }

    fn round_robin<'a>(&self, eligible: &[&'a HostDescriptor]) -> &'a HostDescriptor {
        let position = self.cursor.fetch_add(1, Ordering::Relaxed) % eligible.len();
        eligible[position]
    }

    fn least_loaded<'a>(&self, eligible: &[&'a HostDescriptor]) -> &'a HostDescriptor {
        // min_by keeps the first of equal elements, so ties fall back to
        // configuration order
        eligible
            .iter()
            .copied()
            .min_by(|a, b| compare_load(a, b))
            .unwrap_or(eligible[0])
    }
}

/// Order by VM count, then utilization
fn compare_load(a: &HostDescriptor, b: &HostDescriptor) -> CmpOrdering {
    a.vm_count.cmp(&b.vm_count).then_with(|| {
        utilization(a)
            .partial_cmp(&utilization(b))
            .unwrap_or(CmpOrdering::Equal)
    })
}

fn utilization(host: &HostDescriptor) -> f64 {
    (host.cpu_utilization() + host.memory_utilization()) / 2.0
}

impl Balancer for StaticHostBalancer {
    fn kind(&self) -> BalancerKind {
        BalancerKind::Equipartition
    }

    fn set_configuration(&mut self, config: &BalancerSection) -> Result<()> {
        config.validate()?;
        self.hosts = config.enabled_elements();
        self.strategy = config.strategy;
        self.cursor.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn set_inventory(&self, inventory: Arc<InventorySnapshot>) {
        self.inventory.replace(inventory);
    }

    fn next(&self, _settings: &ProvisioningSettings) -> Result<String> {
        let inventory = self.inventory.get();
        let eligible = self.eligible(&inventory);
        if eligible.is_empty() {
            return Err(Error::NoCapacity {
                scope: "host balancer".into(),
                reason: if inventory.is_empty() {
                    "inventory snapshot is empty".into()
                } else {
                    "no configured host is present and enabled".into()
                },
            });
        }

        let chosen = match self.strategy {
            Strategy::RoundRobin => self.round_robin(&eligible),
            Strategy::LeastLoaded => self.least_loaded(&eligible),
        };
        debug!(host = %chosen.id, strategy = ?self.strategy, "Static balancer selected host");
        Ok(chosen.id.clone())
    }

    fn elements(&self) -> Vec<String> {
        self.hosts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::BalancerElement;
    use crate::inventory::snapshot::fixtures::host;
    use assert_matches::assert_matches;

    fn balancer(strategy: Strategy, hosts: &[&str]) -> StaticHostBalancer {
        let mut section = BalancerSection::new(BalancerKind::Equipartition).with_strategy(strategy);
        for h in hosts {
            section = section.with_element(BalancerElement::new(*h));
        }
        let mut b = StaticHostBalancer::new();
        b.set_configuration(&section).unwrap();
        b
    }

    fn snapshot(hosts: Vec<HostDescriptor>) -> Arc<InventorySnapshot> {
        Arc::new(InventorySnapshot::new(hosts, vec![], vec![]))
    }

    #[test]
    fn test_round_robin_cycles_in_order() {
        let b = balancer(Strategy::RoundRobin, &["esx-1", "esx-2", "esx-3"]);
        b.set_inventory(snapshot(vec![
            host("esx-3", 0, 0, 0),
            host("esx-1", 0, 0, 9),
            host("esx-2", 0, 0, 4),
        ]));
        let settings = ProvisioningSettings::new();

        let picks: Vec<_> = (0..4).map(|_| b.next(&settings).unwrap()).collect();
        assert_eq!(picks, vec!["esx-1", "esx-2", "esx-3", "esx-1"]);
    }

    #[test]
    fn test_least_loaded_prefers_fewest_vms() {
        let b = balancer(Strategy::LeastLoaded, &["esx-1", "esx-2"]);
        b.set_inventory(Arc::new(InventorySnapshot::new(
            vec![host("esx-1", 0, 0, 5), host("esx-2", 0, 0, 2)],
            vec![],
            vec![],
        )));
        assert_eq!(b.next(&ProvisioningSettings::new()).unwrap(), "esx-2");
    }

    #[test]
    fn test_ties_broken_by_utilization_then_order() {
        let b = balancer(Strategy::LeastLoaded, &["esx-1", "esx-2", "esx-3"]);
        b.set_inventory(Arc::new(InventorySnapshot::new(
            vec![
                host("esx-1", 5_000, 0, 2),
                host("esx-2", 1_000, 0, 2),
                host("esx-3", 1_000, 0, 2),
            ],
            vec![],
            vec![],
        )));
        assert_eq!(b.next(&ProvisioningSettings::new()).unwrap(), "esx-2");
    }

    #[test]
    fn test_disabled_hosts_skipped() {
        let b = balancer(Strategy::RoundRobin, &["esx-1", "esx-2"]);
        let mut disabled = host("esx-1", 0, 0, 0);
        disabled.enabled = false;
        b.set_inventory(snapshot(vec![disabled, host("esx-2", 0, 0, 0)]));

        for _ in 0..3 {
            assert_eq!(b.next(&ProvisioningSettings::new()).unwrap(), "esx-2");
        }
    }

    #[test]
    fn test_empty_snapshot_is_no_capacity() {
        let b = balancer(Strategy::RoundRobin, &["esx-1"]);
        b.set_inventory(Arc::new(InventorySnapshot::empty()));
        assert_matches!(
            b.next(&ProvisioningSettings::new()),
            Err(Error::NoCapacity { .. })
        );
    }

    #[test]
    fn test_hosts_missing_from_snapshot_are_skipped() {
        let b = balancer(Strategy::LeastLoaded, &["esx-1", "esx-2"]);
        b.set_inventory(snapshot(vec![host("esx-2", 0, 0, 7), host("esx-9", 0, 0, 0)]));
        for _ in 0..2 {
            assert_eq!(b.next(&ProvisioningSettings::new()).unwrap(), "esx-2");
        }
    }

    #[test]
    fn test_nothing_configured_is_no_capacity() {
        let b = balancer(Strategy::RoundRobin, &[]);
        assert_matches!(
            b.next(&ProvisioningSettings::new()),
            Err(Error::NoCapacity { .. })
        );
    }
}
