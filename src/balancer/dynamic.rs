//! Dynamic-Equipartition Host Balancer
//!
//! Scores every configured host that is present in the snapshot from its
//! live metrics and returns the lowest score. Scores are recomputed on each
//! call so a fresh snapshot takes effect immediately.

use super::{Balancer, BalancerKind, BalancerSection, InventoryView, Weights};
use crate::error::{Error, Result};
use crate::inventory::{HostDescriptor, InventorySnapshot};
use crate::settings::ProvisioningSettings;
use std::sync::Arc;
use tracing::debug;

/// Weighted host selection from inventory metrics
#[derive(Debug)]
pub struct DynamicHostBalancer {
    hosts: Vec<String>,
    weights: Weights,
    inventory: InventoryView,
}

impl Default for DynamicHostBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicHostBalancer {
    pub fn new() -> Self {
        Self {
            hosts: Vec::new(),
            weights: Weights::default(),
            inventory: InventoryView::new(),
        }
    }

    /// Configured hosts present and enabled in the snapshot, in configuration order
    fn candidates<'a>(&self, inventory: &'a InventorySnapshot) -> Vec<&'a HostDescriptor> {
        self.hosts
            .iter()
            .filter_map(|name| inventory.host(name))
            .filter(|h| h.enabled)
            .collect()
    }

    /// Lower is better
    fn score(&self, host: &HostDescriptor, max_vms: u32) -> f64 {
        let vm_share = if max_vms == 0 {
            0.0
        } else {
            host.vm_count as f64 / max_vms as f64
        };
        self.weights.cpu * host.cpu_utilization()
            + self.weights.memory * host.memory_utilization()
            + self.weights.vm_count * vm_share
    }
}

impl Balancer for DynamicHostBalancer {
    fn kind(&self) -> BalancerKind {
        BalancerKind::DynamicEquipartition
    }

    fn set_configuration(&mut self, config: &BalancerSection) -> Result<()> {
        config.validate()?;
        self.hosts = config.enabled_elements();
        self.weights = config.weights;
        Ok(())
    }

    fn set_inventory(&self, inventory: Arc<InventorySnapshot>) {
        self.inventory.replace(inventory);
    }

    fn next(&self, _settings: &ProvisioningSettings) -> Result<String> {
        let inventory = self.inventory.get();
        let candidates = self.candidates(&inventory);
        if candidates.is_empty() {
            return Err(Error::NoCapacity {
                scope: "dynamic host balancer".into(),
                reason: format!(
                    "none of the {} configured hosts is in the inventory",
                    self.hosts.len()
                ),
            });
        }

        let max_vms = candidates.iter().map(|h| h.vm_count).max().unwrap_or(0);

        let mut best: Option<(&HostDescriptor, f64)> = None;
        for host in candidates {
            let score = self.score(host, max_vms);
            // strict comparison keeps configuration order on ties
            if best.map_or(true, |(_, s)| score < s) {
                best = Some((host, score));
            }
        }

        let (host, score) = best.ok_or_else(|| {
            Error::InvariantViolation("dynamic balancer lost its candidates".into())
        })?;
        debug!(host = %host.id, score, "Dynamic balancer selected host");
        Ok(host.id.clone())
    }

    fn elements(&self) -> Vec<String> {
        self.hosts.clone()
    }
}
