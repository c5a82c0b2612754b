//! Storage Balancer
//!
//! Chooses a storage reachable from the host already recorded in the
//! settings. A storage qualifies when its free space after placing the
//! requested disk stays strictly above its limit; the qualifying storage with
//! the most projected free space wins.

use super::{Balancer, BalancerKind, BalancerSection, InventoryView, Limit};
use crate::error::{Error, Result};
use crate::inventory::{InventorySnapshot, StorageDescriptor};
use crate::settings::{keys, ProvisioningSettings};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const GIB: u64 = 1024 * 1024 * 1024;

/// Per-host storage selection with free-space limits
#[derive(Debug)]
pub struct StorageBalancer {
    /// Configured storages in order; empty means every storage of the host
    storages: Vec<String>,
    /// Storages explicitly disabled in the configuration
    disabled: Vec<String>,
    limits: HashMap<String, Limit>,
    default_limit: Limit,
    inventory: InventoryView,
}

impl Default for StorageBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBalancer {
    pub fn new() -> Self {
        Self {
            storages: Vec::new(),
            disabled: Vec::new(),
            limits: HashMap::new(),
            default_limit: Limit::default(),
            inventory: InventoryView::new(),
        }
    }

    fn limit_for(&self, storage: &str) -> Limit {
        self.limits
            .get(storage)
            .copied()
            .unwrap_or(self.default_limit)
    }

    /// Storages of the host to consider, in configuration order
    fn candidates<'a>(
        &self,
        inventory: &'a InventorySnapshot,
        host: &str,
    ) -> Vec<&'a StorageDescriptor> {
        let attached = inventory.storage_by_host(host);
        let usable = |s: &&StorageDescriptor| s.enabled && !self.disabled.contains(&s.id);

        if self.storages.is_empty() {
            return attached.into_iter().filter(usable).collect();
        }
        self.storages
            .iter()
            .filter_map(|name| attached.iter().find(|s| &s.id == name).copied())
            .filter(usable)
            .collect()
    }
}

impl Balancer for StorageBalancer {
    fn kind(&self) -> BalancerKind {
        BalancerKind::Storage
    }

    fn set_configuration(&mut self, config: &BalancerSection) -> Result<()> {
        config.validate()?;
        self.storages = config.enabled_elements();
        self.disabled = config
            .elements
            .iter()
            .filter(|e| !e.enabled)
            .map(|e| e.name.clone())
            .collect();
        self.limits = config
            .elements
            .iter()
            .filter_map(|e| e.limit.map(|limit| (e.name.clone(), limit)))
            .collect();
        self.default_limit = config.default_limit.unwrap_or_default();
        Ok(())
    }

    fn set_inventory(&self, inventory: Arc<InventorySnapshot>) {
        self.inventory.replace(inventory);
    }

    fn next(&self, settings: &ProvisioningSettings) -> Result<String> {
        let host = settings
            .get_non_empty(keys::HOST)
            .ok_or_else(|| Error::MissingPrecondition {
                component: "storage balancer".into(),
                key: keys::HOST.into(),
            })?;
        let requested = settings
            .get_u64(keys::DISK_SIZE_GB)?
            .unwrap_or(0)
            .saturating_mul(GIB);

        let inventory = self.inventory.get();
        let mut best: Option<(&StorageDescriptor, u64)> = None;
        for storage in self.candidates(&inventory, host) {
            let projected = storage.free_bytes.saturating_sub(requested);
            let limit = self.limit_for(&storage.id);
            if !limit.admits(projected, storage.total_bytes) {
                debug!(storage = %storage.id, projected, limit = %limit, "Storage below limit");
                continue;
            }
            if best.map_or(true, |(_, free)| projected > free) {
                best = Some((storage, projected));
            }
        }

        let (storage, projected) = best.ok_or_else(|| Error::NoCapacity {
            scope: format!("storage of host {}", host),
            reason: "no storage stays above its free-space limit".into(),
        })?;
        debug!(host = %host, storage = %storage.id, projected, "Storage balancer selected storage");
        Ok(storage.id.clone())
    }

    fn elements(&self) -> Vec<String> {
        self.storages.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::BalancerElement;
    use crate::inventory::snapshot::fixtures::{host, storage};
    use assert_matches::assert_matches;

    fn settings_for(host: &str) -> ProvisioningSettings {
        let mut settings = ProvisioningSettings::new();
        settings.set(keys::HOST, host);
        settings
    }

    fn balancer(section: BalancerSection, storages: Vec<StorageDescriptor>) -> StorageBalancer {
        let mut b = StorageBalancer::new();
        b.set_configuration(&section).unwrap();
        b.set_inventory(Arc::new(InventorySnapshot::new(
            vec![host("esx-1", 0, 0, 0)],
            storages,
            vec![],
        )));
        b
    }

    #[test]
    fn test_limit_85_percent() {
        let section = BalancerSection::new(BalancerKind::Storage)
            .with_element(BalancerElement::new("ds-80").with_limit(Limit::Percent(85.0)))
            .with_element(BalancerElement::new("ds-90").with_limit(Limit::Percent(85.0)));
        let b = balancer(
            section,
            vec![storage("ds-80", "esx-1", 80), storage("ds-90", "esx-1", 90)],
        );

        assert_eq!(b.next(&settings_for("esx-1")).unwrap(), "ds-90");
    }

    #[test]
    fn test_free_exactly_at_limit_is_rejected() {
        let section = BalancerSection::new(BalancerKind::Storage)
            .with_default_limit(Limit::Percent(85.0));
        let b = balancer(section, vec![storage("ds-1", "esx-1", 85)]);

        assert_matches!(
            b.next(&settings_for("esx-1")),
            Err(Error::NoCapacity { .. })
        );
    }

    #[test]
    fn test_requested_disk_counts_against_free_space() {
        let section = BalancerSection::new(BalancerKind::Storage)
            .with_default_limit(Limit::Percent(50.0));
        let b = balancer(section, vec![storage("ds-1", "esx-1", 60)]);

        let mut settings = settings_for("esx-1");
        assert_eq!(b.next(&settings).unwrap(), "ds-1");

        settings.set(keys::DISK_SIZE_GB, "20");
        assert_matches!(b.next(&settings), Err(Error::NoCapacity { .. }));
    }

    #[test]
    fn test_most_free_wins_ties_keep_configuration_order() {
        let section = BalancerSection::new(BalancerKind::Storage)
            .with_element(BalancerElement::new("ds-b"))
            .with_element(BalancerElement::new("ds-a"))
            .with_element(BalancerElement::new("ds-c"));
        let b = balancer(
            section,
            vec![
                storage("ds-a", "esx-1", 70),
                storage("ds-b", "esx-1", 70),
                storage("ds-c", "esx-1", 40),
            ],
        );
        assert_eq!(b.next(&settings_for("esx-1")).unwrap(), "ds-b");
    }

    #[test]
    fn test_scoped_to_host() {
        let section = BalancerSection::new(BalancerKind::Storage);
        let b = balancer(
            section,
            vec![storage("ds-1", "esx-1", 10), storage("ds-2", "esx-2", 90)],
        );
        assert_eq!(b.next(&settings_for("esx-1")).unwrap(), "ds-1");
    }

    #[test]
    fn test_disabled_storage_skipped() {
        let section = BalancerSection::new(BalancerKind::Storage)
            .with_element(BalancerElement::new("ds-1").disabled());
        let b = balancer(
            section,
            vec![storage("ds-1", "esx-1", 90), storage("ds-2", "esx-1", 50)],
        );
        // no enabled element listed: every attached storage except ds-1
        assert_eq!(b.next(&settings_for("esx-1")).unwrap(), "ds-2");
    }

    #[test]
    fn test_missing_host_is_precondition_error() {
        let b = balancer(
            BalancerSection::new(BalancerKind::Storage),
            vec![storage("ds-1", "esx-1", 90)],
        );
        assert_matches!(
            b.next(&ProvisioningSettings::new()),
            Err(Error::MissingPrecondition { .. })
        );
    }
}
