//! Balancer construction

use super::{
    Balancer, BalancerDocument, BalancerKind, BalancerSection, DynamicHostBalancer,
    StaticHostBalancer, StorageBalancer,
};
use crate::error::{Error, Result};
use crate::inventory::InventorySnapshot;
use crate::settings::ProvisioningSettings;
use std::sync::Arc;
use tracing::info;

/// Factory for creating balancers from configuration sections
pub struct BalancerFactory;

impl BalancerFactory {
    /// Create and configure a balancer for a section
    pub fn create(section: &BalancerSection) -> Result<Box<dyn Balancer>> {
        let mut balancer: Box<dyn Balancer> = match section.kind()? {
            BalancerKind::Equipartition => Box::new(StaticHostBalancer::new()),
            BalancerKind::DynamicEquipartition => Box::new(DynamicHostBalancer::new()),
            BalancerKind::Storage => Box::new(StorageBalancer::new()),
        };
        balancer.set_configuration(section)?;
        Ok(balancer)
    }
}

/// The host and storage balancers of one deployment
pub struct PlacementBalancers {
    host: Box<dyn Balancer>,
    storage: Box<dyn Balancer>,
}

impl std::fmt::Debug for PlacementBalancers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacementBalancers")
            .field("host", &self.host.kind())
            .field("storage", &self.storage.kind())
            .finish()
    }
}

impl PlacementBalancers {
    pub fn from_document(document: &BalancerDocument) -> Result<Self> {
        let host = BalancerFactory::create(&document.host)?;
        if host.kind() == BalancerKind::Storage {
            return Err(Error::Configuration(
                "host section needs a host balancer kind".into(),
            ));
        }

        let storage = BalancerFactory::create(&document.storage)?;
        if storage.kind() != BalancerKind::Storage {
            return Err(Error::Configuration(format!(
                "storage section needs kind storage, got {}",
                storage.kind()
            )));
        }

        info!(
            host_kind = %host.kind(),
            hosts = host.elements().len(),
            storages = storage.elements().len(),
            "Placement balancers configured"
        );
        Ok(Self { host, storage })
    }

    /// Hand a new snapshot to both balancers
    pub fn set_inventory(&self, inventory: Arc<InventorySnapshot>) {
        self.host.set_inventory(inventory.clone());
        self.storage.set_inventory(inventory);
    }

    pub fn select_host(&self, settings: &ProvisioningSettings) -> Result<String> {
        self.host.next(settings)
    }

    /// Requires `HOST` in the settings
    pub fn select_storage(&self, settings: &ProvisioningSettings) -> Result<String> {
        self.storage.next(settings)
    }

    pub fn host_balancer(&self) -> &dyn Balancer {
        self.host.as_ref()
    }

    pub fn storage_balancer(&self) -> &dyn Balancer {
        self.storage.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::{BalancerElement, Limit, Strategy};
    use crate::inventory::snapshot::fixtures::{host, storage};
    use crate::settings::keys;
    use assert_matches::assert_matches;

    fn document() -> BalancerDocument {
        BalancerDocument {
            host: BalancerSection::new(BalancerKind::Equipartition)
                .with_strategy(Strategy::RoundRobin)
                .with_element(BalancerElement::new("esx-1")),
            storage: BalancerSection::new(BalancerKind::Storage)
                .with_default_limit(Limit::Percent(10.0)),
        }
    }

    #[test]
    fn test_factory_creates_by_kind() {
        let section = BalancerSection::new(BalancerKind::DynamicEquipartition);
        let balancer = BalancerFactory::create(&section).unwrap();
        assert_eq!(balancer.kind(), BalancerKind::DynamicEquipartition);

        let mut section = BalancerSection::new(BalancerKind::Storage);
        section.kind = "weighted-random".into();
        assert!(matches!(
            BalancerFactory::create(&section),
            Err(Error::UnknownBalancer { .. })
        ));
    }

    #[test]
    fn test_host_then_storage() {
        let balancers = PlacementBalancers::from_document(&document()).unwrap();
        balancers.set_inventory(Arc::new(InventorySnapshot::new(
            vec![host("esx-1", 0, 0, 0)],
            vec![storage("ds-1", "esx-1", 50)],
            vec![],
        )));

        let mut settings = ProvisioningSettings::new();
        let chosen_host = balancers.select_host(&settings).unwrap();
        settings.set(keys::HOST, chosen_host);
        assert_eq!(balancers.select_storage(&settings).unwrap(), "ds-1");
    }

    #[test]
    fn test_sections_must_match_their_role() {
        let mut doc = document();
        doc.storage = BalancerSection::new(BalancerKind::Equipartition);
        assert_matches!(
            PlacementBalancers::from_document(&doc),
            Err(Error::Configuration(_))
        );
    }
}
