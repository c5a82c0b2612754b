//! Capacity Balancer
//!
//! Pluggable placement selection over the current inventory snapshot:
//! - `equipartition`: static host list, round-robin or least-loaded
//! - `dynamic`: weighted score from live host metrics
//! - `storage`: storage of the chosen host that keeps a free-space limit
//!
//! Balancers never retry internally; an empty candidate set is reported as
//! `NoCapacity` and the calling action decides what to do.

pub mod config;
pub mod dynamic;
pub mod equipartition;
pub mod factory;
pub mod storage;

pub use config::*;
pub use dynamic::DynamicHostBalancer;
pub use equipartition::StaticHostBalancer;
pub use factory::{BalancerFactory, PlacementBalancers};
pub use storage::StorageBalancer;

use crate::error::Result;
use crate::inventory::InventorySnapshot;
use crate::settings::ProvisioningSettings;
use parking_lot::RwLock;
use std::sync::Arc;

/// A placement selector
///
/// Configuration is applied once after construction. The inventory is
/// replaced whenever a new snapshot is swapped in; `next` always works on one
/// consistent snapshot.
pub trait Balancer: Send + Sync {
    /// Algorithm of this balancer
    fn kind(&self) -> BalancerKind;

    /// Apply the configuration section
    fn set_configuration(&mut self, config: &BalancerSection) -> Result<()>;

    /// Replace the inventory the balancer selects from
    fn set_inventory(&self, inventory: Arc<InventorySnapshot>);

    /// Choose the next target for an instance
    fn next(&self, settings: &ProvisioningSettings) -> Result<String>;

    /// Configured, enabled targets in configuration order
    fn elements(&self) -> Vec<String>;
}

/// Inventory slot shared by the balancer implementations
#[derive(Debug)]
pub(crate) struct InventoryView {
    current: RwLock<Arc<InventorySnapshot>>,
}

impl InventoryView {
    pub(crate) fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(InventorySnapshot::empty())),
        }
    }

    pub(crate) fn replace(&self, inventory: Arc<InventorySnapshot>) {
        *self.current.write() = inventory;
    }

    pub(crate) fn get(&self) -> Arc<InventorySnapshot> {
        self.current.read().clone()
    }
}
